//! # Cash Register
//!
//! Manual cash movements: float deposits, supplier payments, withdrawals.
//! Append-only; the corte of the day nets them into the expected cash.

use bodega_core::validation::{validate_location, validate_movement_amount, validate_text};
use bodega_core::{CashMovement, MovementType};
use bodega_db::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceResult;
use crate::sales::check_window;

/// A cash movement as entered at the register.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCashMovement {
    pub amount_cents: i64,
    pub concept: String,
    pub movement_type: MovementType,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct CashRegister {
    db: Database,
}

impl CashRegister {
    pub fn new(db: Database) -> Self {
        CashRegister { db }
    }

    /// Appends a movement. The amount is always positive; the direction
    /// comes from `movement_type`.
    pub async fn record_cash_movement(&self, entry: NewCashMovement) -> ServiceResult<CashMovement> {
        validate_movement_amount(entry.amount_cents)?;
        validate_text("concept", &entry.concept, 200)?;
        validate_location("location", &entry.location)?;

        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            amount_cents: entry.amount_cents,
            concept: entry.concept.trim().to_string(),
            movement_type: entry.movement_type,
            location: entry.location,
            created_at: Utc::now(),
        };
        self.db.cash().insert(&movement).await?;

        info!(
            location = %movement.location,
            amount_cents = movement.amount_cents,
            movement_type = ?movement.movement_type,
            "Cash movement recorded"
        );
        Ok(movement)
    }

    /// Movements of a location created in `[start, end)`, oldest first.
    pub async fn list_cash_movements(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<CashMovement>> {
        check_window(location, start, end)?;
        Ok(self.db.cash().list(location, start, end).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::test_support::memory_db;
    use chrono::Duration;

    fn entry(amount_cents: i64, concept: &str, movement_type: MovementType) -> NewCashMovement {
        NewCashMovement {
            amount_cents,
            concept: concept.to_string(),
            movement_type,
            location: "L1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let register = CashRegister::new(memory_db().await);

        register
            .record_cash_movement(entry(2_000, "Fondo de caja", MovementType::In))
            .await
            .unwrap();
        let out = register
            .record_cash_movement(entry(500, " Pago garrafones ", MovementType::Out))
            .await
            .unwrap();
        assert_eq!(out.concept, "Pago garrafones");

        let now = Utc::now();
        let listed = register
            .list_cash_movements("L1", now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        let net: i64 = listed.iter().map(|m| m.signed_amount().cents()).sum();
        assert_eq!(net, 1_500);

        let other = register
            .list_cash_movements("L2", now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_movements_rejected() {
        let register = CashRegister::new(memory_db().await);

        for bad in [
            entry(0, "Fondo", MovementType::In),
            entry(-100, "Fondo", MovementType::Out),
            entry(100, "   ", MovementType::In),
        ] {
            let err = register.record_cash_movement(bad).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }
}

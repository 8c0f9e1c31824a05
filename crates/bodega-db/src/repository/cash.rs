//! # Cash Movement Repository
//!
//! Manual in/out entries of the cash drawer. Rows are append-only; there
//! is no update or delete.

use bodega_core::CashMovement;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for cash drawer movements.
#[derive(Debug, Clone)]
pub struct CashMovementRepository {
    pool: SqlitePool,
}

impl CashMovementRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashMovementRepository { pool }
    }

    /// Appends a movement.
    pub async fn insert(&self, movement: &CashMovement) -> DbResult<()> {
        debug!(
            id = %movement.id,
            location = %movement.location,
            amount_cents = movement.amount_cents,
            "Recording cash movement"
        );

        sqlx::query(
            r#"
            INSERT INTO cash_movements (id, amount_cents, concept, movement_type, location, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&movement.id)
        .bind(movement.amount_cents)
        .bind(&movement.concept)
        .bind(movement.movement_type)
        .bind(&movement.location)
        .bind(movement.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Movements of a location created in `[start, end)`, oldest first.
    pub async fn list(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<CashMovement>> {
        let rows = sqlx::query_as::<_, CashMovement>(
            r#"
            SELECT id, amount_cents, concept, movement_type, location, created_at
            FROM cash_movements
            WHERE location = ?1 AND created_at >= ?2 AND created_at < ?3
            ORDER BY created_at, id
            "#,
        )
        .bind(location)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

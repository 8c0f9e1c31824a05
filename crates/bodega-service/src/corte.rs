//! # Corte Engine
//!
//! Closes the till of a location: what the drawer and the card terminal
//! should hold for the business day versus what the operator counted.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    reconcile("L1", 140, 50, as_of)                      │
//! │                                                                         │
//! │  1. Parse / validate counts        before any read                      │
//! │  2. Business day of as_of          [00:00, 24:00) at the store offset   │
//! │  3. Read the day's records         tickets, cash moves, mobile orders   │
//! │                                    taken or paid in the day             │
//! │  4. Aggregate                      expected cash = cash sales + net     │
//! │                                    expected card = card sales           │
//! │  5. Persist one immutable snapshot                                      │
//! │                                                                         │
//! │  Each run writes a new snapshot; a failure at any step writes none.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bodega_core::calendar::BusinessDay;
use bodega_core::corte::{aggregate, build_corte, parse_counted, CorteTotals, Variance};
use bodega_core::validation::{validate_counted_amount, validate_location};
use bodega_core::{Corte, Money};
use bodega_db::Database;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

/// Snapshot plus its readings for the operator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorteResult {
    pub corte: Corte,
    pub cash_variance: Variance,
    pub card_variance: Variance,
    /// "Sobra $X", "Falta $X" or "Monto exacto".
    pub cash_label: String,
    pub card_label: String,
}

impl From<Corte> for CorteResult {
    fn from(corte: Corte) -> Self {
        let cash_variance = corte.cash_variance();
        let card_variance = corte.card_variance();
        CorteResult {
            cash_label: cash_variance.to_string(),
            card_label: card_variance.to_string(),
            cash_variance,
            card_variance,
            corte,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorteEngine {
    db: Database,
    offset: FixedOffset,
}

impl CorteEngine {
    /// `offset` is the fixed UTC offset of the store's business calendar.
    pub fn new(db: Database, offset: FixedOffset) -> Self {
        CorteEngine { db, offset }
    }

    /// Reconciles the business day containing `as_of`.
    pub async fn reconcile(
        &self,
        location: &str,
        actual_cash: Money,
        actual_card: Money,
        as_of: DateTime<Utc>,
    ) -> ServiceResult<CorteResult> {
        validate_location("location", location)?;
        validate_counted_amount("actual_cash", actual_cash.cents())?;
        validate_counted_amount("actual_card", actual_card.cents())?;

        let day = BusinessDay::containing(as_of, self.offset);
        let totals = self.totals_for(location, &day).await?;

        let corte = build_corte(
            Uuid::new_v4().to_string(),
            location,
            &day,
            &totals,
            actual_cash,
            actual_card,
            Utc::now(),
        );
        self.db.cortes().insert(&corte).await?;

        let result = CorteResult::from(corte);
        info!(
            location = %location,
            business_date = %day.date,
            tickets = totals.total_tickets,
            cash = %result.cash_label,
            card = %result.card_label,
            "Corte recorded"
        );
        Ok(result)
    }

    /// Reconciles from the operator's typed counts ("140", "$1,040.50").
    ///
    /// Non-numeric or negative input is rejected before anything is read.
    pub async fn reconcile_input(
        &self,
        location: &str,
        actual_cash: &str,
        actual_card: &str,
        as_of: DateTime<Utc>,
    ) -> ServiceResult<CorteResult> {
        let cash = parse_counted("actual_cash", actual_cash)?;
        let card = parse_counted("actual_card", actual_card)?;
        self.reconcile(location, cash, card, as_of).await
    }

    /// Expected amounts so far for the day containing `as_of`, without
    /// recording anything.
    pub async fn preview(&self, location: &str, as_of: DateTime<Utc>) -> ServiceResult<CorteTotals> {
        validate_location("location", location)?;
        let day = BusinessDay::containing(as_of, self.offset);
        self.totals_for(location, &day).await
    }

    /// Most recent cortes of a location, newest first.
    pub async fn list_cortes(&self, location: &str, limit: i64) -> ServiceResult<Vec<Corte>> {
        validate_location("location", location)?;
        Ok(self
            .db
            .cortes()
            .list_by_location(location, limit.clamp(1, 500))
            .await?)
    }

    pub async fn get_corte(&self, id: &str) -> ServiceResult<CorteResult> {
        self.db
            .cortes()
            .get_by_id(id)
            .await?
            .map(CorteResult::from)
            .ok_or_else(|| ServiceError::not_found("Corte", id))
    }

    async fn totals_for(&self, location: &str, day: &BusinessDay) -> ServiceResult<CorteTotals> {
        let tickets = self.db.tickets().list_tickets(location, day.start, day.end).await?;
        let mobile = self
            .db
            .tickets()
            .list_mobile_tickets_created_or_paid(location, day.start, day.end)
            .await?;
        let movements = self.db.cash().list(location, day.start, day.end).await?;

        debug!(
            location = %location,
            tickets = tickets.len(),
            mobile = mobile.len(),
            movements = movements.len(),
            "Aggregating corte"
        );
        Ok(aggregate(day, &tickets, &mobile, &movements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::NewCashMovement;
    use crate::sales::{MobileOrderRequest, MobileTicketUpdate, TicketRequest};
    use crate::test_support::{bodega, insert_product, sample_product};
    use crate::Bodega;
    use bodega_core::ticket::{build_line, SaleLine};
    use bodega_core::{
        CashMovement, FulfillmentStatus, MobileTicket, MovementType, PaymentStatus, PaymentType,
        Product, UnitType,
    };
    use chrono::Duration;

    async fn sell(bodega: &Bodega, product: &Product, price: i64, payment_type: PaymentType) {
        bodega
            .sales()
            .process_ticket(TicketRequest {
                location: "L1".to_string(),
                lines: vec![SaleLine {
                    product_id: product.id.clone(),
                    quantity: 1,
                    unit_type: UnitType::Pieces,
                    price_per_unit_cents: price,
                }],
                payment_type,
                amount_paid_cents: Some(price),
            })
            .await
            .unwrap();
    }

    async fn move_cash(bodega: &Bodega, amount_cents: i64, movement_type: MovementType) {
        bodega
            .cash()
            .record_cash_movement(NewCashMovement {
                amount_cents,
                concept: "Movimiento".to_string(),
                movement_type,
                location: "L1".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shortage_example() {
        let bodega = bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;

        sell(&bodega, &product, 10_000, PaymentType::Cash).await;
        sell(&bodega, &product, 5_000, PaymentType::Card).await;
        sell(&bodega, &product, 3_000, PaymentType::Cash).await;
        move_cash(&bodega, 2_000, MovementType::In).await;
        move_cash(&bodega, 500, MovementType::Out).await;

        let result = bodega
            .cortes()
            .reconcile("L1", Money::from_units(140), Money::from_units(50), Utc::now())
            .await
            .unwrap();

        assert_eq!(result.corte.expected_cash_cents, 14_500);
        assert_eq!(result.corte.expected_card_cents, 5_000);
        assert_eq!(result.corte.cash_variance_cents, -500);
        assert_eq!(result.corte.total_tickets, 3);
        assert_eq!(result.cash_label, "Falta $5.00");
        assert_eq!(result.card_label, "Monto exacto");

        let stored = bodega.cortes().get_corte(&result.corte.id).await.unwrap();
        assert_eq!(stored.corte.id, result.corte.id);
        assert_eq!(stored.corte.actual_cash_cents, 14_000);
        assert_eq!(stored.cash_label, "Falta $5.00");
    }

    #[tokio::test]
    async fn test_unpaid_mobile_orders_count_as_tickets_only() {
        let bodega = bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;

        let order = |pieces: i64| MobileOrderRequest {
            location: "L1".to_string(),
            lines: vec![SaleLine {
                product_id: product.id.clone(),
                quantity: pieces,
                unit_type: UnitType::Pieces,
                price_per_unit_cents: 800,
            }],
            customer_name: "Cliente".to_string(),
            device_id: None,
            coordinates: None,
            sync_status: None,
        };

        bodega
            .sales()
            .process_mobile_ticket(order(2), PaymentType::Card, None)
            .await
            .unwrap();
        bodega.sales().create_mobile_order(order(5)).await.unwrap();

        let totals = bodega.cortes().preview("L1", Utc::now()).await.unwrap();
        assert_eq!(totals.expected_card(), Money::from_cents(1_600));
        assert_eq!(totals.expected_cash(), Money::zero());
        assert_eq!(totals.total_tickets, 2);
    }

    #[tokio::test]
    async fn test_ticket_and_unpaid_order_both_counted() {
        let bodega = bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;

        sell(&bodega, &product, 800, PaymentType::Cash).await;
        bodega
            .sales()
            .create_mobile_order(MobileOrderRequest {
                location: "L1".to_string(),
                lines: vec![SaleLine {
                    product_id: product.id.clone(),
                    quantity: 1,
                    unit_type: UnitType::Pieces,
                    price_per_unit_cents: 800,
                }],
                customer_name: "Cliente".to_string(),
                device_id: None,
                coordinates: None,
                sync_status: None,
            })
            .await
            .unwrap();

        let result = bodega
            .cortes()
            .reconcile("L1", Money::from_cents(800), Money::zero(), Utc::now())
            .await
            .unwrap();
        assert_eq!(result.corte.total_tickets, 2);
        assert_eq!(result.cash_label, "Monto exacto");
    }

    #[tokio::test]
    async fn test_order_paid_today_counts_in_todays_drawer() {
        let bodega = bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;
        let now = Utc::now();

        // Taken yesterday on a device, unpaid
        let line = SaleLine {
            product_id: product.id.clone(),
            quantity: 5,
            unit_type: UnitType::Pieces,
            price_per_unit_cents: 800,
        };
        let yesterday = now - Duration::days(1);
        let order = bodega
            .database()
            .tickets()
            .create_mobile_ticket(
                MobileTicket {
                    ticket_id: String::new(),
                    location: "L1".to_string(),
                    sequence: 0,
                    lines: vec![build_line(&product, &line).unwrap()],
                    total_cents: 4_000,
                    profit_cents: 1_500,
                    customer_name: "Cliente".to_string(),
                    payment_type: None,
                    amount_paid_cents: None,
                    change_cents: None,
                    payment_status: PaymentStatus::Unpaid,
                    fulfillment_status: FulfillmentStatus::Pending,
                    device_id: None,
                    coordinates: None,
                    sync_status: "synced".to_string(),
                    stock_deducted: false,
                    created_at: yesterday,
                    updated_at: yesterday,
                    paid_at: None,
                },
                &[],
            )
            .await
            .unwrap();

        // Paid in cash today
        bodega
            .sales()
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    payment_type: Some(PaymentType::Cash),
                    amount_paid_cents: Some(4_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let today = bodega.cortes().preview("L1", now).await.unwrap();
        assert_eq!(today.expected_cash(), Money::from_units(40));
        assert_eq!(today.total_tickets, 0);

        let before = bodega.cortes().preview("L1", yesterday).await.unwrap();
        assert_eq!(before.expected_cash(), Money::zero());
        assert_eq!(before.total_tickets, 1);
    }

    #[tokio::test]
    async fn test_records_outside_the_day_are_ignored() {
        let bodega = bodega().await;
        let now = Utc::now();

        bodega
            .database()
            .cash()
            .insert(&CashMovement {
                id: Uuid::new_v4().to_string(),
                amount_cents: 9_900,
                concept: "Ayer".to_string(),
                movement_type: MovementType::In,
                location: "L1".to_string(),
                created_at: now - Duration::days(1),
            })
            .await
            .unwrap();
        move_cash(&bodega, 1_000, MovementType::In).await;

        let result = bodega
            .cortes()
            .reconcile("L1", Money::from_units(15), Money::zero(), now)
            .await
            .unwrap();
        assert_eq!(result.corte.expected_cash_cents, 1_000);
        assert_eq!(result.cash_label, "Sobra $5.00");
    }

    #[tokio::test]
    async fn test_invalid_input_writes_nothing() {
        let bodega = bodega().await;
        let engine = bodega.cortes();

        for (cash, card) in [("abc", "0"), ("10", "-3"), ("", "0")] {
            let err = engine
                .reconcile_input("L1", cash, card, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{cash}/{card}");
        }
        assert!(engine.list_cortes("L1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_run_is_a_new_snapshot() {
        let bodega = bodega().await;
        let engine = bodega.cortes();

        let first = engine
            .reconcile_input("L1", "$0", "0", Utc::now())
            .await
            .unwrap();
        let second = engine
            .reconcile_input("L1", "0.00", "0", Utc::now())
            .await
            .unwrap();

        assert_ne!(first.corte.id, second.corte.id);
        assert_eq!(engine.list_cortes("L1", 10).await.unwrap().len(), 2);
        assert!(engine.list_cortes("L2", 10).await.unwrap().is_empty());

        let err = engine.get_corte("missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}

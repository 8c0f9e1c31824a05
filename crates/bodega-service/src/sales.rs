//! # Sale Processor
//!
//! Turns carts into immutable, numbered tickets and drives the stock
//! deduction for them.
//!
//! ## Ticket Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    process_ticket                                       │
//! │                                                                         │
//! │  1. Validate request           (empty cart, location, cash tendered)    │
//! │  2. Load products              (ProductNotFound aborts)                 │
//! │  3. Freeze lines               pieces, price, cost, profit per line     │
//! │  4. Plan stock draws           pooled availability, InsufficientStock   │
//! │                                                                         │
//! │  ┌───────────────── one transaction ─────────────────┐                  │
//! │  │ 5. counter L1 += 1  → sequence, "L1-{sequence}"   │                  │
//! │  │ 6. INSERT ticket + lines                          │                  │
//! │  │ 7. conditional decrement per draw                 │ ◄─ conflict:     │
//! │  └───────────────────────────────────────────────────┘    retry once    │
//! │                                                                         │
//! │  8. Spawn sale event           (never fails the sale)                   │
//! │  9. Return ticket + refreshed products                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Mobile Orders
//! ```text
//! process_mobile_ticket   paid + completed at creation, deducts now
//!
//! create_mobile_order     unpaid + pending, no deduction
//!        │
//!        ▼
//! update_mobile_ticket    payment:     unpaid ──► paid (terminal)
//!                         fulfillment: pending ──► processing ──► completed
//!                         first time fulfillment reaches completed, the
//!                         order's stock is deducted (once, stock_deducted)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bodega_core::cart::Cart;
use bodega_core::stock::{plan_ticket_draws, PoolPolicy, ProductDraw};
use bodega_core::ticket::{
    build_line, check_fulfillment_transition, check_payment_transition, summarize, tender,
    SaleLine,
};
use bodega_core::validation::{validate_location, validate_text};
use bodega_core::{
    CoreError, FulfillmentStatus, GeoPoint, MobileTicket, Money, PaymentStatus, PaymentType,
    Product, Ticket, TicketLine, MAX_CART_ITEMS,
};
use bodega_db::Database;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{retry_on_conflict, ServiceError, ServiceResult};
use crate::notify::{dispatch, SaleEvent, SaleNotifier};

/// Sync status given to mobile orders that don't carry one.
pub const DEFAULT_SYNC_STATUS: &str = "synced";

// =============================================================================
// Requests and Receipts
// =============================================================================

/// A register sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub location: String,
    pub lines: Vec<SaleLine>,
    pub payment_type: PaymentType,
    /// Cash tendered. Required for cash; ignored for card.
    pub amount_paid_cents: Option<i64>,
}

/// The committed ticket plus the products it touched, re-read after the
/// deduction so the register can refresh its stock display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReceipt {
    pub ticket: Ticket,
    pub updated_products: Vec<Product>,
}

/// A mobile order as captured on a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileOrderRequest {
    pub location: String,
    pub lines: Vec<SaleLine>,
    pub customer_name: String,
    pub device_id: Option<String>,
    pub coordinates: Option<GeoPoint>,
    pub sync_status: Option<String>,
}

/// Status change of a mobile order. `None` leaves a field as it is.
///
/// Payment type and amount are only accepted together with the change to
/// `paid`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileTicketUpdate {
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub payment_type: Option<PaymentType>,
    pub amount_paid_cents: Option<i64>,
    pub sync_status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileReceipt {
    pub ticket: MobileTicket,
    /// Products whose stock changed; empty when nothing was deducted.
    pub updated_products: Vec<Product>,
}

/// Lines frozen against the current catalog.
struct PricedOrder {
    lines: Vec<TicketLine>,
    total: Money,
    profit: Money,
    products: HashMap<String, Product>,
}

impl PricedOrder {
    fn demands(&self) -> Vec<(String, i64)> {
        self.lines
            .iter()
            .map(|l| (l.product_id.clone(), l.pieces))
            .collect()
    }
}

struct MobileChange {
    ticket: MobileTicket,
    became_paid: bool,
    deducted: bool,
}

// =============================================================================
// Processor
// =============================================================================

/// Ticket and mobile order processing.
#[derive(Clone)]
pub struct SaleProcessor {
    db: Database,
    policy: PoolPolicy,
    notifier: Arc<dyn SaleNotifier>,
    notify_timeout: Duration,
}

impl SaleProcessor {
    pub fn new(
        db: Database,
        policy: PoolPolicy,
        notifier: Arc<dyn SaleNotifier>,
        notify_timeout: Duration,
    ) -> Self {
        SaleProcessor {
            db,
            policy,
            notifier,
            notify_timeout,
        }
    }

    // =========================================================================
    // Register Tickets
    // =========================================================================

    /// Records a register sale and deducts its stock.
    ///
    /// ## Returns
    /// * `Err(ServiceError::Validation)` - empty cart, bad line, cash that
    ///   doesn't cover the total
    /// * `Err(ServiceError::NotFound)` - a line names an unknown product
    /// * `Err(ServiceError::InsufficientStock)` - pooled stock can't cover a
    ///   line
    /// * `Err(ServiceError::ConcurrencyConflict)` - lost a stock race twice
    pub async fn process_ticket(&self, request: TicketRequest) -> ServiceResult<TicketReceipt> {
        check_order_shape(&request.location, &request.lines)?;
        if let Some(paid) = request.amount_paid_cents {
            if paid < 0 {
                return Err(CoreError::invalid_amount("amount_paid", "must not be negative").into());
            }
        }

        let ticket = retry_on_conflict("process_ticket", || self.try_process_ticket(&request)).await?;

        info!(
            ticket_id = %ticket.ticket_id,
            total_cents = ticket.total_cents,
            profit_cents = ticket.profit_cents,
            "Ticket processed"
        );

        dispatch(
            self.notifier.clone(),
            SaleEvent::from_ticket(&ticket),
            self.notify_timeout,
        );

        let updated_products = self.reload_products(&ticket.lines).await;
        Ok(TicketReceipt {
            ticket,
            updated_products,
        })
    }

    /// Checks out a register cart.
    pub async fn checkout(
        &self,
        location: &str,
        cart: &Cart,
        payment_type: PaymentType,
        amount_paid_cents: Option<i64>,
    ) -> ServiceResult<TicketReceipt> {
        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        self.process_ticket(TicketRequest {
            location: location.to_string(),
            lines: cart.to_sale_lines(),
            payment_type,
            amount_paid_cents,
        })
        .await
    }

    async fn try_process_ticket(&self, request: &TicketRequest) -> ServiceResult<Ticket> {
        let order = self.price_order(&request.lines).await?;
        let settled = tender(
            request.payment_type,
            order.total,
            request.amount_paid_cents.map(Money::from_cents),
        )?;
        let draws = plan_ticket_draws(
            &order.demands(),
            &order.products,
            &request.location,
            &self.policy,
        )?;

        let draft = Ticket {
            ticket_id: String::new(),
            location: request.location.clone(),
            sequence: 0,
            lines: order.lines,
            total_cents: order.total.cents(),
            profit_cents: order.profit.cents(),
            payment_type: request.payment_type,
            amount_paid_cents: settled.amount_paid.cents(),
            change_cents: settled.change.cents(),
            created_at: Utc::now(),
        };

        Ok(self.db.tickets().create_ticket(draft, &draws).await?)
    }

    // =========================================================================
    // Mobile Orders
    // =========================================================================

    /// Records a mobile sale paid and handed over on the spot.
    pub async fn process_mobile_ticket(
        &self,
        request: MobileOrderRequest,
        payment_type: PaymentType,
        amount_paid_cents: Option<i64>,
    ) -> ServiceResult<MobileReceipt> {
        check_mobile_request(&request)?;

        let ticket = retry_on_conflict("process_mobile_ticket", || {
            self.try_create_mobile(&request, Some((payment_type, amount_paid_cents)))
        })
        .await?;

        info!(ticket_id = %ticket.ticket_id, total_cents = ticket.total_cents, "Mobile sale processed");

        dispatch(
            self.notifier.clone(),
            SaleEvent::from_mobile(&ticket),
            self.notify_timeout,
        );

        let updated_products = self.reload_products(&ticket.lines).await;
        Ok(MobileReceipt {
            ticket,
            updated_products,
        })
    }

    /// Records an unpaid, pending mobile order. Stock must cover the order
    /// now but is only deducted once the order is completed.
    pub async fn create_mobile_order(&self, request: MobileOrderRequest) -> ServiceResult<MobileTicket> {
        check_mobile_request(&request)?;

        let ticket =
            retry_on_conflict("create_mobile_order", || self.try_create_mobile(&request, None))
                .await?;

        info!(ticket_id = %ticket.ticket_id, customer = %ticket.customer_name, "Mobile order created");
        Ok(ticket)
    }

    /// Moves a mobile order's payment and/or fulfillment status.
    ///
    /// ## Rules
    /// - Payment: `unpaid → paid` only; marking paid needs a payment type
    ///   and, for cash, an amount covering the total
    /// - Fulfillment: forward only, steps may be skipped
    /// - First arrival at `completed` deducts the order's stock
    pub async fn update_mobile_ticket(
        &self,
        ticket_id: &str,
        update: MobileTicketUpdate,
    ) -> ServiceResult<MobileReceipt> {
        if let Some(status) = &update.sync_status {
            validate_text("sync_status", status, 50)?;
        }

        let change = retry_on_conflict("update_mobile_ticket", || {
            self.try_update_mobile(ticket_id, &update)
        })
        .await?;

        if change.became_paid {
            dispatch(
                self.notifier.clone(),
                SaleEvent::from_mobile(&change.ticket),
                self.notify_timeout,
            );
        }

        let updated_products = if change.deducted {
            self.reload_products(&change.ticket.lines).await
        } else {
            Vec::new()
        };

        Ok(MobileReceipt {
            ticket: change.ticket,
            updated_products,
        })
    }

    /// `settlement` is `Some` for a sale paid at creation.
    async fn try_create_mobile(
        &self,
        request: &MobileOrderRequest,
        settlement: Option<(PaymentType, Option<i64>)>,
    ) -> ServiceResult<MobileTicket> {
        let order = self.price_order(&request.lines).await?;
        let draws = plan_ticket_draws(
            &order.demands(),
            &order.products,
            &request.location,
            &self.policy,
        )?;

        let now = Utc::now();
        let mut draft = MobileTicket {
            ticket_id: String::new(),
            location: request.location.clone(),
            sequence: 0,
            lines: order.lines,
            total_cents: order.total.cents(),
            profit_cents: order.profit.cents(),
            customer_name: request.customer_name.trim().to_string(),
            payment_type: None,
            amount_paid_cents: None,
            change_cents: None,
            payment_status: PaymentStatus::Unpaid,
            fulfillment_status: FulfillmentStatus::Pending,
            device_id: request.device_id.clone(),
            coordinates: request.coordinates,
            sync_status: request
                .sync_status
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNC_STATUS.to_string()),
            stock_deducted: false,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };

        let applied: &[ProductDraw] = match settlement {
            Some((payment_type, amount_paid)) => {
                let settled = tender(payment_type, order.total, amount_paid.map(Money::from_cents))?;
                draft.payment_type = Some(payment_type);
                draft.amount_paid_cents = Some(settled.amount_paid.cents());
                draft.change_cents = Some(settled.change.cents());
                draft.payment_status = PaymentStatus::Paid;
                draft.paid_at = Some(now);
                draft.fulfillment_status = FulfillmentStatus::Completed;
                draft.stock_deducted = true;
                &draws
            }
            None => &[],
        };

        Ok(self.db.tickets().create_mobile_ticket(draft, applied).await?)
    }

    async fn try_update_mobile(
        &self,
        ticket_id: &str,
        update: &MobileTicketUpdate,
    ) -> ServiceResult<MobileChange> {
        let current = self.get_mobile_ticket(ticket_id).await?;
        let now = Utc::now();
        let mut next = current.clone();
        let mut changed = false;
        let mut became_paid = false;

        match update.payment_status {
            Some(status) if check_payment_transition(current.payment_status, status)? => {
                let payment_type = update
                    .payment_type
                    .or(current.payment_type)
                    .ok_or_else(|| ServiceError::validation("payment_type is required to mark an order paid"))?;
                let settled = tender(
                    payment_type,
                    current.total(),
                    update.amount_paid_cents.map(Money::from_cents),
                )?;
                next.payment_type = Some(payment_type);
                next.amount_paid_cents = Some(settled.amount_paid.cents());
                next.change_cents = Some(settled.change.cents());
                next.payment_status = PaymentStatus::Paid;
                next.paid_at = Some(now);
                changed = true;
                became_paid = true;
            }
            _ if update.payment_type.is_some() || update.amount_paid_cents.is_some() => {
                return Err(ServiceError::validation(
                    "payment details are only accepted when marking an order paid",
                ));
            }
            _ => {}
        }

        if let Some(status) = update.fulfillment_status {
            if check_fulfillment_transition(current.fulfillment_status, status)? {
                next.fulfillment_status = status;
                changed = true;
            }
        }

        if let Some(sync_status) = &update.sync_status {
            if *sync_status != current.sync_status {
                next.sync_status = sync_status.clone();
                changed = true;
            }
        }

        let mut draws = Vec::new();
        if next.fulfillment_status == FulfillmentStatus::Completed && !current.stock_deducted {
            let products = self.load_products(next.lines.iter().map(|l| l.product_id.as_str())).await?;
            let demands: Vec<(String, i64)> = next
                .lines
                .iter()
                .map(|l| (l.product_id.clone(), l.pieces))
                .collect();
            draws = plan_ticket_draws(&demands, &products, &next.location, &self.policy)?;
            next.stock_deducted = true;
        }

        if !changed {
            debug!(ticket_id = %ticket_id, "Mobile ticket update changes nothing");
            return Ok(MobileChange {
                ticket: current,
                became_paid: false,
                deducted: false,
            });
        }

        next.updated_at = now;
        let deducted = next.stock_deducted && !current.stock_deducted;
        let ticket = self
            .db
            .tickets()
            .update_mobile_ticket(&current, &next, &draws)
            .await?;

        info!(
            ticket_id = %ticket.ticket_id,
            payment = %ticket.payment_status,
            fulfillment = %ticket.fulfillment_status,
            deducted,
            "Mobile ticket updated"
        );

        Ok(MobileChange {
            ticket,
            became_paid,
            deducted,
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_ticket(&self, ticket_id: &str) -> ServiceResult<Ticket> {
        self.db
            .tickets()
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()).into())
    }

    pub async fn get_mobile_ticket(&self, ticket_id: &str) -> ServiceResult<MobileTicket> {
        self.db
            .tickets()
            .get_mobile_ticket(ticket_id)
            .await?
            .ok_or_else(|| CoreError::TicketNotFound(ticket_id.to_string()).into())
    }

    /// Register tickets of a location created in `[start, end)`.
    pub async fn list_tickets(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<Ticket>> {
        check_window(location, start, end)?;
        Ok(self.db.tickets().list_tickets(location, start, end).await?)
    }

    /// Mobile tickets of a location created in `[start, end)`.
    pub async fn list_mobile_tickets(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<MobileTicket>> {
        check_window(location, start, end)?;
        Ok(self.db.tickets().list_mobile_tickets(location, start, end).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn price_order(&self, sale_lines: &[SaleLine]) -> ServiceResult<PricedOrder> {
        let products = self
            .load_products(sale_lines.iter().map(|l| l.product_id.as_str()))
            .await?;

        let lines = sale_lines
            .iter()
            .map(|line| {
                let product = products
                    .get(&line.product_id)
                    .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
                build_line(product, line)
            })
            .collect::<Result<Vec<_>, CoreError>>()?;
        let totals = summarize(&lines)?;

        Ok(PricedOrder {
            lines,
            total: totals.total,
            profit: totals.profit,
            products,
        })
    }

    async fn load_products<'a>(
        &self,
        ids: impl Iterator<Item = &'a str>,
    ) -> ServiceResult<HashMap<String, Product>> {
        let mut products = HashMap::new();
        for id in ids {
            if products.contains_key(id) {
                continue;
            }
            let product = self
                .db
                .products()
                .get_by_id(id)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(id.to_string()))?;
            products.insert(id.to_string(), product);
        }
        Ok(products)
    }

    /// Products of `lines` in first-appearance order.
    ///
    /// Runs after the ticket has committed, so a failed read only shortens
    /// the list: the sale itself must still be reported as done.
    async fn reload_products(&self, lines: &[TicketLine]) -> Vec<Product> {
        let mut seen = Vec::new();
        for line in lines {
            if !seen.contains(&line.product_id.as_str()) {
                seen.push(line.product_id.as_str());
            }
        }

        let mut products = Vec::with_capacity(seen.len());
        for id in seen {
            match self.db.products().get_by_id(id).await {
                Ok(Some(product)) => products.push(product),
                Ok(None) => {}
                Err(e) => {
                    warn!(product_id = %id, error = %e, "Could not refresh product after sale");
                }
            }
        }
        products
    }
}

fn check_order_shape(location: &str, lines: &[SaleLine]) -> ServiceResult<()> {
    validate_location("location", location)?;
    if lines.is_empty() {
        return Err(CoreError::EmptyCart.into());
    }
    if lines.len() > MAX_CART_ITEMS {
        return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS }.into());
    }
    Ok(())
}

fn check_mobile_request(request: &MobileOrderRequest) -> ServiceResult<()> {
    check_order_shape(&request.location, &request.lines)?;
    validate_text("customer_name", &request.customer_name, 120)?;
    if let Some(status) = &request.sync_status {
        validate_text("sync_status", status, 50)?;
    }
    Ok(())
}

pub(crate) fn check_window(
    location: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ServiceResult<()> {
    validate_location("location", location)?;
    if start >= end {
        return Err(ServiceError::validation("window start must be before its end"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StockScope;
    use crate::notify::BroadcastNotifier;
    use crate::test_support::{
        bodega, bodega_with, file_bodega, insert_product, sample_product, FailingNotifier,
        StalledNotifier,
    };
    use crate::Bodega;
    use bodega_core::catalog::NewProduct;
    use bodega_core::UnitType;
    use chrono::Duration as ChronoDuration;

    async fn setup() -> (Bodega, Product) {
        let bodega = bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;
        (bodega, product)
    }

    fn line(product: &Product, quantity: i64, unit: UnitType, price: i64) -> SaleLine {
        SaleLine {
            product_id: product.id.clone(),
            quantity,
            unit_type: unit,
            price_per_unit_cents: price,
        }
    }

    fn cash_request(product: &Product, pieces: i64, price: i64, paid: i64) -> TicketRequest {
        TicketRequest {
            location: "L1".to_string(),
            lines: vec![line(product, pieces, UnitType::Pieces, price)],
            payment_type: PaymentType::Cash,
            amount_paid_cents: Some(paid),
        }
    }

    fn mobile_request(product: &Product, pieces: i64) -> MobileOrderRequest {
        MobileOrderRequest {
            location: "L1".to_string(),
            lines: vec![line(product, pieces, UnitType::Pieces, 800)],
            customer_name: "Doña Carmen".to_string(),
            device_id: Some("tablet-3".to_string()),
            coordinates: Some(GeoPoint {
                latitude: 19.43,
                longitude: -99.13,
            }),
            sync_status: None,
        }
    }

    #[tokio::test]
    async fn test_cart_checkout_end_to_end() {
        let (bodega, product) = setup().await;

        let mut cart = Cart::new();
        cart.add_item(&product, 15, UnitType::Pieces, 100).unwrap();
        assert_eq!(cart.items[0].applied_price_cents, 700);

        let receipt = bodega
            .sales()
            .checkout("L1", &cart, PaymentType::Cash, Some(12_000))
            .await
            .unwrap();

        let ticket = &receipt.ticket;
        assert_eq!(ticket.ticket_id, "L1-1");
        assert_eq!(ticket.sequence, 1);
        assert_eq!(ticket.total_cents, 10_500);
        assert_eq!(ticket.change_cents, 1_500);
        assert_eq!(ticket.profit_cents, 3_000);
        assert_eq!(receipt.updated_products[0].stock_at("L1"), 85);
    }

    #[tokio::test]
    async fn test_boxes_and_pieces_of_same_product() {
        let (bodega, product) = setup().await;

        let request = TicketRequest {
            location: "L1".to_string(),
            lines: vec![
                line(&product, 2, UnitType::Boxes, 700),
                line(&product, 3, UnitType::Pieces, 700),
            ],
            payment_type: PaymentType::Card,
            amount_paid_cents: None,
        };
        let receipt = bodega.sales().process_ticket(request).await.unwrap();

        assert_eq!(receipt.ticket.lines[0].pieces, 20);
        assert_eq!(receipt.ticket.total_cents, 23 * 700);
        assert_eq!(receipt.ticket.amount_paid_cents, 23 * 700);
        assert_eq!(receipt.ticket.change_cents, 0);
        assert_eq!(receipt.updated_products.len(), 1);
        assert_eq!(receipt.updated_products[0].stock_at("L1"), 77);
    }

    #[tokio::test]
    async fn test_rejections_write_nothing() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let err = sales
            .process_ticket(cash_request(&product, 101, 800, 100_000))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));

        let err = sales
            .process_ticket(cash_request(&product, 10, 800, 7_999))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut unknown = cash_request(&product, 1, 800, 800);
        unknown.lines[0].product_id = "missing".to_string();
        let err = sales.process_ticket(unknown).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let mut empty = cash_request(&product, 1, 800, 800);
        empty.lines.clear();
        assert!(sales.process_ticket(empty).await.is_err());

        assert_eq!(
            bodega
                .ledger()
                .get_total_stock(&product.id, "L1", StockScope::Exact)
                .await
                .unwrap(),
            100
        );

        // No sequence number was consumed
        let receipt = sales
            .process_ticket(cash_request(&product, 1, 800, 800))
            .await
            .unwrap();
        assert_eq!(receipt.ticket.ticket_id, "L1-1");
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_a_validation_error() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let request = TicketRequest {
            location: "L1".to_string(),
            lines: vec![line(&product, 3, UnitType::Pieces, i64::MAX / 2)],
            payment_type: PaymentType::Card,
            amount_paid_cents: None,
        };
        let err = sales.process_ticket(request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let receipt = sales
            .process_ticket(cash_request(&product, 1, 800, 800))
            .await
            .unwrap();
        assert_eq!(receipt.ticket.ticket_id, "L1-1");
    }

    #[tokio::test]
    async fn test_refresh_failure_after_commit_still_returns_products_read() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let receipt = sales
            .process_ticket(cash_request(&product, 1, 800, 800))
            .await
            .unwrap();
        assert_eq!(sales.reload_products(&receipt.ticket.lines).await.len(), 1);

        // The sale is durable; a store that stops answering only empties the refresh
        bodega.database().close().await;
        assert!(sales.reload_products(&receipt.ticket.lines).await.is_empty());
    }

    #[tokio::test]
    async fn test_pooled_deduction_from_bulk() {
        let bodega = bodega().await;
        let product = insert_product(
            bodega.database(),
            NewProduct::new("CJ-AGU", "PZ-AGU", "Agua 1L", 12, 900)
                .with_stock("L1", 4)
                .with_stock("BODEGA-1", 24),
        )
        .await;

        let receipt = bodega
            .sales()
            .process_ticket(cash_request(&product, 10, 1_200, 20_000))
            .await
            .unwrap();

        let after = &receipt.updated_products[0];
        assert_eq!(after.stock_at("L1"), 0);
        assert_eq!(after.stock_at("BODEGA-1"), 18);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sequences_are_gapless() {
        let (bodega, product) = setup().await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let sales = bodega.sales();
            let request = cash_request(&product, 1, 800, 1_000);
            handles.push(tokio::spawn(async move { sales.process_ticket(request).await }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap().ticket.sequence);
        }
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=10).collect::<Vec<i64>>());
        assert_eq!(
            bodega
                .ledger()
                .get_total_stock(&product.id, "L1", StockScope::Exact)
                .await
                .unwrap(),
            90
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequences_stay_gapless_across_pooled_connections() {
        let (bodega, _dir) = file_bodega().await;
        let product = insert_product(bodega.database(), sample_product()).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let sales = bodega.sales();
            let request = cash_request(&product, 1, 800, 1_000);
            handles.push(tokio::spawn(async move { sales.process_ticket(request).await }));
        }

        let mut sequences = Vec::new();
        for handle in handles {
            sequences.push(handle.await.unwrap().unwrap().ticket.sequence);
        }
        sequences.sort_unstable();

        assert_eq!(sequences, (1..=12).collect::<Vec<i64>>());
        assert_eq!(
            bodega
                .ledger()
                .get_total_stock(&product.id, "L1", StockScope::Exact)
                .await
                .unwrap(),
            88
        );
    }

    #[tokio::test]
    async fn test_failing_notifier_never_fails_the_sale() {
        for notifier in [
            Arc::new(FailingNotifier) as Arc<dyn SaleNotifier>,
            Arc::new(StalledNotifier) as Arc<dyn SaleNotifier>,
        ] {
            let bodega = bodega_with(notifier).await;
            let product = insert_product(bodega.database(), sample_product()).await;

            let receipt = bodega
                .sales()
                .process_ticket(cash_request(&product, 1, 800, 800))
                .await
                .unwrap();
            assert_eq!(receipt.ticket.ticket_id, "L1-1");
        }
    }

    #[tokio::test]
    async fn test_sale_event_published() {
        let notifier = Arc::new(BroadcastNotifier::new());
        let mut sales_topic = notifier.subscribe("sales").await;
        let bodega = bodega_with(notifier.clone()).await;
        let product = insert_product(bodega.database(), sample_product()).await;

        bodega
            .sales()
            .process_ticket(cash_request(&product, 15, 700, 12_000))
            .await
            .unwrap();

        let payload = tokio::time::timeout(std::time::Duration::from_secs(2), sales_topic.recv())
            .await
            .unwrap()
            .unwrap();
        let event: SaleEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(event.ticket_id, "L1-1");
        assert_eq!(event.total_cents, 10_500);
        assert_eq!(event.profit_cents, 3_000);
        assert_eq!(event.item_count, 1);
    }

    #[tokio::test]
    async fn test_mobile_sale_deducts_and_numbers_separately() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        sales
            .process_ticket(cash_request(&product, 1, 800, 800))
            .await
            .unwrap();
        let receipt = sales
            .process_mobile_ticket(mobile_request(&product, 5), PaymentType::Card, None)
            .await
            .unwrap();

        let ticket = &receipt.ticket;
        assert_eq!(ticket.ticket_id, "L1-M-1");
        assert!(ticket.is_paid());
        assert_eq!(ticket.fulfillment_status, FulfillmentStatus::Completed);
        assert!(ticket.stock_deducted);
        assert_eq!(receipt.updated_products[0].stock_at("L1"), 94);
    }

    #[tokio::test]
    async fn test_store_location_named_like_mobile_prefix() {
        let bodega = bodega().await;
        let product = insert_product(
            bodega.database(),
            sample_product().with_stock("L1-M", 20),
        )
        .await;
        let sales = bodega.sales();

        let mut request = cash_request(&product, 2, 800, 1_600);
        request.location = "L1-M".to_string();
        let store = sales.process_ticket(request).await.unwrap();
        assert_eq!(store.ticket.ticket_id, "L1-M-1");

        let first = sales.create_mobile_order(mobile_request(&product, 5)).await.unwrap();
        let second = sales.create_mobile_order(mobile_request(&product, 3)).await.unwrap();
        assert_eq!(first.ticket_id, "L1-M-1");
        assert_eq!(second.ticket_id, "L1-M-2");

        assert_eq!(sales.get_ticket("L1-M-1").await.unwrap().lines[0].pieces, 2);
        assert_eq!(sales.get_mobile_ticket("L1-M-1").await.unwrap().lines[0].pieces, 5);
    }

    #[tokio::test]
    async fn test_deferred_order_lifecycle() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let order = sales.create_mobile_order(mobile_request(&product, 5)).await.unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Unpaid);
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Pending);
        assert!(order.payment_type.is_none());
        assert_eq!(order.sync_status, DEFAULT_SYNC_STATUS);

        let stock = |b: &Bodega| {
            let ledger = b.ledger();
            let id = product.id.clone();
            async move { ledger.get_total_stock(&id, "L1", StockScope::Exact).await.unwrap() }
        };
        assert_eq!(stock(&bodega).await, 100);

        // Marking paid without a payment type is rejected
        let err = sales
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let receipt = sales
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    payment_status: Some(PaymentStatus::Paid),
                    payment_type: Some(PaymentType::Cash),
                    amount_paid_cents: Some(5_000),
                    fulfillment_status: Some(FulfillmentStatus::Processing),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(receipt.ticket.change_cents, Some(1_000));
        assert!(receipt.updated_products.is_empty());
        assert_eq!(stock(&bodega).await, 100);

        let receipt = sales
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    fulfillment_status: Some(FulfillmentStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(receipt.ticket.stock_deducted);
        assert_eq!(receipt.updated_products[0].stock_at("L1"), 95);

        // Repeating completed changes nothing and deducts nothing
        let receipt = sales
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    fulfillment_status: Some(FulfillmentStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(receipt.updated_products.is_empty());
        assert_eq!(stock(&bodega).await, 95);

        // Backwards and paid→unpaid are rejected
        for update in [
            MobileTicketUpdate {
                fulfillment_status: Some(FulfillmentStatus::Pending),
                ..Default::default()
            },
            MobileTicketUpdate {
                payment_status: Some(PaymentStatus::Unpaid),
                ..Default::default()
            },
        ] {
            let err = sales.update_mobile_ticket(&order.ticket_id, update).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_completing_without_stock_fails_cleanly() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let order = sales.create_mobile_order(mobile_request(&product, 60)).await.unwrap();
        sales
            .process_ticket(cash_request(&product, 50, 600, 30_000))
            .await
            .unwrap();

        let err = sales
            .update_mobile_ticket(
                &order.ticket_id,
                MobileTicketUpdate {
                    fulfillment_status: Some(FulfillmentStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock { .. }));

        let order = sales.get_mobile_ticket(&order.ticket_id).await.unwrap();
        assert_eq!(order.fulfillment_status, FulfillmentStatus::Pending);
        assert!(!order.stock_deducted);
    }

    #[tokio::test]
    async fn test_reads_and_windows() {
        let (bodega, product) = setup().await;
        let sales = bodega.sales();

        let receipt = sales
            .process_ticket(cash_request(&product, 1, 800, 800))
            .await
            .unwrap();
        let fetched = sales.get_ticket(&receipt.ticket.ticket_id).await.unwrap();
        assert_eq!(fetched.lines.len(), 1);

        let err = sales.get_ticket("L1-99").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));

        let now = Utc::now();
        let listed = sales
            .list_tickets("L1", now - ChronoDuration::hours(1), now + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let err = sales.list_tickets("L1", now, now).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}

//! # Ticket Math
//!
//! Line totals, profit, tender and the mobile order status rules.
//!
//! ## Line Calculation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleLine { qty 3, boxes, price 15 }   Product { piecesPerBox 10,       │
//! │                                                  cost 10 }              │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  pieces = 3 × 10 = 30                                                   │
//! │  total  = 15 × 30 = 450                                                 │
//! │  profit = (15 - 10) × 30 = 150                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Profit is always computed on pieces, never on the entered quantity, and
//! the ticket profit is the exact sum of its line profits (integer cents, no
//! rounding anywhere).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{FulfillmentStatus, PaymentStatus, PaymentType, Product, TicketLine, UnitType};
use crate::validation::{validate_price_cents, validate_quantity};

/// A line submitted for checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_type: UnitType,
    /// Price per piece the cart applied.
    pub price_per_unit_cents: i64,
}

/// Freezes a sale line against the current product.
///
/// Cost comes from the product as it is now; the price is the one the cart
/// applied.
pub fn build_line(product: &Product, line: &SaleLine) -> CoreResult<TicketLine> {
    validate_quantity(line.quantity)?;
    validate_price_cents("price_per_unit", line.price_per_unit_cents)?;

    let pieces = product.checked_pieces_for(line.quantity, line.unit_type)?;
    let price = Money::from_cents(line.price_per_unit_cents);
    let cost = product.cost();

    let out_of_range = || CoreError::invalid_amount("price_per_unit", "line total is out of range");
    let total = price.checked_multiply_quantity(pieces).ok_or_else(out_of_range)?;
    let profit = price
        .checked_sub(cost)
        .and_then(|margin| margin.checked_multiply_quantity(pieces))
        .ok_or_else(out_of_range)?;

    Ok(TicketLine {
        product_id: product.id.clone(),
        name: product.name.clone(),
        quantity: line.quantity,
        unit_type: line.unit_type,
        pieces,
        price_per_unit_cents: price.cents(),
        cost_per_unit_cents: cost.cents(),
        total_cents: total.cents(),
        profit_cents: profit.cents(),
    })
}

/// Aggregate figures of a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketTotals {
    pub total: Money,
    pub profit: Money,
    pub pieces: i64,
}

/// Sums `lines`. Fails rather than wrapping when a sum leaves `i64`.
pub fn summarize(lines: &[TicketLine]) -> CoreResult<TicketTotals> {
    let mut totals = TicketTotals {
        total: Money::zero(),
        profit: Money::zero(),
        pieces: 0,
    };
    for line in lines {
        totals.total = totals
            .total
            .checked_add(line.total())
            .ok_or_else(|| CoreError::invalid_amount("total", "ticket total is out of range"))?;
        totals.profit = totals
            .profit
            .checked_add(line.profit())
            .ok_or_else(|| CoreError::invalid_amount("profit", "ticket profit is out of range"))?;
        totals.pieces = totals
            .pieces
            .checked_add(line.pieces)
            .ok_or_else(|| CoreError::invalid_amount("quantity", "ticket pieces are out of range"))?;
    }
    Ok(totals)
}

/// Amount received and change due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tender {
    pub amount_paid: Money,
    pub change: Money,
}

/// Settles `total` with `payment_type`.
///
/// ## Rules
/// - Cash: `amount_paid` is required and must cover the total
/// - Card: charged for exactly the total; no change
///
/// ```rust
/// use bodega_core::money::Money;
/// use bodega_core::ticket::tender;
/// use bodega_core::PaymentType;
///
/// let t = tender(PaymentType::Cash, Money::from_units(105), Some(Money::from_units(120))).unwrap();
/// assert_eq!(t.change, Money::from_units(15));
/// ```
pub fn tender(
    payment_type: PaymentType,
    total: Money,
    amount_paid: Option<Money>,
) -> CoreResult<Tender> {
    match payment_type {
        PaymentType::Cash => {
            let paid = amount_paid
                .ok_or_else(|| CoreError::invalid_amount("amount_paid", "required for cash"))?;
            if paid < total {
                return Err(CoreError::invalid_amount(
                    "amount_paid",
                    format!("{} does not cover total {}", paid, total),
                ));
            }
            Ok(Tender {
                amount_paid: paid,
                change: paid - total,
            })
        }
        PaymentType::Card => {
            if let Some(paid) = amount_paid {
                if paid.is_negative() {
                    return Err(CoreError::invalid_amount("amount_paid", "must not be negative"));
                }
            }
            Ok(Tender {
                amount_paid: total,
                change: Money::zero(),
            })
        }
    }
}

// =============================================================================
// Mobile Order Status
// =============================================================================

/// Checks a payment status change.
///
/// Returns `true` when the status actually changes. Unpaid→unpaid is a
/// no-op; paid is terminal.
pub fn check_payment_transition(from: PaymentStatus, to: PaymentStatus) -> CoreResult<bool> {
    match (from, to) {
        (PaymentStatus::Unpaid, PaymentStatus::Paid) => Ok(true),
        (PaymentStatus::Unpaid, PaymentStatus::Unpaid) => Ok(false),
        (PaymentStatus::Paid, _) => Err(CoreError::InvalidStatusTransition {
            field: "payment_status".to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Checks a fulfillment status change. Forward only; steps may be skipped.
///
/// Returns `true` when the status actually changes.
pub fn check_fulfillment_transition(
    from: FulfillmentStatus,
    to: FulfillmentStatus,
) -> CoreResult<bool> {
    if to.rank() < from.rank() {
        return Err(CoreError::InvalidStatusTransition {
            field: "fulfillment_status".to_string(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(to.rank() > from.rank())
}

//! # Corte (Till Close) Arithmetic
//!
//! Aggregates what a location sold and moved in one business day into the
//! amounts the drawer and the card terminal should hold, then compares them
//! with what the operator counted.
//!
//! ## Aggregation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Tickets           {cash 100}, {card 50}, {cash 30}                    │
//! │  Mobile orders     money on the day they are paid (paid_at);           │
//! │                    counted as tickets on the day they are taken        │
//! │  Cash movements    in 20, out 5                                        │
//! │                                                                         │
//! │  expected cash = 100 + 30 + (20 - 5) = 145                             │
//! │  expected card = 50                                                    │
//! │                                                                         │
//! │  counted cash 140  →  variance -5  →  "Falta $5.00"                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::calendar::BusinessDay;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CashMovement, Corte, MobileTicket, PaymentType, Ticket};

/// Difference between a counted and an expected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "lowercase")]
pub enum Variance {
    /// More money than expected.
    Surplus(Money),
    /// Less money than expected.
    Shortage(Money),
    Exact,
}

impl Variance {
    /// Classifies `actual - expected`.
    pub fn between(actual: Money, expected: Money) -> Self {
        Self::from_signed(actual - expected)
    }

    pub fn from_signed(diff: Money) -> Self {
        if diff.is_positive() {
            Variance::Surplus(diff)
        } else if diff.is_negative() {
            Variance::Shortage(diff.abs())
        } else {
            Variance::Exact
        }
    }

    /// Signed amount: positive surplus, negative shortage.
    pub fn signed(&self) -> Money {
        match self {
            Variance::Surplus(m) => *m,
            Variance::Shortage(m) => -*m,
            Variance::Exact => Money::zero(),
        }
    }
}

impl fmt::Display for Variance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variance::Surplus(m) => write!(f, "Sobra {}", m),
            Variance::Shortage(m) => write!(f, "Falta {}", m),
            Variance::Exact => write!(f, "Monto exacto"),
        }
    }
}

/// Expected amounts of one location and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorteTotals {
    pub cash_from_sales: Money,
    pub card_from_sales: Money,
    /// Sum of cash in minus cash out.
    pub net_cash_movements: Money,
    pub total_tickets: i64,
}

impl CorteTotals {
    pub fn expected_cash(&self) -> Money {
        self.cash_from_sales + self.net_cash_movements
    }

    pub fn expected_card(&self) -> Money {
        self.card_from_sales
    }
}

/// Aggregates the records of one location and business day.
///
/// `tickets` and `movements` are already filtered to the location and day.
/// `mobile_tickets` holds the location's orders created or paid during the
/// day: every order created in the day counts as a ticket, and an order's
/// money counts on the day it was paid, whenever it was created.
pub fn aggregate(
    day: &BusinessDay,
    tickets: &[Ticket],
    mobile_tickets: &[MobileTicket],
    movements: &[CashMovement],
) -> CorteTotals {
    let mut totals = CorteTotals::default();

    let mut add = |payment_type: PaymentType, amount: Money| match payment_type {
        PaymentType::Cash => totals.cash_from_sales += amount,
        PaymentType::Card => totals.card_from_sales += amount,
    };

    for ticket in tickets {
        add(ticket.payment_type, ticket.total());
    }

    for mobile in mobile_tickets {
        let settled_today = mobile.settled_at().is_some_and(|at| day.contains(at));
        if let (true, Some(payment_type)) = (settled_today, mobile.payment_type) {
            add(payment_type, mobile.total());
        }
    }

    let mobile_taken = mobile_tickets
        .iter()
        .filter(|m| day.contains(m.created_at))
        .count();

    totals.net_cash_movements = movements.iter().map(CashMovement::signed_amount).sum();
    totals.total_tickets = (tickets.len() + mobile_taken) as i64;
    totals
}

/// Builds the immutable corte snapshot.
pub fn build_corte(
    id: String,
    location: &str,
    day: &BusinessDay,
    totals: &CorteTotals,
    actual_cash: Money,
    actual_card: Money,
    now: DateTime<Utc>,
) -> Corte {
    let expected_cash = totals.expected_cash();
    let expected_card = totals.expected_card();

    Corte {
        id,
        location: location.to_string(),
        business_date: day.date,
        window_start: day.start,
        window_end: day.end,
        expected_cash_cents: expected_cash.cents(),
        expected_card_cents: expected_card.cents(),
        actual_cash_cents: actual_cash.cents(),
        actual_card_cents: actual_card.cents(),
        cash_variance_cents: (actual_cash - expected_cash).cents(),
        card_variance_cents: (actual_card - expected_card).cents(),
        total_tickets: totals.total_tickets,
        created_at: now,
    }
}

impl Corte {
    pub fn cash_variance(&self) -> Variance {
        Variance::from_signed(Money::from_cents(self.cash_variance_cents))
    }

    pub fn card_variance(&self) -> Variance {
        Variance::from_signed(Money::from_cents(self.card_variance_cents))
    }
}

/// Parses an operator count ("140", "140.50", "$1,040").
///
/// Non-numeric and negative input is rejected as `InvalidAmount`.
pub fn parse_counted(field: &str, input: &str) -> CoreResult<Money> {
    let amount =
        Money::parse(input).map_err(|e| CoreError::invalid_amount(field, e.to_string()))?;
    if amount.is_negative() {
        return Err(CoreError::invalid_amount(field, "must not be negative"));
    }
    Ok(amount)
}

//! # Domain Types
//!
//! Core domain types used throughout Bodega POS.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐        ┌─────────────────┐                        │
//! │  │    Product      │ 1    * │ StockLocation   │  quantity in PIECES    │
//! │  │  box_code       │───────►│  location       │  never negative        │
//! │  │  product_code   │        │  quantity       │                        │
//! │  │  price ladder   │        └─────────────────┘                        │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Ticket       │   │  MobileTicket   │   │  CashMovement   │       │
//! │  │  L1-7           │   │  L1-M-3         │   │  in / out       │       │
//! │  │  immutable      │   │  payment +      │   │  append-only    │       │
//! │  │                 │   │  fulfillment    │   │                 │       │
//! │  └────────┬────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │           └─────────────────────┼─────────────────────┘                │
//! │                                 ▼                                       │
//! │                        ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │     Corte       │   │    Transfer     │       │
//! │                        │  snapshot       │   │  batch of lines │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All quantities stored on stock entries and ticket lines are in pieces.
//! Boxes exist only as an input unit and are converted with
//! [`Product::pieces_for`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Enumerations
// =============================================================================

/// Unit in which a cart or transfer quantity was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    #[default]
    Pieces,
    Boxes,
}

/// How a ticket was (or will be) settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Cash,
    Card,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentType::Cash => write!(f, "cash"),
            PaymentType::Card => write!(f, "card"),
        }
    }
}

/// Payment state of a mobile order. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Unpaid => write!(f, "unpaid"),
            PaymentStatus::Paid => write!(f, "paid"),
        }
    }
}

/// Fulfillment state of a mobile order.
///
/// ```text
/// pending ──► processing ──► completed
///    └───────────────────────▲
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
}

impl FulfillmentStatus {
    /// Position in the workflow; transitions must strictly increase it.
    pub const fn rank(&self) -> u8 {
        match self {
            FulfillmentStatus::Pending => 0,
            FulfillmentStatus::Processing => 1,
            FulfillmentStatus::Completed => 2,
        }
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillmentStatus::Pending => write!(f, "pending"),
            FulfillmentStatus::Processing => write!(f, "processing"),
            FulfillmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Direction of a manual cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
}

/// Why a stock row changed. Recorded in the stock movement trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Sale,
    TransferOut,
    TransferIn,
    Adjustment,
}

/// Which sale flow produced a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TicketKind {
    Store,
    Mobile,
}

impl TicketKind {
    /// Builds the public ticket id: `L1-7` or `L1-M-7`.
    pub fn ticket_id(&self, location: &str, sequence: i64) -> String {
        match self {
            TicketKind::Store => format!("{}-{}", location, sequence),
            TicketKind::Mobile => format!("{}-M-{}", location, sequence),
        }
    }

    /// Notification topic for sales of this kind.
    pub const fn topic(&self) -> &'static str {
        match self {
            TicketKind::Store => "sales",
            TicketKind::Mobile => "mobile-sales",
        }
    }

    /// Key of the per-location sequence counter.
    pub const fn counter_key(&self) -> &'static str {
        match self {
            TicketKind::Store => "ticket",
            TicketKind::Mobile => "mobile_ticket",
        }
    }
}

// =============================================================================
// Product & Stock
// =============================================================================

/// One (location, quantity) entry owned by a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLocation {
    /// Warehouse or store code, e.g. `L1` or `BODEGA-NORTE`.
    pub location: String,
    /// Quantity in pieces; never negative.
    pub quantity: i64,
}

impl StockLocation {
    pub fn new(location: impl Into<String>, quantity: i64) -> Self {
        StockLocation {
            location: location.into(),
            quantity,
        }
    }
}

/// A catalog product with its price ladder and per-location stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Code printed on the box. Globally unique.
    pub box_code: String,

    /// Code printed on the single piece. Globally unique.
    pub product_code: String,

    pub name: String,

    /// Pieces in one box; always > 0.
    pub pieces_per_box: i64,

    /// Cost per piece in cents.
    pub cost_cents: i64,

    /// Base price per piece and the minimum pieces for it to apply.
    pub price1_cents: i64,
    pub price1_min_qty: i64,

    /// Mid-volume price per piece.
    pub price2_cents: i64,
    pub price2_min_qty: i64,

    /// Wholesale price per piece.
    pub price3_cents: i64,
    pub price3_min_qty: i64,

    /// Optional special prices, selectable explicitly (never by volume).
    pub price4_cents: Option<i64>,
    pub price5_cents: Option<i64>,

    pub category: String,

    /// Whether the product is offered for sale.
    pub is_available: bool,

    pub image_url: Option<String>,

    /// Per-location stock, in pieces.
    pub stock_locations: Vec<StockLocation>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Bumped on every catalog edit.
    pub version: i64,
}

impl Product {
    /// Cost per piece.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Converts a quantity in `unit` into pieces.
    ///
    /// Saturates at `i64::MAX`, which no stock level can cover, so an absurd
    /// quantity fails the stock check instead of wrapping.
    ///
    /// ```rust,ignore
    /// // piecesPerBox = 10
    /// assert_eq!(product.pieces_for(3, UnitType::Boxes), 30);
    /// assert_eq!(product.pieces_for(3, UnitType::Pieces), 3);
    /// ```
    #[inline]
    pub fn pieces_for(&self, quantity: i64, unit: UnitType) -> i64 {
        match unit {
            UnitType::Pieces => quantity,
            UnitType::Boxes => quantity.saturating_mul(self.pieces_per_box),
        }
    }

    /// [`pieces_for`](Self::pieces_for), rejecting counts that don't fit.
    pub fn checked_pieces_for(&self, quantity: i64, unit: UnitType) -> CoreResult<i64> {
        match unit {
            UnitType::Pieces => Ok(quantity),
            UnitType::Boxes => quantity.checked_mul(self.pieces_per_box).ok_or_else(|| {
                CoreError::invalid_amount(
                    "quantity",
                    format!("{} boxes of {} pieces is out of range", quantity, self.pieces_per_box),
                )
            }),
        }
    }

    /// Quantity at exactly `location`, zero when there is no entry.
    pub fn stock_at(&self, location: &str) -> i64 {
        self.stock_locations
            .iter()
            .filter(|s| s.location == location)
            .map(|s| s.quantity)
            .sum()
    }

    /// Sum of every stock entry regardless of location.
    pub fn total_stock_all_locations(&self) -> i64 {
        self.stock_locations.iter().map(|s| s.quantity).sum()
    }
}

/// Audit entry written alongside every stock row change.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    pub location: String,
    /// Signed change in pieces.
    pub delta: i64,
    pub reason: StockReason,
    /// Ticket id or transfer id that caused the change.
    pub reference_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tickets
// =============================================================================

/// A frozen line of a ticket.
///
/// `pieces` is the quantity converted to pieces; totals and profit are
/// computed on pieces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TicketLine {
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub name: String,
    /// Quantity as entered, in `unit_type`.
    pub quantity: i64,
    pub unit_type: UnitType,
    pub pieces: i64,
    pub price_per_unit_cents: i64,
    pub cost_per_unit_cents: i64,
    pub total_cents: i64,
    pub profit_cents: i64,
}

impl TicketLine {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn profit(&self) -> Money {
        Money::from_cents(self.profit_cents)
    }
}

/// An immutable record of a completed register sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Ticket {
    /// `{location}-{sequence}`.
    pub ticket_id: String,
    pub location: String,
    pub sequence: i64,
    pub lines: Vec<TicketLine>,
    pub total_cents: i64,
    pub profit_cents: i64,
    pub payment_type: PaymentType,
    pub amount_paid_cents: i64,
    pub change_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// Device-reported coordinates attached to a mobile order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A ticket from the mobile/field order flow.
///
/// Payment fields are `None` until `payment_status` is `Paid`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MobileTicket {
    /// `{location}-M-{sequence}`.
    pub ticket_id: String,
    pub location: String,
    pub sequence: i64,
    pub lines: Vec<TicketLine>,
    pub total_cents: i64,
    pub profit_cents: i64,
    pub customer_name: String,
    pub payment_type: Option<PaymentType>,
    pub amount_paid_cents: Option<i64>,
    pub change_cents: Option<i64>,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub device_id: Option<String>,
    pub coordinates: Option<GeoPoint>,
    /// Free-form sync marker reported by the device.
    pub sync_status: String,
    /// Whether this order's lines have already left the stock ledger.
    pub stock_deducted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// When the order became paid. Cortes count its money on this day.
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl MobileTicket {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Settlement time of a paid order, falling back to its creation when
    /// no payment time is recorded.
    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        if self.is_paid() {
            Some(self.paid_at.unwrap_or(self.created_at))
        } else {
            None
        }
    }
}

// =============================================================================
// Cash & Corte
// =============================================================================

/// A manual cash in/out entry of the drawer. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    /// Always positive; direction comes from `movement_type`.
    pub amount_cents: i64,
    pub concept: String,
    pub movement_type: MovementType,
    pub location: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    /// Amount with the sign of its direction (out is negative).
    pub fn signed_amount(&self) -> Money {
        match self.movement_type {
            MovementType::In => Money::from_cents(self.amount_cents),
            MovementType::Out => -Money::from_cents(self.amount_cents),
        }
    }
}

/// Immutable till-close snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Corte {
    pub id: String,
    pub location: String,
    /// Business day that was reconciled.
    #[ts(as = "String")]
    pub business_date: NaiveDate,
    #[ts(as = "String")]
    pub window_start: DateTime<Utc>,
    #[ts(as = "String")]
    pub window_end: DateTime<Utc>,
    pub expected_cash_cents: i64,
    pub expected_card_cents: i64,
    pub actual_cash_cents: i64,
    pub actual_card_cents: i64,
    /// actual - expected; positive is surplus.
    pub cash_variance_cents: i64,
    pub card_variance_cents: i64,
    pub total_tickets: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Transfers
// =============================================================================

/// One product movement inside a transfer batch. Quantity is in pieces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TransferLine {
    pub product_id: String,
    pub product_name: String,
    pub box_code: String,
    pub product_code: String,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i64,
}

/// A committed batch of stock movements between locations.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transfer {
    pub id: String,
    pub lines: Vec<TransferLine>,
    pub evidence_image_url: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Total pieces moved across all lines.
    pub fn total_pieces(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

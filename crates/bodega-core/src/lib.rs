//! # bodega-core: Pure Business Logic for Bodega POS
//!
//! Every rule that decides a number lives here: which price tier applies,
//! how many pieces a line really moves, which locations a sale may draw
//! from, what a ticket earned, and what the till should hold at close.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          bodega-service (ledger, sales, corte, transfers)       │   │
//! │  └───────────────┬─────────────────────────────┬───────────────────┘   │
//! │                  │                             │                        │
//! │  ┌───────────────▼─────────────┐   ┌───────────▼───────────────────┐   │
//! │  │  ★ bodega-core (THIS) ★     │   │  bodega-db (SQLite, sqlx)     │   │
//! │  │                             │◄──│                               │   │
//! │  │  money  pricing  cart       │   │  catalog, stock rows,         │   │
//! │  │  stock  ticket   corte      │   │  tickets, cortes, transfers   │   │
//! │  │  calendar  validation       │   │                               │   │
//! │  └─────────────────────────────┘   └───────────────────────────────┘   │
//! │                                                                         │
//! │            NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, StockLocation, Ticket, Corte, ...)
//! - [`money`] - Integer-cent money type and operator amount parsing
//! - [`catalog`] - Product entry and admin-edit inputs
//! - [`pricing`] - Price ladder tier selection
//! - [`cart`] - Cart value object passed into the sale processor
//! - [`stock`] - Stock pooling, sale deduction plans, transfer plans
//! - [`ticket`] - Line math, profit, tender/change
//! - [`corte`] - Till reconciliation arithmetic
//! - [`calendar`] - Business-day windows in a fixed business offset
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use bodega_core::money::Money;
//! use bodega_core::corte::Variance;
//!
//! let expected = Money::from_cents(14_500);
//! let counted = Money::from_cents(14_000);
//! let variance = Variance::between(counted, expected);
//! assert_eq!(variance.to_string(), "Falta $5.00");
//! ```

pub mod calendar;
pub mod cart;
pub mod catalog;
pub mod corte;
pub mod error;
pub mod money;
pub mod pricing;
pub mod stock;
pub mod ticket;
pub mod types;
pub mod validation;

// Re-exports so callers can write `bodega_core::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines in a single cart or ticket.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity (in the line's own unit) of a single cart line.
///
/// Wholesale customers order by the box, so this is well above a retail
/// register's limit.
pub const MAX_ITEM_QUANTITY: i64 = 99_999;

/// Maximum price or cost of one piece, in cents ($1,000,000.00).
pub const MAX_PRICE_CENTS: i64 = 100_000_000;

/// Maximum pieces in one box.
///
/// With [`MAX_ITEM_QUANTITY`] and [`MAX_PRICE_CENTS`] this keeps a single
/// line total inside `i64`.
pub const MAX_PIECES_PER_BOX: i64 = 10_000;

/// Maximum lines in one transfer batch.
pub const MAX_TRANSFER_LINES: usize = 200;

/// Location prefix treated as shared bulk storage when no other prefix is
/// configured.
pub const DEFAULT_BULK_PREFIX: &str = "BODEGA";

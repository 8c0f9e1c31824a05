//! # Repository Module
//!
//! Database repositories for Bodega POS.
//!
//! ## Repository Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories                                         │
//! │                                                                         │
//! │  bodega-service                                                         │
//! │       │  db.tickets().create_ticket(ticket, &draws)                     │
//! │       ▼                                                                 │
//! │  TicketRepository ──┐                                                   │
//! │  TransferRepository ├──► stock::{decrement, increment}                  │
//! │  ProductRepository ─┘     (same transaction, same connection)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog and scanner lookup
//! - [`stock::StockRepository`] - Adjustments and the movement trail
//! - [`ticket::TicketRepository`] - Store and mobile tickets, sequences
//! - [`cash::CashMovementRepository`] - Manual drawer movements
//! - [`corte::CorteRepository`] - Till-close snapshots
//! - [`transfer::TransferRepository`] - Transfer batches

pub mod cash;
pub mod corte;
pub mod product;
pub mod stock;
pub mod ticket;
pub mod transfer;

//! # bodega-db: Database Layer for Bodega POS
//!
//! SQLite persistence for the catalog, the per-location stock ledger,
//! tickets, the cash register, cortes and transfers.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bodega POS Data Flow                             │
//! │                                                                         │
//! │  bodega-service (SaleProcessor::process_ticket)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     bodega-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │   │   │
//! │  │   │               │    │ products()     │   │              │   │   │
//! │  │   │ SqlitePool    │◄───│ stock()        │   │ 001_initial  │   │   │
//! │  │   │ WAL, FK on    │    │ tickets()      │   │   _schema    │   │   │
//! │  │   │               │    │ cash()         │   │              │   │   │
//! │  │   │               │    │ cortes()       │   │              │   │   │
//! │  │   │               │    │ transfers()    │   │              │   │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (bodega.db)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Model
//!
//! No repository ever reads a stock list, edits it in memory and writes it
//! back. Stock rows change only through:
//! - `UPDATE ... SET quantity = quantity - ? WHERE ... AND quantity >= ?`
//! - `INSERT ... ON CONFLICT DO UPDATE SET quantity = quantity + excluded.quantity`
//!
//! A conditional update that matches no row inside a commit fails the whole
//! transaction with [`DbError::StockConflict`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bodega_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./bodega.db")).await?;
//! let product = db.products().get_by_id(&id).await?;
//! let movements = db.stock().movements(&id, 50).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cash::CashMovementRepository;
pub use repository::corte::CorteRepository;
pub use repository::product::ProductRepository;
pub use repository::stock::StockRepository;
pub use repository::ticket::TicketRepository;
pub use repository::transfer::TransferRepository;

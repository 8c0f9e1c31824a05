//! # bodega-service: Operations Layer for Bodega POS
//!
//! Everything a register, an admin screen or a mobile app calls. Each
//! service validates first, then composes the pure rules of `bodega-core`
//! with the repositories of `bodega-db`.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Bodega                                     │
//! │         (database + config + notifier, hands out services)              │
//! │                                                                         │
//! │   catalog()     CatalogService     products, codes, admin edits         │
//! │   ledger()      InventoryLedger    stock reads, deductions, adjustments │
//! │   sales()       SaleProcessor      tickets, mobile orders               │
//! │   transfers()   TransferExecutor   batch moves between locations        │
//! │   cash()        CashRegister       manual cash in / out                 │
//! │   cortes()      CorteEngine        end of day reconciliation            │
//! │                                                                         │
//! │   ──────────────────────────────────────────────────────────────────    │
//! │   config      bodega.toml + BODEGA_* overrides                          │
//! │   telemetry   tracing subscriber (RUST_LOG)                             │
//! │   notify      SaleNotifier trait, fire-and-forget sale events           │
//! │   error       ServiceError → ErrorResponse { code, class, message }     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use bodega_service::{AppConfig, Bodega, NoopNotifier};
//!
//! bodega_service::telemetry::init_tracing();
//! let config = AppConfig::load(None)?;
//! let bodega = Bodega::open(config, Arc::new(NoopNotifier)).await?;
//!
//! let corte = bodega.cortes().reconcile_input("L1", "1040.50", "320", Utc::now()).await?;
//! println!("{}", corte.cash_label);
//! ```
//!
//! Services are cheap handles over the shared pool; create them per call.

use std::sync::Arc;

use bodega_db::Database;
use tracing::info;

pub mod cash;
pub mod catalog;
pub mod config;
pub mod corte;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod sales;
pub mod telemetry;
pub mod transfer;

#[cfg(test)]
mod test_support;

pub use cash::{CashRegister, NewCashMovement};
pub use catalog::CatalogService;
pub use config::{AppConfig, ConfigError};
pub use corte::{CorteEngine, CorteResult};
pub use error::{ErrorClass, ErrorCode, ErrorResponse, ServiceError, ServiceResult};
pub use ledger::{InventoryLedger, StockScope};
pub use notify::{BroadcastNotifier, NoopNotifier, NotifyError, SaleEvent, SaleNotifier};
pub use sales::{
    MobileOrderRequest, MobileReceipt, MobileTicketUpdate, SaleProcessor, TicketReceipt,
    TicketRequest,
};
pub use transfer::{TransferExecutor, TransferLineRequest, TransferRequest};

// =============================================================================
// Facade
// =============================================================================

/// Entry point holding what every service shares.
#[derive(Clone)]
pub struct Bodega {
    db: Database,
    config: AppConfig,
    notifier: Arc<dyn SaleNotifier>,
}

impl Bodega {
    /// Opens (and migrates) the configured database.
    pub async fn open(config: AppConfig, notifier: Arc<dyn SaleNotifier>) -> ServiceResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(
            store = %config.store.name,
            database = %config.database.path.display(),
            "Bodega services ready"
        );
        Ok(Self::with_database(db, config, notifier))
    }

    /// Wraps an already open database.
    pub fn with_database(db: Database, config: AppConfig, notifier: Arc<dyn SaleNotifier>) -> Self {
        Bodega {
            db,
            config,
            notifier,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone())
    }

    pub fn ledger(&self) -> InventoryLedger {
        InventoryLedger::new(self.db.clone(), self.config.pool_policy())
    }

    pub fn sales(&self) -> SaleProcessor {
        SaleProcessor::new(
            self.db.clone(),
            self.config.pool_policy(),
            Arc::clone(&self.notifier),
            self.config.notify_timeout(),
        )
    }

    pub fn transfers(&self) -> TransferExecutor {
        TransferExecutor::new(self.db.clone())
    }

    pub fn cash(&self) -> CashRegister {
        CashRegister::new(self.db.clone())
    }

    pub fn cortes(&self) -> CorteEngine {
        CorteEngine::new(self.db.clone(), self.config.business_offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bodega, sample_product};
    use bodega_core::cart::Cart;
    use bodega_core::{PaymentType, UnitType};
    use chrono::Utc;

    #[tokio::test]
    async fn test_register_day_end_to_end() {
        let bodega = bodega().await;
        let product = bodega.catalog().create_product(sample_product()).await.unwrap();

        let available = bodega
            .ledger()
            .get_remaining_quantity(&product.id, "L1", 0)
            .await
            .unwrap();
        let mut cart = Cart::new();
        cart.add_item(&product, 15, UnitType::Pieces, available).unwrap();

        let receipt = bodega
            .sales()
            .checkout("L1", &cart, PaymentType::Cash, Some(12_000))
            .await
            .unwrap();
        assert_eq!(receipt.ticket.ticket_id, "L1-1");
        assert_eq!(receipt.ticket.total_cents, 10_500);
        assert_eq!(receipt.ticket.change_cents, 1_500);

        let stock = bodega
            .ledger()
            .get_total_stock(&product.id, "L1", StockScope::Exact)
            .await
            .unwrap();
        assert_eq!(stock, 85);

        let corte = bodega
            .cortes()
            .reconcile_input("L1", "105", "0", Utc::now())
            .await
            .unwrap();
        assert_eq!(corte.corte.expected_cash_cents, 10_500);
        assert_eq!(corte.corte.cash_variance_cents, 0);
        assert_eq!(corte.cash_label, "Monto exacto");
        assert_eq!(corte.corte.total_tickets, 1);
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let mut config = AppConfig::default();
        config.database.path = ":memory:".into();

        let bodega = Bodega::open(config, Arc::new(NoopNotifier)).await.unwrap();
        assert!(bodega.catalog().list_all().await.unwrap().is_empty());
        assert_eq!(bodega.config().inventory.bulk_prefix, "BODEGA");
    }
}

//! Fixtures shared by the service tests.

use std::sync::Arc;

use async_trait::async_trait;
use bodega_core::catalog::NewProduct;
use bodega_core::Product;
use bodega_db::{Database, DbConfig};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::notify::{NoopNotifier, NotifyError, SaleNotifier};
use crate::Bodega;

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub async fn insert_product(db: &Database, entry: NewProduct) -> Product {
    let product = entry.into_product(Uuid::new_v4().to_string(), Utc::now());
    db.products().insert(&product).await.unwrap()
}

/// Services over an in-memory database, UTC business calendar, pooling
/// with `BODEGA`.
pub async fn bodega_with(notifier: Arc<dyn SaleNotifier>) -> Bodega {
    let mut config = AppConfig::default();
    config.store.utc_offset_minutes = 0;
    Bodega::with_database(memory_db().await, config, notifier)
}

pub async fn bodega() -> Bodega {
    bodega_with(Arc::new(NoopNotifier)).await
}

/// Services over a WAL file store with several pooled connections, so
/// concurrent tasks really contend for SQLite's write lock. Keep the
/// returned directory alive for the duration of the test.
pub async fn file_bodega() -> (Bodega, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("bodega.db")).max_connections(5))
        .await
        .unwrap();
    let mut config = AppConfig::default();
    config.store.utc_offset_minutes = 0;
    (Bodega::with_database(db, config, Arc::new(NoopNotifier)), dir)
}

/// The register product used across scenarios: 10 pieces per box, cost
/// $5.00, tiers $8/1, $7/12, $6/50, 100 pieces at L1.
pub fn sample_product() -> NewProduct {
    NewProduct::new("CJ-GAL", "PZ-GAL", "Galletas surtidas", 10, 500)
        .with_tiers((800, 1), (700, 12), (600, 50))
        .with_stock("L1", 100)
}

/// A notifier whose sink is always down.
pub struct FailingNotifier;

#[async_trait]
impl SaleNotifier for FailingNotifier {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("sink offline".to_string()))
    }
}

/// A notifier that never answers in time.
pub struct StalledNotifier;

#[async_trait]
impl SaleNotifier for StalledNotifier {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), NotifyError> {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        Ok(())
    }
}

//! # Catalog Service
//!
//! Product registration and admin edits. Stock is never written here
//! except for a new product's opening stock; every later change goes
//! through the [`InventoryLedger`](crate::ledger::InventoryLedger).

use bodega_core::catalog::{NewProduct, ProductUpdate};
use bodega_core::validation::validate_code;
use bodega_core::{Product, UnitType};
use bodega_db::Database;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        CatalogService { db }
    }

    /// Registers a product with its opening stock.
    ///
    /// ## Returns
    /// * `Err(ServiceError::Validation)` - invalid fields, or a code already
    ///   used by another product (as box or piece code)
    pub async fn create_product(&self, entry: NewProduct) -> ServiceResult<Product> {
        entry.validate()?;

        let product = entry.into_product(Uuid::new_v4().to_string(), Utc::now());
        let product = self.db.products().insert(&product).await?;

        info!(id = %product.id, code = %product.product_code, "Product created");
        Ok(product)
    }

    /// Applies an admin edit.
    ///
    /// `expected_version` is the version the editor read; a stale edit fails
    /// with `ConcurrencyConflict` and must be redone on fresh data.
    pub async fn update_product(
        &self,
        id: &str,
        update: &ProductUpdate,
        expected_version: i64,
    ) -> ServiceResult<Product> {
        let current = self.get_product(id).await?;
        if current.version != expected_version {
            return Err(ServiceError::ConcurrencyConflict(format!(
                "Product {} is at version {}, edit was based on {}",
                id, current.version, expected_version
            )));
        }

        let edited = update.apply(&current)?;
        let saved = self.db.products().update(&edited).await?;

        info!(id = %saved.id, version = saved.version, "Product updated");
        Ok(saved)
    }

    pub async fn set_availability(&self, id: &str, available: bool) -> ServiceResult<()> {
        self.db.products().set_availability(id, available).await?;
        info!(id = %id, available, "Product availability changed");
        Ok(())
    }

    pub async fn get_product(&self, id: &str) -> ServiceResult<Product> {
        self.db
            .products()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    /// Resolves a scanned code. A box code sells boxes, a product code
    /// sells pieces.
    pub async fn get_by_code(&self, code: &str) -> ServiceResult<(Product, UnitType)> {
        validate_code("code", code)?;
        self.db
            .products()
            .get_by_code(code.trim())
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", code))
    }

    pub async fn list_all(&self) -> ServiceResult<Vec<Product>> {
        Ok(self.db.products().list_all().await?)
    }

    /// Products currently offered for sale.
    pub async fn list_available(&self) -> ServiceResult<Vec<Product>> {
        Ok(self.db.products().list_available().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, sample_product};

    #[tokio::test]
    async fn test_create_and_lookup() {
        let catalog = CatalogService::new(memory_db().await);
        let product = catalog.create_product(sample_product()).await.unwrap();

        assert_eq!(product.stock_at("L1"), 100);

        let (found, unit) = catalog.get_by_code("CJ-GAL").await.unwrap();
        assert_eq!(found.id, product.id);
        assert_eq!(unit, UnitType::Boxes);

        let (_, unit) = catalog.get_by_code("PZ-GAL").await.unwrap();
        assert_eq!(unit, UnitType::Pieces);

        let err = catalog.get_by_code("PZ-NADA").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let catalog = CatalogService::new(memory_db().await);
        catalog.create_product(sample_product()).await.unwrap();

        // New product whose box code is the first product's piece code
        let err = catalog
            .create_product(NewProduct::new("PZ-GAL", "PZ-OTRO", "Otro", 6, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(catalog.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_product_rejected_before_write() {
        let catalog = CatalogService::new(memory_db().await);
        let err = catalog
            .create_product(NewProduct::new("CJ-X", "PZ-X", "Sin caja", 0, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(catalog.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_with_version_check() {
        let catalog = CatalogService::new(memory_db().await);
        let product = catalog.create_product(sample_product()).await.unwrap();

        let update = ProductUpdate {
            cost_cents: Some(550),
            price4_cents: Some(Some(650)),
            ..Default::default()
        };
        let saved = catalog
            .update_product(&product.id, &update, product.version)
            .await
            .unwrap();
        assert_eq!(saved.cost_cents, 550);
        assert_eq!(saved.price4_cents, Some(650));
        assert_eq!(saved.version, product.version + 1);
        assert_eq!(saved.stock_at("L1"), 100);

        let err = catalog
            .update_product(&product.id, &update, product.version)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_availability() {
        let catalog = CatalogService::new(memory_db().await);
        let product = catalog.create_product(sample_product()).await.unwrap();

        catalog.set_availability(&product.id, false).await.unwrap();
        assert!(catalog.list_available().await.unwrap().is_empty());
        assert_eq!(catalog.list_all().await.unwrap().len(), 1);

        let err = catalog.set_availability("missing", true).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}

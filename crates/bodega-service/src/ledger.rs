//! # Inventory Ledger
//!
//! Per-product, per-location stock: reads, sale deductions, single-product
//! transfers and admin adjustments.
//!
//! ## Stock Reads vs Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Inventory Ledger                                     │
//! │                                                                         │
//! │  READS (pure, on a fresh snapshot)                                      │
//! │  ─────────────────────────────────                                      │
//! │  get_total_stock(p, "L1", Exact)    → L1 only                           │
//! │  get_total_stock(p, "L1", Pooled)   → L1 + BODEGA-*                     │
//! │  get_remaining_quantity(p, "L1", n) → pooled - n, never below 0         │
//! │                                                                         │
//! │  WRITES (planned in core, applied with conditional updates)             │
//! │  ──────────────────────────────────────────────────────────             │
//! │  deduct_for_sale   → plan draws over the pool → StockRepository::deduct │
//! │  transfer          → precheck source          → move_between            │
//! │  adjust_stock      → precheck if negative     → adjust                  │
//! │                                                                         │
//! │  A write that loses a race retries once from a fresh snapshot.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bodega_core::stock::{
    apply_transfer, plan_sale_draws, remaining_quantity, total_stock, LocationFilter, PoolPolicy,
    ProductDraw,
};
use bodega_core::validation::{validate_location, validate_quantity, validate_text};
use bodega_core::{CoreError, Product, StockLocation, StockMovement, ValidationError};
use bodega_db::Database;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{retry_on_conflict, ServiceError, ServiceResult};

/// How a stock read treats the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockScope {
    /// Only the named location.
    Exact,
    /// The named location plus bulk storage.
    Pooled,
}

/// Stock operations over the catalog's per-location rows.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    db: Database,
    policy: PoolPolicy,
}

impl InventoryLedger {
    pub fn new(db: Database, policy: PoolPolicy) -> Self {
        InventoryLedger { db, policy }
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Pieces of a product at `location`, exact or pooled.
    pub async fn get_total_stock(
        &self,
        product_id: &str,
        location: &str,
        scope: StockScope,
    ) -> ServiceResult<i64> {
        let product = self.load_product(product_id).await?;
        Ok(total_stock(&product.stock_locations, self.filter(location, scope)))
    }

    /// Pieces still addable to a cart at `location` that already holds
    /// `reserved_in_cart` pieces of the product. Never negative.
    pub async fn get_remaining_quantity(
        &self,
        product_id: &str,
        location: &str,
        reserved_in_cart: i64,
    ) -> ServiceResult<i64> {
        let product = self.load_product(product_id).await?;
        Ok(remaining_quantity(
            &product.stock_locations,
            self.filter(location, StockScope::Pooled),
            reserved_in_cart,
        ))
    }

    /// Current per-location entries of a product.
    pub async fn stock_snapshot(&self, product_id: &str) -> ServiceResult<Vec<StockLocation>> {
        self.load_product(product_id).await?;
        Ok(self.db.stock().for_product(product_id).await?)
    }

    /// Stock movement trail of a product, newest first.
    pub async fn movements(&self, product_id: &str, limit: i64) -> ServiceResult<Vec<StockMovement>> {
        self.load_product(product_id).await?;
        Ok(self.db.stock().movements(product_id, limit.clamp(1, 1_000)).await?)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Deducts `pieces` sold at `location`, drawing from the home location
    /// first and then bulk storage. Zero rows are kept.
    ///
    /// ## Returns
    /// The product as it is after the deduction.
    pub async fn deduct_for_sale(
        &self,
        product_id: &str,
        location: &str,
        pieces: i64,
        reference_id: Option<&str>,
    ) -> ServiceResult<Product> {
        validate_location("location", location)?;
        validate_quantity(pieces)?;

        retry_on_conflict("deduct_for_sale", || {
            self.try_deduct(product_id, location, pieces, reference_id)
        })
        .await?;

        self.load_product(product_id).await
    }

    /// Moves `quantity` pieces of one product from `from` to `to`.
    ///
    /// The destination row is created when absent. Afterwards no row of the
    /// product is left at zero, including rows a sale emptied earlier.
    pub async fn transfer(
        &self,
        product_id: &str,
        from: &str,
        to: &str,
        quantity: i64,
    ) -> ServiceResult<Product> {
        validate_location("from_location", from)?;
        validate_location("to_location", to)?;
        validate_quantity(quantity)?;
        if from == to {
            return Err(ValidationError::MustDiffer {
                field: "to_location".to_string(),
                other: "from_location".to_string(),
            }
            .into());
        }

        retry_on_conflict("transfer", || self.try_transfer(product_id, from, to, quantity)).await?;

        info!(product_id = %product_id, from = %from, to = %to, quantity, "Stock transferred");
        self.load_product(product_id).await
    }

    /// Restock (positive `delta`) or correction (negative `delta`) at one
    /// location. `reference` (a supplier invoice, a count sheet) is kept on
    /// the movement row.
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        location: &str,
        delta: i64,
        reference: Option<&str>,
    ) -> ServiceResult<Product> {
        validate_location("location", location)?;
        if delta == 0 {
            return Err(ServiceError::validation("delta must not be zero"));
        }
        if let Some(reference) = reference {
            validate_text("reference", reference, 200)?;
        }

        retry_on_conflict("adjust_stock", || self.try_adjust(product_id, location, delta, reference))
            .await?;

        info!(product_id = %product_id, location = %location, delta, "Stock adjusted");
        self.load_product(product_id).await
    }

    // =========================================================================
    // Single Attempts
    // =========================================================================

    async fn try_deduct(
        &self,
        product_id: &str,
        location: &str,
        pieces: i64,
        reference_id: Option<&str>,
    ) -> ServiceResult<()> {
        let product = self.load_product(product_id).await?;
        let draws: Vec<ProductDraw> = plan_sale_draws(
            &product.product_code,
            &product.stock_locations,
            location,
            &self.policy,
            pieces,
        )?
        .into_iter()
        .map(|d| ProductDraw {
            product_id: product.id.clone(),
            location: d.location,
            quantity: d.quantity,
        })
        .collect();

        debug!(product_id = %product_id, location = %location, pieces, draws = draws.len(), "Deducting sale stock");
        self.db.stock().deduct(&draws, reference_id).await?;
        Ok(())
    }

    async fn try_transfer(
        &self,
        product_id: &str,
        from: &str,
        to: &str,
        quantity: i64,
    ) -> ServiceResult<()> {
        let product = self.load_product(product_id).await?;
        let mut entries = product.stock_locations.clone();
        apply_transfer(&product.product_code, &mut entries, from, to, quantity)?;

        self.db
            .stock()
            .move_between(product_id, from, to, quantity, None)
            .await?;
        Ok(())
    }

    async fn try_adjust(
        &self,
        product_id: &str,
        location: &str,
        delta: i64,
        reference: Option<&str>,
    ) -> ServiceResult<()> {
        let product = self.load_product(product_id).await?;
        let available = product.stock_at(location);
        if delta < 0 && available < -delta {
            return Err(CoreError::InsufficientStock {
                product: product.product_code.clone(),
                location: location.to_string(),
                available,
                requested: -delta,
            }
            .into());
        }

        self.db.stock().adjust(product_id, location, delta, reference).await?;
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    pub(crate) async fn load_product(&self, product_id: &str) -> ServiceResult<Product> {
        self.db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))
    }

    fn filter<'a>(&'a self, location: &'a str, scope: StockScope) -> LocationFilter<'a> {
        match scope {
            StockScope::Exact => LocationFilter::Exact(location),
            StockScope::Pooled => LocationFilter::Pooled {
                home: location,
                policy: &self.policy,
            },
        }
    }
}

//! # Product Repository
//!
//! Catalog rows plus the stock snapshot that is attached to every product
//! read.
//!
//! ## Key Operations
//! - Insert with opening stock (one transaction)
//! - Lookup by id, or by a scanned code (box code or piece code)
//! - Admin edits of catalog fields, guarded by `version`
//!
//! Catalog updates never touch `stock_locations`; stock only moves through
//! the conditional primitives in [`super::stock`].

use std::collections::HashMap;

use bodega_core::{Product, StockLocation, StockReason, UnitType};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use super::stock::{increment, load_stock};
use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = r#"
    id, box_code, product_code, name, pieces_per_box, cost_cents,
    price1_cents, price1_min_qty, price2_cents, price2_min_qty,
    price3_cents, price3_min_qty, price4_cents, price5_cents,
    category, is_available, image_url, created_at, updated_at, version
"#;

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    box_code: String,
    product_code: String,
    name: String,
    pieces_per_box: i64,
    cost_cents: i64,
    price1_cents: i64,
    price1_min_qty: i64,
    price2_cents: i64,
    price2_min_qty: i64,
    price3_cents: i64,
    price3_min_qty: i64,
    price4_cents: Option<i64>,
    price5_cents: Option<i64>,
    category: String,
    is_available: bool,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl ProductRow {
    fn into_product(self, stock_locations: Vec<StockLocation>) -> Product {
        Product {
            id: self.id,
            box_code: self.box_code,
            product_code: self.product_code,
            name: self.name,
            pieces_per_box: self.pieces_per_box,
            cost_cents: self.cost_cents,
            price1_cents: self.price1_cents,
            price1_min_qty: self.price1_min_qty,
            price2_cents: self.price2_cents,
            price2_min_qty: self.price2_min_qty,
            price3_cents: self.price3_cents,
            price3_min_qty: self.price3_min_qty,
            price4_cents: self.price4_cents,
            price5_cents: self.price5_cents,
            category: self.category,
            is_available: self.is_available,
            image_url: self.image_url,
            stock_locations,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    product_id: String,
    location: String,
    quantity: i64,
}

/// Repository for catalog operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// // Scanner input: box code or piece code
/// if let Some((product, unit)) = repo.get_by_code("7501055300075").await? {
///     cart.add_item(&product, 1, unit, available)?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a product and its opening stock.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - one of the codes is already used
    ///   as a box code or a product code by another product
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(box_code = %product.box_code, product_code = %product.product_code, "Inserting product");

        let mut tx = self.pool.begin().await?;

        // Codes are unique across both columns: a scanned code must resolve
        // to exactly one (product, unit)
        let clash: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM products
            WHERE box_code IN (?1, ?2) OR product_code IN (?1, ?2)
            LIMIT 1
            "#,
        )
        .bind(&product.box_code)
        .bind(&product.product_code)
        .fetch_optional(&mut *tx)
        .await?;

        if clash.is_some() {
            return Err(DbError::duplicate(
                "code",
                format!("{} / {}", product.box_code, product.product_code),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO products (
                id, box_code, product_code, name, pieces_per_box, cost_cents,
                price1_cents, price1_min_qty, price2_cents, price2_min_qty,
                price3_cents, price3_min_qty, price4_cents, price5_cents,
                category, is_available, image_url, created_at, updated_at, version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14,
                ?15, ?16, ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.box_code)
        .bind(&product.product_code)
        .bind(&product.name)
        .bind(product.pieces_per_box)
        .bind(product.cost_cents)
        .bind(product.price1_cents)
        .bind(product.price1_min_qty)
        .bind(product.price2_cents)
        .bind(product.price2_min_qty)
        .bind(product.price3_cents)
        .bind(product.price3_min_qty)
        .bind(product.price4_cents)
        .bind(product.price5_cents)
        .bind(&product.category)
        .bind(product.is_available)
        .bind(&product.image_url)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.version)
        .execute(&mut *tx)
        .await?;

        for entry in product.stock_locations.iter().filter(|s| s.quantity > 0) {
            increment(
                &mut tx,
                &product.id,
                &entry.location,
                entry.quantity,
                StockReason::Adjustment,
                Some("opening stock"),
            )
            .await?;
        }

        tx.commit().await?;

        let mut stored = product.clone();
        stored.stock_locations = load_stock(&self.pool, &product.id).await?;
        Ok(stored)
    }

    /// Gets a product with its stock.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let stock = load_stock(&self.pool, &row.id).await?;
                Ok(Some(row.into_product(stock)))
            }
            None => Ok(None),
        }
    }

    /// Resolves a scanned code. A box code means the scan is in boxes.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<(Product, UnitType)>> {
        let code = code.trim();
        debug!(code = %code, "Looking up product by code");

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE box_code = ?1 OR product_code = ?1 LIMIT 1",
            PRODUCT_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let unit = if row.box_code == code {
                    UnitType::Boxes
                } else {
                    UnitType::Pieces
                };
                let stock = load_stock(&self.pool, &row.id).await?;
                Ok(Some((row.into_product(stock), unit)))
            }
            None => Ok(None),
        }
    }

    /// Every product, ordered by name.
    pub async fn list_all(&self) -> DbResult<Vec<Product>> {
        self.list_where("1 = 1").await
    }

    /// Products currently offered for sale, ordered by name.
    pub async fn list_available(&self) -> DbResult<Vec<Product>> {
        self.list_where("is_available = 1").await
    }

    async fn list_where(&self, predicate: &str) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE {} ORDER BY name, id",
            PRODUCT_COLUMNS, predicate
        ))
        .fetch_all(&self.pool)
        .await?;

        let stock_rows = sqlx::query_as::<_, StockRow>(
            "SELECT product_id, location, quantity FROM stock_locations ORDER BY product_id, location",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stock: HashMap<String, Vec<StockLocation>> = HashMap::new();
        for s in stock_rows {
            stock
                .entry(s.product_id)
                .or_default()
                .push(StockLocation::new(s.location, s.quantity));
        }

        let products: Vec<Product> = rows
            .into_iter()
            .map(|row| {
                let entries = stock.remove(&row.id).unwrap_or_default();
                row.into_product(entries)
            })
            .collect();

        debug!(count = products.len(), "Listed products");
        Ok(products)
    }

    /// Saves catalog fields of an edited product.
    ///
    /// `product.version` must be the version that was read; the stored
    /// version is bumped. Stock entries on `product` are ignored.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - product doesn't exist
    /// * `Err(DbError::Conflict)` - someone saved the product in between
    pub async fn update(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, version = product.version, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?3,
                pieces_per_box = ?4,
                cost_cents = ?5,
                price1_cents = ?6, price1_min_qty = ?7,
                price2_cents = ?8, price2_min_qty = ?9,
                price3_cents = ?10, price3_min_qty = ?11,
                price4_cents = ?12,
                price5_cents = ?13,
                category = ?14,
                is_available = ?15,
                image_url = ?16,
                updated_at = ?17,
                version = version + 1
            WHERE id = ?1 AND version = ?2
            "#,
        )
        .bind(&product.id)
        .bind(product.version)
        .bind(&product.name)
        .bind(product.pieces_per_box)
        .bind(product.cost_cents)
        .bind(product.price1_cents)
        .bind(product.price1_min_qty)
        .bind(product.price2_cents)
        .bind(product.price2_min_qty)
        .bind(product.price3_cents)
        .bind(product.price3_min_qty)
        .bind(product.price4_cents)
        .bind(product.price5_cents)
        .bind(&product.category)
        .bind(product.is_available)
        .bind(&product.image_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_by_id(&product.id).await? {
                Some(_) => Err(DbError::conflict("Product", &product.id)),
                None => Err(DbError::not_found("Product", &product.id)),
            };
        }

        self.get_by_id(&product.id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &product.id))
    }

    /// Turns a product on or off for sale. Products are never deleted.
    pub async fn set_availability(&self, id: &str, available: bool) -> DbResult<()> {
        debug!(id = %id, available, "Setting product availability");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET is_available = ?2, updated_at = ?3, version = version + 1
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(available)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Number of products in the catalog.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

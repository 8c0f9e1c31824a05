//! # Stock Repository
//!
//! The per-location stock rows and their movement trail.
//!
//! ## Atomic Primitives
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Stock Row Changes                                    │
//! │                                                                         │
//! │  decrement(p, L1, 5)                                                    │
//! │     UPDATE stock_locations SET quantity = quantity - 5                  │
//! │     WHERE product_id = p AND location = 'L1' AND quantity >= 5          │
//! │     0 rows → StockConflict (caller's transaction rolls back)            │
//! │                                                                         │
//! │  increment(p, L3, 5)                                                    │
//! │     INSERT INTO stock_locations VALUES (p, 'L3', 5)                     │
//! │     ON CONFLICT DO UPDATE SET quantity = quantity + excluded.quantity   │
//! │                                                                         │
//! │  Both append a stock_movements row on the same connection.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The primitives take a `&mut SqliteConnection` so sale, transfer and
//! mobile-order transactions compose them with their own inserts.

use bodega_core::stock::ProductDraw;
use bodega_core::{StockLocation, StockMovement, StockReason};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

// =============================================================================
// Primitives
// =============================================================================

/// Takes `quantity` pieces from one row, only if the row holds at least that
/// many.
pub(crate) async fn decrement(
    conn: &mut SqliteConnection,
    product_id: &str,
    location: &str,
    quantity: i64,
    reason: StockReason,
    reference_id: Option<&str>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE stock_locations
        SET quantity = quantity - ?3
        WHERE product_id = ?1 AND location = ?2 AND quantity >= ?3
        "#,
    )
    .bind(product_id)
    .bind(location)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(product_id = %product_id, location = %location, quantity, "Conditional decrement matched no row");
        return Err(DbError::stock_conflict(product_id, location));
    }

    record_movement(conn, product_id, location, -quantity, reason, reference_id).await
}

/// Adds `quantity` pieces to a row, creating it when absent.
pub(crate) async fn increment(
    conn: &mut SqliteConnection,
    product_id: &str,
    location: &str,
    quantity: i64,
    reason: StockReason,
    reference_id: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_locations (product_id, location, quantity)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (product_id, location)
        DO UPDATE SET quantity = quantity + excluded.quantity
        "#,
    )
    .bind(product_id)
    .bind(location)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    record_movement(conn, product_id, location, quantity, reason, reference_id).await
}

/// Deletes every zero row of a product, including ones a sale left behind.
/// Transfers prune; sales do not.
pub(crate) async fn prune_empty(conn: &mut SqliteConnection, product_id: &str) -> DbResult<()> {
    let pruned = sqlx::query("DELETE FROM stock_locations WHERE product_id = ?1 AND quantity = 0")
        .bind(product_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if pruned > 0 {
        debug!(product_id = %product_id, pruned, "Pruned empty stock rows");
    }
    Ok(())
}

/// Applies a sale plan: one conditional decrement per draw.
pub(crate) async fn apply_draws(
    conn: &mut SqliteConnection,
    draws: &[ProductDraw],
    reference_id: Option<&str>,
) -> DbResult<()> {
    for draw in draws {
        decrement(
            conn,
            &draw.product_id,
            &draw.location,
            draw.quantity,
            StockReason::Sale,
            reference_id,
        )
        .await?;
    }
    Ok(())
}

async fn record_movement(
    conn: &mut SqliteConnection,
    product_id: &str,
    location: &str,
    delta: i64,
    reason: StockReason,
    reference_id: Option<&str>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (id, product_id, location, delta, reason, reference_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(location)
    .bind(delta)
    .bind(reason)
    .bind(reference_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Reads the stock rows of one product, ordered by location code.
pub(crate) async fn load_stock(pool: &SqlitePool, product_id: &str) -> DbResult<Vec<StockLocation>> {
    let rows = sqlx::query_as::<_, StockLocation>(
        "SELECT location, quantity FROM stock_locations WHERE product_id = ?1 ORDER BY location",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for stock rows outside of sales and transfer batches.
///
/// ## Usage
/// ```rust,ignore
/// let stock = db.stock();
/// stock.adjust(&product_id, "L1", 24, Some("restock 2024-03-09")).await?;
/// let trail = stock.movements(&product_id, 50).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Current per-location stock of a product.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<StockLocation>> {
        load_stock(&self.pool, product_id).await
    }

    /// Applies a sale deduction plan atomically.
    pub async fn deduct(&self, draws: &[ProductDraw], reference_id: Option<&str>) -> DbResult<()> {
        debug!(draws = draws.len(), "Applying sale deduction");

        let mut tx = self.pool.begin().await?;
        apply_draws(&mut tx, draws, reference_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Restock (positive) or correction (negative) at one location.
    ///
    /// A negative delta larger than the row fails with `StockConflict` and
    /// changes nothing.
    pub async fn adjust(
        &self,
        product_id: &str,
        location: &str,
        delta: i64,
        reference_id: Option<&str>,
    ) -> DbResult<()> {
        debug!(product_id = %product_id, location = %location, delta, "Adjusting stock");

        let mut tx = self.pool.begin().await?;
        if delta > 0 {
            increment(&mut tx, product_id, location, delta, StockReason::Adjustment, reference_id)
                .await?;
        } else if delta < 0 {
            decrement(&mut tx, product_id, location, -delta, StockReason::Adjustment, reference_id)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Moves pieces of one product between two locations atomically.
    ///
    /// Afterwards no row of the product is left at zero.
    pub async fn move_between(
        &self,
        product_id: &str,
        from: &str,
        to: &str,
        quantity: i64,
        reference_id: Option<&str>,
    ) -> DbResult<()> {
        debug!(product_id = %product_id, from = %from, to = %to, quantity, "Moving stock");

        let mut tx = self.pool.begin().await?;
        decrement(&mut tx, product_id, from, quantity, StockReason::TransferOut, reference_id)
            .await?;
        increment(&mut tx, product_id, to, quantity, StockReason::TransferIn, reference_id).await?;
        prune_empty(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Most recent stock movements of a product, newest first.
    pub async fn movements(&self, product_id: &str, limit: i64) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, product_id, location, delta, reason, reference_id, created_at
            FROM stock_movements
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

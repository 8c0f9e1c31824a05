//! # Transfer Repository
//!
//! Batches of stock moves between locations.
//!
//! ## Batch Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    INSERT transfers                                                     │
//! │    for each line, in order:                                             │
//! │       decrement(from)  ──► 0 rows → StockConflict, ROLLBACK everything  │
//! │       increment(to)                                                     │
//! │       prune(from) if it reached 0                                       │
//! │       INSERT transfer_lines                                             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Lines apply in order, so a later line may draw on stock an earlier line
//! moved into its source location.

use bodega_core::{StockReason, Transfer, TransferLine};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::stock::{decrement, increment, prune_empty};
use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct TransferRow {
    id: String,
    evidence_image_url: Option<String>,
    created_at: DateTime<Utc>,
}

/// Repository for transfer batches.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    /// Applies and records a whole batch atomically.
    ///
    /// ## Returns
    /// * `Err(DbError::StockConflict)` - a line's source no longer holds
    ///   enough; no line of the batch was applied
    pub async fn execute(&self, transfer: &Transfer) -> DbResult<()> {
        debug!(id = %transfer.id, lines = transfer.lines.len(), "Executing transfer batch");

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO transfers (id, evidence_image_url, created_at) VALUES (?1, ?2, ?3)")
            .bind(&transfer.id)
            .bind(&transfer.evidence_image_url)
            .bind(transfer.created_at)
            .execute(&mut *tx)
            .await?;

        for (line_no, line) in transfer.lines.iter().enumerate() {
            decrement(
                &mut tx,
                &line.product_id,
                &line.from_location,
                line.quantity,
                StockReason::TransferOut,
                Some(&transfer.id),
            )
            .await?;
            increment(
                &mut tx,
                &line.product_id,
                &line.to_location,
                line.quantity,
                StockReason::TransferIn,
                Some(&transfer.id),
            )
            .await?;
            prune_empty(&mut tx, &line.product_id).await?;

            sqlx::query(
                r#"
                INSERT INTO transfer_lines (
                    transfer_id, line_no, product_id, product_name, box_code,
                    product_code, from_location, to_location, quantity
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&transfer.id)
            .bind(line_no as i64)
            .bind(&line.product_id)
            .bind(&line.product_name)
            .bind(&line.box_code)
            .bind(&line.product_code)
            .bind(&line.from_location)
            .bind(&line.to_location)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            id = %transfer.id,
            lines = transfer.lines.len(),
            pieces = transfer.total_pieces(),
            "Transfer committed"
        );
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, TransferRow>(
            "SELECT id, evidence_image_url, created_at FROM transfers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let lines = self.lines_of(&row.id).await?;
                Ok(Some(Transfer {
                    id: row.id,
                    lines,
                    evidence_image_url: row.evidence_image_url,
                    created_at: row.created_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Most recent batches, newest first.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, TransferRow>(
            r#"
            SELECT id, evidence_image_url, created_at FROM transfers
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut transfers = Vec::with_capacity(rows.len());
        for row in rows {
            let lines = self.lines_of(&row.id).await?;
            transfers.push(Transfer {
                id: row.id,
                lines,
                evidence_image_url: row.evidence_image_url,
                created_at: row.created_at,
            });
        }
        Ok(transfers)
    }

    async fn lines_of(&self, transfer_id: &str) -> DbResult<Vec<TransferLine>> {
        let lines = sqlx::query_as::<_, TransferLine>(
            r#"
            SELECT product_id, product_name, box_code, product_code,
                   from_location, to_location, quantity
            FROM transfer_lines
            WHERE transfer_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }
}

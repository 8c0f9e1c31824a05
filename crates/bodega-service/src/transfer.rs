//! # Transfer Executor
//!
//! Moves stock between locations in batches: a truck unloaded from the
//! warehouse into the store, shelves rebalanced between branches.
//!
//! ## Batch Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    execute_transfers                                    │
//! │                                                                         │
//! │  lines:  P1  BODEGA-1 → L1   24                                         │
//! │          P1  L1       → L2   30   (may use what line 1 just moved)      │
//! │          P2  BODEGA-1 → L1    2 boxes                                   │
//! │                                                                         │
//! │  1. Validate every line            (before any read)                    │
//! │  2. Convert boxes to pieces        denormalize name and codes           │
//! │  3. Replay lines in order          on copies of each product's stock    │
//! │  4. One transaction                decrement / upsert / prune per line  │
//! │                                    + one transfer document              │
//! │                                                                         │
//! │  Any failing line fails the batch; no line is visible.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use bodega_core::stock::check_transfer_batch;
use bodega_core::validation::{
    validate_location, validate_quantity, validate_text, validate_transfer_size,
};
use bodega_core::{CoreError, Product, Transfer, TransferLine, UnitType, ValidationError};
use bodega_db::Database;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{retry_on_conflict, ServiceError, ServiceResult};

/// One line of a transfer as entered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLineRequest {
    pub product_id: String,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i64,
    #[serde(default)]
    pub unit_type: UnitType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub lines: Vec<TransferLineRequest>,
    pub evidence_image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferExecutor {
    db: Database,
}

impl TransferExecutor {
    pub fn new(db: Database) -> Self {
        TransferExecutor { db }
    }

    /// Applies every line of a batch atomically and records the transfer.
    ///
    /// ## Returns
    /// * `Err(ServiceError::Validation)` - empty or oversized batch, bad line
    /// * `Err(ServiceError::NotFound)` - a line names an unknown product
    /// * `Err(ServiceError::InsufficientStock)` - a source can't cover its
    ///   line at that point of the batch
    pub async fn execute_transfers(&self, request: TransferRequest) -> ServiceResult<Transfer> {
        validate_transfer_size(request.lines.len())?;
        for line in &request.lines {
            check_line(line)?;
        }
        if let Some(url) = &request.evidence_image_url {
            validate_text("evidence_image_url", url, 500)?;
        }

        let transfer = retry_on_conflict("execute_transfers", || self.try_execute(&request)).await?;

        info!(
            transfer_id = %transfer.id,
            lines = transfer.lines.len(),
            pieces = transfer.total_pieces(),
            "Transfer executed"
        );
        Ok(transfer)
    }

    pub async fn get_transfer(&self, id: &str) -> ServiceResult<Transfer> {
        self.db
            .transfers()
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Transfer", id))
    }

    /// Most recent transfers, newest first.
    pub async fn list_recent(&self, limit: i64) -> ServiceResult<Vec<Transfer>> {
        Ok(self.db.transfers().list_recent(limit.clamp(1, 500)).await?)
    }

    async fn try_execute(&self, request: &TransferRequest) -> ServiceResult<Transfer> {
        let mut products: HashMap<String, Product> = HashMap::new();
        for line in &request.lines {
            if !products.contains_key(&line.product_id) {
                let product = self
                    .db
                    .products()
                    .get_by_id(&line.product_id)
                    .await?
                    .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
                products.insert(product.id.clone(), product);
            }
        }

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = products
                .get(&line.product_id)
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;
            lines.push(TransferLine {
                product_id: product.id.clone(),
                product_name: product.name.clone(),
                box_code: product.box_code.clone(),
                product_code: product.product_code.clone(),
                from_location: line.from_location.clone(),
                to_location: line.to_location.clone(),
                quantity: product.checked_pieces_for(line.quantity, line.unit_type)?,
            });
        }

        check_transfer_batch(&lines, &products)?;

        let transfer = Transfer {
            id: Uuid::new_v4().to_string(),
            lines,
            evidence_image_url: request.evidence_image_url.clone(),
            created_at: Utc::now(),
        };
        self.db.transfers().execute(&transfer).await?;
        Ok(transfer)
    }
}

fn check_line(line: &TransferLineRequest) -> ServiceResult<()> {
    validate_location("from_location", &line.from_location)?;
    validate_location("to_location", &line.to_location)?;
    validate_quantity(line.quantity)?;
    if line.from_location == line.to_location {
        return Err(ValidationError::MustDiffer {
            field: "to_location".to_string(),
            other: "from_location".to_string(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_product, memory_db};
    use bodega_core::catalog::NewProduct;
    use bodega_core::StockLocation;

    async fn setup() -> (TransferExecutor, Database, Product, Product) {
        let db = memory_db().await;
        let cookies = insert_product(
            &db,
            NewProduct::new("CJ-GAL", "PZ-GAL", "Galletas", 10, 500)
                .with_stock("BODEGA-1", 50)
                .with_stock("L1", 5),
        )
        .await;
        let water = insert_product(
            &db,
            NewProduct::new("CJ-AGU", "PZ-AGU", "Agua 1L", 12, 900).with_stock("BODEGA-1", 36),
        )
        .await;
        (TransferExecutor::new(db.clone()), db, cookies, water)
    }

    fn line(product: &Product, from: &str, to: &str, quantity: i64, unit: UnitType) -> TransferLineRequest {
        TransferLineRequest {
            product_id: product.id.clone(),
            from_location: from.to_string(),
            to_location: to.to_string(),
            quantity,
            unit_type: unit,
        }
    }

    async fn stock(db: &Database, product: &Product) -> Vec<StockLocation> {
        db.stock().for_product(&product.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_batch_moves_and_records() {
        let (executor, db, cookies, water) = setup().await;

        let transfer = executor
            .execute_transfers(TransferRequest {
                lines: vec![
                    line(&cookies, "BODEGA-1", "L1", 50, UnitType::Pieces),
                    line(&cookies, "L1", "L2", 30, UnitType::Pieces),
                    line(&water, "BODEGA-1", "L1", 2, UnitType::Boxes),
                ],
                evidence_image_url: Some("https://img.example/remision-17.jpg".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(transfer.lines[2].quantity, 24);
        assert_eq!(transfer.lines[0].box_code, "CJ-GAL");
        assert_eq!(transfer.total_pieces(), 104);

        assert_eq!(
            stock(&db, &cookies).await,
            vec![StockLocation::new("L1", 25), StockLocation::new("L2", 30)]
        );
        assert_eq!(
            stock(&db, &water).await,
            vec![StockLocation::new("BODEGA-1", 12), StockLocation::new("L1", 24)]
        );

        let stored = executor.get_transfer(&transfer.id).await.unwrap();
        assert_eq!(stored.lines.len(), 3);
        assert_eq!(executor.list_recent(5).await.unwrap()[0].id, transfer.id);
    }

    #[tokio::test]
    async fn test_failing_line_rejects_whole_batch() {
        let (executor, db, cookies, water) = setup().await;

        // The second line drains BODEGA-1 past what the first left
        let err = executor
            .execute_transfers(TransferRequest {
                lines: vec![
                    line(&water, "BODEGA-1", "L1", 1, UnitType::Boxes),
                    line(&cookies, "BODEGA-1", "L1", 40, UnitType::Pieces),
                    line(&cookies, "BODEGA-1", "L2", 11, UnitType::Pieces),
                ],
                evidence_image_url: None,
            })
            .await
            .unwrap_err();

        match err {
            ServiceError::InsufficientStock { available, requested, .. } => {
                assert_eq!(available, 10);
                assert_eq!(requested, 11);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(
            stock(&db, &cookies).await,
            vec![StockLocation::new("BODEGA-1", 50), StockLocation::new("L1", 5)]
        );
        assert_eq!(stock(&db, &water).await, vec![StockLocation::new("BODEGA-1", 36)]);
        assert!(executor.list_recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_batches() {
        let (executor, _db, cookies, _) = setup().await;

        let cases = vec![
            TransferRequest::default(),
            TransferRequest {
                lines: vec![line(&cookies, "L1", "L1", 1, UnitType::Pieces)],
                evidence_image_url: None,
            },
            TransferRequest {
                lines: vec![line(&cookies, "L1", "L2", 0, UnitType::Pieces)],
                evidence_image_url: None,
            },
        ];
        for request in cases {
            let err = executor.execute_transfers(request).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)));
        }

        let mut unknown = line(&cookies, "L1", "L2", 1, UnitType::Pieces);
        unknown.product_id = "missing".to_string();
        let err = executor
            .execute_transfers(TransferRequest {
                lines: vec![unknown],
                evidence_image_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }
}

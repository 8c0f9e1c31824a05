//! # Corte Repository
//!
//! Till-close snapshots. A corte is written once and never edited.

use bodega_core::Corte;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

const CORTE_COLUMNS: &str = r#"
    id, location, business_date, window_start, window_end,
    expected_cash_cents, expected_card_cents, actual_cash_cents, actual_card_cents,
    cash_variance_cents, card_variance_cents, total_tickets, created_at
"#;

/// Repository for corte snapshots.
#[derive(Debug, Clone)]
pub struct CorteRepository {
    pool: SqlitePool,
}

impl CorteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CorteRepository { pool }
    }

    pub async fn insert(&self, corte: &Corte) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO cortes ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            CORTE_COLUMNS
        ))
        .bind(&corte.id)
        .bind(&corte.location)
        .bind(corte.business_date)
        .bind(corte.window_start)
        .bind(corte.window_end)
        .bind(corte.expected_cash_cents)
        .bind(corte.expected_card_cents)
        .bind(corte.actual_cash_cents)
        .bind(corte.actual_card_cents)
        .bind(corte.cash_variance_cents)
        .bind(corte.card_variance_cents)
        .bind(corte.total_tickets)
        .bind(corte.created_at)
        .execute(&self.pool)
        .await?;

        info!(
            id = %corte.id,
            location = %corte.location,
            cash_variance_cents = corte.cash_variance_cents,
            "Corte stored"
        );
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Corte>> {
        let corte = sqlx::query_as::<_, Corte>(&format!(
            "SELECT {} FROM cortes WHERE id = ?1",
            CORTE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(corte)
    }

    /// Cortes of a location, newest first.
    pub async fn list_by_location(&self, location: &str, limit: i64) -> DbResult<Vec<Corte>> {
        let cortes = sqlx::query_as::<_, Corte>(&format!(
            "SELECT {} FROM cortes WHERE location = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            CORTE_COLUMNS
        ))
        .bind(location)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(cortes)
    }
}

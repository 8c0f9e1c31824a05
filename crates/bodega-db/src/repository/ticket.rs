//! # Ticket Repository
//!
//! Store tickets, mobile tickets and their per-location sequence counters.
//!
//! ## Sale Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create_ticket(draft, draws)                          │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    1. location_counters upsert ... RETURNING value   → sequence         │
//! │    2. INSERT tickets ('L1-{sequence}')                                  │
//! │    3. INSERT ticket_lines                                               │
//! │    4. conditional decrement per draw  ──► 0 rows → StockConflict        │
//! │  COMMIT                                    (whole transaction undone,   │
//! │                                             sequence not consumed)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The counter write is the first statement of every ticket transaction, so
//! the transaction holds SQLite's write lock from the start and concurrent
//! registers queue on `busy_timeout` instead of failing on lock upgrade.

use std::collections::HashMap;

use bodega_core::stock::ProductDraw;
use bodega_core::{
    FulfillmentStatus, GeoPoint, MobileTicket, PaymentStatus, PaymentType, Ticket, TicketKind,
    TicketLine, UnitType,
};
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::stock::apply_draws;
use crate::error::{DbError, DbResult};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    ticket_id: String,
    location: String,
    sequence: i64,
    total_cents: i64,
    profit_cents: i64,
    payment_type: PaymentType,
    amount_paid_cents: i64,
    change_cents: i64,
    created_at: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self, lines: Vec<TicketLine>) -> Ticket {
        Ticket {
            ticket_id: self.ticket_id,
            location: self.location,
            sequence: self.sequence,
            lines,
            total_cents: self.total_cents,
            profit_cents: self.profit_cents,
            payment_type: self.payment_type,
            amount_paid_cents: self.amount_paid_cents,
            change_cents: self.change_cents,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MobileTicketRow {
    ticket_id: String,
    location: String,
    sequence: i64,
    total_cents: i64,
    profit_cents: i64,
    customer_name: String,
    payment_type: Option<PaymentType>,
    amount_paid_cents: Option<i64>,
    change_cents: Option<i64>,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    device_id: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    sync_status: String,
    stock_deducted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl MobileTicketRow {
    fn into_ticket(self, lines: Vec<TicketLine>) -> MobileTicket {
        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
            _ => None,
        };

        MobileTicket {
            ticket_id: self.ticket_id,
            location: self.location,
            sequence: self.sequence,
            lines,
            total_cents: self.total_cents,
            profit_cents: self.profit_cents,
            customer_name: self.customer_name,
            payment_type: self.payment_type,
            amount_paid_cents: self.amount_paid_cents,
            change_cents: self.change_cents,
            payment_status: self.payment_status,
            fulfillment_status: self.fulfillment_status,
            device_id: self.device_id,
            coordinates,
            sync_status: self.sync_status,
            stock_deducted: self.stock_deducted,
            created_at: self.created_at,
            updated_at: self.updated_at,
            paid_at: self.paid_at,
        }
    }
}

/// A ticket line together with the ticket it belongs to.
#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    ticket_id: String,
    product_id: String,
    name: String,
    quantity: i64,
    unit_type: UnitType,
    pieces: i64,
    price_per_unit_cents: i64,
    cost_per_unit_cents: i64,
    total_cents: i64,
    profit_cents: i64,
}

impl LineRow {
    fn into_line(self) -> (String, TicketLine) {
        (
            self.ticket_id,
            TicketLine {
                product_id: self.product_id,
                name: self.name,
                quantity: self.quantity,
                unit_type: self.unit_type,
                pieces: self.pieces,
                price_per_unit_cents: self.price_per_unit_cents,
                cost_per_unit_cents: self.cost_per_unit_cents,
                total_cents: self.total_cents,
                profit_cents: self.profit_cents,
            },
        )
    }
}

const LINE_COLUMNS: &str = r#"
    l.ticket_id, l.product_id, l.name, l.quantity, l.unit_type, l.pieces,
    l.price_per_unit_cents, l.cost_per_unit_cents, l.total_cents, l.profit_cents
"#;

const MOBILE_COLUMNS: &str = r#"
    ticket_id, location, sequence, total_cents, profit_cents, customer_name,
    payment_type, amount_paid_cents, change_cents, payment_status,
    fulfillment_status, device_id, latitude, longitude, sync_status,
    stock_deducted, created_at, updated_at, paid_at
"#;

// =============================================================================
// Transaction Steps
// =============================================================================

/// Claims the next sequence number of `(location, kind)`. Starts at 1.
async fn next_sequence(conn: &mut SqliteConnection, location: &str, kind: TicketKind) -> DbResult<i64> {
    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO location_counters (location, kind, value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (location, kind) DO UPDATE SET value = value + 1
        RETURNING value
        "#,
    )
    .bind(location)
    .bind(kind.counter_key())
    .fetch_one(&mut *conn)
    .await?;
    Ok(sequence)
}

async fn insert_lines(
    conn: &mut SqliteConnection,
    kind: TicketKind,
    ticket_id: &str,
    lines: &[TicketLine],
) -> DbResult<()> {
    for (line_no, line) in lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO ticket_lines (
                kind, ticket_id, line_no, product_id, name, quantity, unit_type, pieces,
                price_per_unit_cents, cost_per_unit_cents, total_cents, profit_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(kind.counter_key())
        .bind(ticket_id)
        .bind(line_no as i64)
        .bind(&line.product_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_type)
        .bind(line.pieces)
        .bind(line.price_per_unit_cents)
        .bind(line.cost_per_unit_cents)
        .bind(line.total_cents)
        .bind(line.profit_cents)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Groups line rows by ticket id, keeping line order.
fn group_lines(rows: Vec<LineRow>) -> HashMap<String, Vec<TicketLine>> {
    let mut grouped: HashMap<String, Vec<TicketLine>> = HashMap::new();
    for row in rows {
        let (ticket_id, line) = row.into_line();
        grouped.entry(ticket_id).or_default().push(line);
    }
    grouped
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for store and mobile tickets.
///
/// ## Usage
/// ```rust,ignore
/// let draws = plan_ticket_draws(&lines, &products, "L1", &policy)?;
/// let ticket = db.tickets().create_ticket(draft, &draws).await?;
/// assert_eq!(ticket.ticket_id, format!("L1-{}", ticket.sequence));
/// ```
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    /// Stores a register sale and applies its stock draws atomically.
    ///
    /// `draft.sequence` and `draft.ticket_id` are ignored and assigned here.
    ///
    /// ## Returns
    /// * `Err(DbError::StockConflict)` - a draw no longer fits; nothing was
    ///   written and no sequence number was consumed
    pub async fn create_ticket(&self, draft: Ticket, draws: &[ProductDraw]) -> DbResult<Ticket> {
        let mut ticket = draft;
        let mut tx = self.pool.begin().await?;

        ticket.sequence = next_sequence(&mut tx, &ticket.location, TicketKind::Store).await?;
        ticket.ticket_id = TicketKind::Store.ticket_id(&ticket.location, ticket.sequence);

        debug!(ticket_id = %ticket.ticket_id, lines = ticket.lines.len(), "Inserting ticket");

        sqlx::query(
            r#"
            INSERT INTO tickets (
                ticket_id, location, sequence, total_cents, profit_cents,
                payment_type, amount_paid_cents, change_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&ticket.ticket_id)
        .bind(&ticket.location)
        .bind(ticket.sequence)
        .bind(ticket.total_cents)
        .bind(ticket.profit_cents)
        .bind(ticket.payment_type)
        .bind(ticket.amount_paid_cents)
        .bind(ticket.change_cents)
        .bind(ticket.created_at)
        .execute(&mut *tx)
        .await?;

        insert_lines(&mut tx, TicketKind::Store, &ticket.ticket_id, &ticket.lines).await?;
        apply_draws(&mut tx, draws, Some(&ticket.ticket_id)).await?;

        tx.commit().await?;

        info!(
            ticket_id = %ticket.ticket_id,
            total_cents = ticket.total_cents,
            "Ticket committed"
        );
        Ok(ticket)
    }

    /// Stores a mobile order, applying `draws` in the same transaction.
    ///
    /// Pass no draws for an order whose stock is deducted later; the caller
    /// sets `stock_deducted` to match.
    pub async fn create_mobile_ticket(
        &self,
        draft: MobileTicket,
        draws: &[ProductDraw],
    ) -> DbResult<MobileTicket> {
        let mut ticket = draft;
        let mut tx = self.pool.begin().await?;

        ticket.sequence = next_sequence(&mut tx, &ticket.location, TicketKind::Mobile).await?;
        ticket.ticket_id = TicketKind::Mobile.ticket_id(&ticket.location, ticket.sequence);

        debug!(ticket_id = %ticket.ticket_id, deducting = !draws.is_empty(), "Inserting mobile ticket");

        sqlx::query(&format!(
            "INSERT INTO mobile_tickets ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            MOBILE_COLUMNS
        ))
        .bind(&ticket.ticket_id)
        .bind(&ticket.location)
        .bind(ticket.sequence)
        .bind(ticket.total_cents)
        .bind(ticket.profit_cents)
        .bind(&ticket.customer_name)
        .bind(ticket.payment_type)
        .bind(ticket.amount_paid_cents)
        .bind(ticket.change_cents)
        .bind(ticket.payment_status)
        .bind(ticket.fulfillment_status)
        .bind(&ticket.device_id)
        .bind(ticket.coordinates.map(|c| c.latitude))
        .bind(ticket.coordinates.map(|c| c.longitude))
        .bind(&ticket.sync_status)
        .bind(ticket.stock_deducted)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .bind(ticket.paid_at)
        .execute(&mut *tx)
        .await?;

        insert_lines(&mut tx, TicketKind::Mobile, &ticket.ticket_id, &ticket.lines).await?;
        apply_draws(&mut tx, draws, Some(&ticket.ticket_id)).await?;

        tx.commit().await?;

        info!(ticket_id = %ticket.ticket_id, "Mobile ticket committed");
        Ok(ticket)
    }

    /// Saves a status change of a mobile order, compare-and-swap style.
    ///
    /// The row is only written if it still holds `previous`'s payment
    /// status, fulfillment status and deduction flag. `draws` (possibly
    /// empty) are applied in the same transaction.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - no such mobile ticket
    /// * `Err(DbError::Conflict)` - another update landed first
    /// * `Err(DbError::StockConflict)` - a draw no longer fits
    pub async fn update_mobile_ticket(
        &self,
        previous: &MobileTicket,
        next: &MobileTicket,
        draws: &[ProductDraw],
    ) -> DbResult<MobileTicket> {
        debug!(
            ticket_id = %next.ticket_id,
            payment = %next.payment_status,
            fulfillment = %next.fulfillment_status,
            "Updating mobile ticket"
        );

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE mobile_tickets SET
                payment_type = ?5,
                amount_paid_cents = ?6,
                change_cents = ?7,
                payment_status = ?8,
                fulfillment_status = ?9,
                stock_deducted = ?10,
                sync_status = ?11,
                updated_at = ?12,
                paid_at = ?13
            WHERE ticket_id = ?1
              AND payment_status = ?2
              AND fulfillment_status = ?3
              AND stock_deducted = ?4
            "#,
        )
        .bind(&previous.ticket_id)
        .bind(previous.payment_status)
        .bind(previous.fulfillment_status)
        .bind(previous.stock_deducted)
        .bind(next.payment_type)
        .bind(next.amount_paid_cents)
        .bind(next.change_cents)
        .bind(next.payment_status)
        .bind(next.fulfillment_status)
        .bind(next.stock_deducted)
        .bind(&next.sync_status)
        .bind(next.updated_at)
        .bind(next.paid_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT ticket_id FROM mobile_tickets WHERE ticket_id = ?1")
                    .bind(&previous.ticket_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return match exists {
                Some(_) => Err(DbError::conflict("MobileTicket", &previous.ticket_id)),
                None => Err(DbError::not_found("MobileTicket", &previous.ticket_id)),
            };
        }

        apply_draws(&mut tx, draws, Some(&previous.ticket_id)).await?;
        tx.commit().await?;

        Ok(next.clone())
    }

    /// Gets a store ticket with its lines.
    pub async fn get_ticket(&self, ticket_id: &str) -> DbResult<Option<Ticket>> {
        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT ticket_id, location, sequence, total_cents, profit_cents,
                   payment_type, amount_paid_cents, change_cents, created_at
            FROM tickets WHERE ticket_id = ?1
            "#,
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let lines = self.lines_of(TicketKind::Store, ticket_id).await?;
                Ok(Some(row.into_ticket(lines)))
            }
            None => Ok(None),
        }
    }

    /// Gets a mobile ticket with its lines.
    pub async fn get_mobile_ticket(&self, ticket_id: &str) -> DbResult<Option<MobileTicket>> {
        let row = sqlx::query_as::<_, MobileTicketRow>(&format!(
            "SELECT {} FROM mobile_tickets WHERE ticket_id = ?1",
            MOBILE_COLUMNS
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let lines = self.lines_of(TicketKind::Mobile, ticket_id).await?;
                Ok(Some(row.into_ticket(lines)))
            }
            None => Ok(None),
        }
    }

    /// Store tickets of a location created in `[start, end)`, oldest first.
    pub async fn list_tickets(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT ticket_id, location, sequence, total_cents, profit_cents,
                   payment_type, amount_paid_cents, change_cents, created_at
            FROM tickets
            WHERE location = ?1 AND created_at >= ?2 AND created_at < ?3
            ORDER BY sequence
            "#,
        )
        .bind(location)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let line_rows = sqlx::query_as::<_, LineRow>(&format!(
            r#"
            SELECT {} FROM ticket_lines l
            JOIN tickets t ON t.ticket_id = l.ticket_id AND l.kind = ?4
            WHERE t.location = ?1 AND t.created_at >= ?2 AND t.created_at < ?3
            ORDER BY l.ticket_id, l.line_no
            "#,
            LINE_COLUMNS
        ))
        .bind(location)
        .bind(start)
        .bind(end)
        .bind(TicketKind::Store.counter_key())
        .fetch_all(&self.pool)
        .await?;

        let mut lines = group_lines(line_rows);
        Ok(rows
            .into_iter()
            .map(|row| {
                let own = lines.remove(&row.ticket_id).unwrap_or_default();
                row.into_ticket(own)
            })
            .collect())
    }

    /// Mobile tickets of a location created in `[start, end)`, oldest first.
    pub async fn list_mobile_tickets(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<MobileTicket>> {
        self.mobile_where(
            "t.location = ?1 AND t.created_at >= ?2 AND t.created_at < ?3",
            location,
            start,
            end,
        )
        .await
    }

    /// Mobile tickets of a location created or paid in `[start, end)`,
    /// oldest first. A corte needs both: orders taken in the window and
    /// money collected in it.
    pub async fn list_mobile_tickets_created_or_paid(
        &self,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<MobileTicket>> {
        self.mobile_where(
            r#"t.location = ?1 AND (
                (t.created_at >= ?2 AND t.created_at < ?3)
                OR (t.paid_at >= ?2 AND t.paid_at < ?3)
            )"#,
            location,
            start,
            end,
        )
        .await
    }

    /// Mobile tickets and their lines matching `filter` over `t`, with
    /// `?1` location and `[?2, ?3)` the window.
    async fn mobile_where(
        &self,
        filter: &str,
        location: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<MobileTicket>> {
        let rows = sqlx::query_as::<_, MobileTicketRow>(&format!(
            "SELECT {} FROM mobile_tickets t WHERE {} ORDER BY t.sequence",
            MOBILE_COLUMNS, filter
        ))
        .bind(location)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let line_rows = sqlx::query_as::<_, LineRow>(&format!(
            r#"
            SELECT {} FROM ticket_lines l
            JOIN mobile_tickets t ON t.ticket_id = l.ticket_id AND l.kind = ?4
            WHERE {}
            ORDER BY l.ticket_id, l.line_no
            "#,
            LINE_COLUMNS, filter
        ))
        .bind(location)
        .bind(start)
        .bind(end)
        .bind(TicketKind::Mobile.counter_key())
        .fetch_all(&self.pool)
        .await?;

        let mut lines = group_lines(line_rows);
        Ok(rows
            .into_iter()
            .map(|row| {
                let own = lines.remove(&row.ticket_id).unwrap_or_default();
                row.into_ticket(own)
            })
            .collect())
    }

    /// Last sequence number handed out for `(location, kind)`; 0 if none.
    pub async fn current_sequence(&self, location: &str, kind: TicketKind) -> DbResult<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM location_counters WHERE location = ?1 AND kind = ?2",
        )
        .bind(location)
        .bind(kind.counter_key())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value.unwrap_or(0))
    }

    async fn lines_of(&self, kind: TicketKind, ticket_id: &str) -> DbResult<Vec<TicketLine>> {
        let rows = sqlx::query_as::<_, LineRow>(&format!(
            "SELECT {} FROM ticket_lines l WHERE l.kind = ?1 AND l.ticket_id = ?2 ORDER BY l.line_no",
            LINE_COLUMNS
        ))
        .bind(kind.counter_key())
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_line().1).collect())
    }
}

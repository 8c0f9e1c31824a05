//! # Sale Notifications
//!
//! Best-effort fan-out of committed sales to whoever listens (dashboards,
//! kitchen screens, a sync process).
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Sale Notification Flow                               │
//! │                                                                         │
//! │  SaleProcessor                                                          │
//! │     │ ticket committed                                                  │
//! │     ▼                                                                   │
//! │  dispatch(event) ──► tokio::spawn ──► timeout(publish("sales", json))   │
//! │     │                                      │                            │
//! │     │ returns immediately                  ├─ Ok       → debug!         │
//! │     ▼                                      ├─ Err      → warn!          │
//! │  receipt to caller                         └─ timed out → warn!         │
//! │                                                                         │
//! │  A failed or slow publish never reaches the caller of the sale.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Topics: `sales` for register tickets, `mobile-sales` for mobile orders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bodega_core::{MobileTicket, PaymentType, Ticket, TicketKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Buffered messages per topic before slow subscribers start lagging.
const TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Notification sink unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Event
// =============================================================================

/// Payload published for every committed sale.
///
/// ```json
/// {
///   "ticketId": "L1-42",
///   "kind": "store",
///   "location": "L1",
///   "totalCents": 10500,
///   "profitCents": 3000,
///   "paymentType": "cash",
///   "itemCount": 1,
///   "createdAt": "2024-03-09T18:21:07Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleEvent {
    pub ticket_id: String,
    pub kind: TicketKind,
    pub location: String,
    pub total_cents: i64,
    pub profit_cents: i64,
    pub payment_type: Option<PaymentType>,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

impl SaleEvent {
    pub fn from_ticket(ticket: &Ticket) -> Self {
        SaleEvent {
            ticket_id: ticket.ticket_id.clone(),
            kind: TicketKind::Store,
            location: ticket.location.clone(),
            total_cents: ticket.total_cents,
            profit_cents: ticket.profit_cents,
            payment_type: Some(ticket.payment_type),
            item_count: ticket.lines.len(),
            created_at: ticket.created_at,
        }
    }

    pub fn from_mobile(ticket: &MobileTicket) -> Self {
        SaleEvent {
            ticket_id: ticket.ticket_id.clone(),
            kind: TicketKind::Mobile,
            location: ticket.location.clone(),
            total_cents: ticket.total_cents,
            profit_cents: ticket.profit_cents,
            payment_type: ticket.payment_type,
            item_count: ticket.lines.len(),
            created_at: ticket.updated_at,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }
}

// =============================================================================
// Notifier Trait
// =============================================================================

/// A sink for sale events.
#[async_trait]
pub trait SaleNotifier: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), NotifyError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl SaleNotifier for NoopNotifier {
    async fn publish(&self, _topic: &str, _payload: String) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// In-process pub/sub: one tokio broadcast channel per topic.
///
/// ## Usage
/// ```rust,ignore
/// let notifier = Arc::new(BroadcastNotifier::new());
/// let mut sales = notifier.subscribe("sales").await;
/// // ... process a ticket ...
/// let json = sales.recv().await?;
/// ```
#[derive(Debug, Default)]
pub struct BroadcastNotifier {
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every payload published to `topic` from now on.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl SaleNotifier for BroadcastNotifier {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), NotifyError> {
        let topics = self.topics.read().await;
        match topics.get(topic) {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    debug!(topic = %topic, "No active subscribers");
                }
            }
            None => debug!(topic = %topic, "No subscribers for topic"),
        }
        Ok(())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Publishes `event` in the background, bounded by `timeout`.
///
/// Returns at once; the outcome is only logged.
pub fn dispatch(notifier: Arc<dyn SaleNotifier>, event: SaleEvent, timeout: Duration) {
    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(ticket_id = %event.ticket_id, error = %e, "Failed to encode sale event");
            return;
        }
    };

    tokio::spawn(async move {
        let topic = event.topic();
        match tokio::time::timeout(timeout, notifier.publish(topic, payload)).await {
            Ok(Ok(())) => debug!(ticket_id = %event.ticket_id, topic, "Sale event published"),
            Ok(Err(e)) => {
                warn!(ticket_id = %event.ticket_id, topic, error = %e, "Sale event not published")
            }
            Err(_) => warn!(
                ticket_id = %event.ticket_id,
                topic,
                timeout_ms = timeout.as_millis() as u64,
                "Sale event publish timed out"
            ),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: TicketKind) -> SaleEvent {
        SaleEvent {
            ticket_id: "L1-1".to_string(),
            kind,
            location: "L1".to_string(),
            total_cents: 10_500,
            profit_cents: 3_000,
            payment_type: Some(PaymentType::Cash),
            item_count: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_topic_and_shape() {
        assert_eq!(event(TicketKind::Store).topic(), "sales");
        assert_eq!(event(TicketKind::Mobile).topic(), "mobile-sales");

        let json = serde_json::to_value(event(TicketKind::Store)).unwrap();
        assert_eq!(json["ticketId"], "L1-1");
        assert_eq!(json["paymentType"], "cash");
        assert_eq!(json["itemCount"], 1);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_topic_subscribers_only() {
        let notifier = Arc::new(BroadcastNotifier::new());
        let mut sales = notifier.subscribe("sales").await;
        let mut mobile = notifier.subscribe("mobile-sales").await;

        dispatch(notifier.clone(), event(TicketKind::Store), Duration::from_secs(1));

        let payload = tokio::time::timeout(Duration::from_secs(1), sales.recv())
            .await
            .unwrap()
            .unwrap();
        let received: SaleEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(received.ticket_id, "L1-1");
        assert!(mobile.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new();
        assert!(notifier.publish("sales", "{}".to_string()).await.is_ok());
    }
}

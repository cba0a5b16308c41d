//! Payment-attempt notifications
//!
//! Every authorize call emits a [`PaymentAttemptEvent`] so external
//! subscribers (analytics, fraud review) can observe outcomes without
//! sitting in the request path.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Outcome of a payment attempt
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAttemptEvent {
    /// Driver that handled the attempt
    pub driver: String,
    pub success: bool,
    pub message: Option<String>,
    pub order_id: Option<Uuid>,
}

/// Receives payment-attempt events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn dispatch(&self, event: PaymentAttemptEvent);
}

/// Sink that drops every event
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn dispatch(&self, _event: PaymentAttemptEvent) {}
}

/// Sink fanning events out over a broadcast channel
#[derive(Debug)]
pub struct BroadcastSink {
    tx: broadcast::Sender<PaymentAttemptEvent>,
}

impl BroadcastSink {
    /// Create a sink and its first receiver
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<PaymentAttemptEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    /// Attach another receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PaymentAttemptEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn dispatch(&self, event: PaymentAttemptEvent) {
        // Nobody listening is fine
        let _ = self.tx.send(event);
    }
}

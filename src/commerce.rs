//! Commerce entities as far as this driver reads and writes them
//!
//! Orders, carts, and the transaction ledger are owned by the surrounding
//! commerce domain; only the fields the payment flow touches appear here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Cart metadata key holding the provider intent id
pub const PAYMENT_INTENT_KEY: &str = "payment_intent";

/// A customer purchase being finalized
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order id
    pub id: Uuid,
    /// Business-defined status string
    pub status: String,
    /// Set exactly once, when the order is placed; immutable afterwards
    pub placed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create an unplaced order
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: status.into(),
            placed_at: None,
        }
    }

    /// Whether the order has been placed
    pub fn is_placed(&self) -> bool {
        self.placed_at.is_some()
    }
}

/// Shipping address attached to a cart, forwarded to the provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingDetail {
    pub name: String,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Pre-order staging entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    /// Cart id
    pub id: Uuid,
    /// Draft order created from this cart, if any
    pub order_id: Option<Uuid>,
    /// Cart total in minor currency units
    pub total: i64,
    /// ISO currency code
    pub currency: String,
    /// Provider metadata; merged into, never wholesale replaced
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Shipping address
    #[serde(default)]
    pub shipping: Option<ShippingDetail>,
}

impl Cart {
    /// Create a cart with the given total
    pub fn new(total: i64, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: None,
            total,
            currency: currency.into(),
            meta: Map::new(),
            shipping: None,
        }
    }

    /// Stored payment intent id, if one has been recorded
    pub fn payment_intent_id(&self) -> Option<&str> {
        self.meta.get(PAYMENT_INTENT_KEY).and_then(Value::as_str)
    }
}

/// Ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Authorization awaiting manual capture
    Intent,
    /// Captured funds
    Capture,
    /// Refund against a prior capture
    Refund,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Capture => "capture",
            Self::Refund => "refund",
        }
    }
}

/// A row in the append-only transaction ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Row id
    pub id: Uuid,
    /// Owning order
    pub order_id: Uuid,
    /// Prior row this one follows (capture-of-intent, refund-of-capture)
    pub parent_transaction_id: Option<Uuid>,
    /// Whether the underlying provider operation succeeded
    pub success: bool,
    /// Entry type
    pub kind: TransactionType,
    /// Driver that recorded the row
    pub driver: String,
    /// Amount in minor currency units
    pub amount: i64,
    /// Provider reference; idempotency key together with `order_id`
    pub reference: String,
    /// Raw provider status string, kept for audit
    pub status: String,
    /// Failure message, if any
    pub notes: Option<String>,
    /// Card brand
    pub card_type: Option<String>,
    /// Card last four digits
    pub last_four: Option<String>,
    /// When funds were captured
    pub captured_at: Option<DateTime<Utc>>,
    /// Verification-check blob for downstream fraud review
    pub meta: Value,
}

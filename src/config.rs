//! Driver configuration

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// When charges are captured relative to authorization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// Capture as soon as the intent is authorized
    #[default]
    Automatic,
    /// Authorize only; capture is a separate operator action
    Manual,
}

impl CapturePolicy {
    /// Stripe `capture_method` value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automatic => "automatic",
            Self::Manual => "manual",
        }
    }
}

/// Stripe driver configuration
#[derive(Debug, Deserialize)]
pub struct StripeConfig {
    /// Secret API key
    pub api_key: SecretString,
    /// Webhook signing secret
    #[serde(default)]
    pub webhook_secret: Option<SecretString>,
    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Pinned Stripe API version, sent as `Stripe-Version`
    #[serde(default)]
    pub api_version: Option<String>,
    /// Path the webhook endpoint is mounted at
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
    /// Capture policy
    #[serde(default)]
    pub capture_policy: CapturePolicy,
    /// Provider intent status -> internal order status overrides.
    /// Unmapped statuses pass through unchanged.
    #[serde(default)]
    pub status_map: HashMap<String, String>,
    /// Order status when a payment places the order
    #[serde(default = "default_placed_status")]
    pub placed_status: String,
    /// Order status when the charge failed
    #[serde(default = "default_failed_status")]
    pub failed_status: String,
    /// Status for freshly created draft orders
    #[serde(default = "default_pending_status")]
    pub pending_status: String,
    /// Webhook event types that are acted on; everything else is
    /// acknowledged and ignored
    #[serde(default = "default_webhook_events")]
    pub webhook_events: Vec<String>,
    /// Tolerance for webhook signature timestamps, in seconds
    #[serde(default = "default_signature_tolerance")]
    pub signature_tolerance_secs: u64,
}

fn default_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_webhook_path() -> String {
    "stripe/webhook".to_string()
}

fn default_placed_status() -> String {
    "paid".to_string()
}

fn default_failed_status() -> String {
    "failed".to_string()
}

fn default_pending_status() -> String {
    "pending-payment".to_string()
}

fn default_webhook_events() -> Vec<String> {
    vec![
        "payment_intent.succeeded".to_string(),
        "payment_intent.payment_failed".to_string(),
    ]
}

fn default_signature_tolerance() -> u64 {
    300
}

impl StripeConfig {
    /// Create a configuration with defaults for the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().into(),
            webhook_secret: None,
            api_base: default_api_base(),
            api_version: None,
            webhook_path: default_webhook_path(),
            capture_policy: CapturePolicy::default(),
            status_map: HashMap::new(),
            placed_status: default_placed_status(),
            failed_status: default_failed_status(),
            pending_status: default_pending_status(),
            webhook_events: default_webhook_events(),
            signature_tolerance_secs: default_signature_tolerance(),
        }
    }

    /// Set the webhook signing secret
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into().into());
        self
    }

    /// Override the API base URL
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Set the capture policy
    pub fn with_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.capture_policy = policy;
        self
    }

    /// Map a provider intent status to an internal order status
    pub fn map_status(mut self, provider: impl Into<String>, internal: impl Into<String>) -> Self {
        self.status_map.insert(provider.into(), internal.into());
        self
    }

    /// Replace the webhook event allow-list
    pub fn with_webhook_events(mut self, events: Vec<String>) -> Self {
        self.webhook_events = events;
        self
    }
}

//! Webhook intake
//!
//! Verifies the provider signature, filters event types against the
//! configured allow-list, resolves the cart that references the event's
//! intent, and hands off to the driver's authorize path. The outcome maps
//! directly onto an HTTP status: signature/payload/linkage problems are
//! 400s, backing-store faults are 500s so the provider redelivers, and
//! everything else (including business-level payment failures) is a 200
//! so the provider does not retry non-transport failures.

use crate::client::StripeClient;
use crate::commerce::Cart;
use crate::driver::{AuthorizePayload, PaymentDriver, StripeDriver};
use crate::error::{PaymentError, PaymentResult};
use crate::store::CommerceStore;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signature verification failures
#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("signature header is missing timestamp or signature")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance: {age}s (tolerance {tolerance}s)")]
    TimestampOutOfTolerance { age: u64, tolerance: u64 },

    #[error("signature does not match payload")]
    Mismatch,
}

/// Verifies a webhook payload against its signature header
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError>;
}

/// Stripe `t=...,v1=...` HMAC-SHA256 signature scheme
pub struct StripeSignatureVerifier {
    secret: SecretString,
    tolerance_secs: u64,
}

impl StripeSignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into(),
            tolerance_secs: 300,
        }
    }

    /// Set the timestamp tolerance in seconds
    pub fn with_tolerance(mut self, seconds: u64) -> Self {
        self.tolerance_secs = seconds;
        self
    }

    /// Produce a header for the given payload and timestamp; used by the
    /// test-suite and by outbound webhook tooling
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        format!(
            "t={},v1={}",
            timestamp,
            self.compute(signed_payload.as_bytes())
        )
    }

    fn compute(&self, data: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC can take any size key");
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl SignatureVerifier for StripeSignatureVerifier {
    fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(t)) => timestamp = Some(t),
                (Some("v1"), Some(v)) => signature = Some(v),
                _ => {}
            }
        }
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(s)) => (t, s),
            _ => return Err(SignatureError::MalformedHeader),
        };

        let parsed: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::MalformedHeader)?;
        let age = (chrono::Utc::now().timestamp() - parsed).unsigned_abs();
        if age > self.tolerance_secs {
            return Err(SignatureError::TimestampOutOfTolerance {
                age,
                tolerance: self.tolerance_secs,
            });
        }

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let expected = self.compute(signed_payload.as_bytes());

        if !constant_time_eq(signature, &expected) {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Provider event envelope; only the fields the intake reads
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: Value,
}

impl EventEnvelope {
    /// Intent id of the event's subject object
    pub fn intent_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(Value::as_str)
    }
}

/// Outcome of handling one webhook delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Reconciliation was attempted
    Handled,
    /// Event type is not allow-listed; acknowledged without action
    Ignored,
    /// Bad signature, malformed payload, or unknown cart
    Rejected(&'static str),
    /// Backing-store fault before state was written; the delivery is not
    /// acknowledged so the provider retries it
    Failed(&'static str),
}

impl WebhookOutcome {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Handled | Self::Ignored => 200,
            Self::Rejected(_) => 400,
            Self::Failed(_) => 500,
        }
    }
}

/// Receives provider webhook deliveries and routes them into the driver
pub struct WebhookIntake<S, C> {
    driver: Arc<StripeDriver<S, C>>,
    verifier: Box<dyn SignatureVerifier>,
    allowed_events: Vec<String>,
}

impl<S, C> WebhookIntake<S, C>
where
    S: CommerceStore + 'static,
    C: StripeClient + 'static,
{
    /// Create an intake for the driver, pulling the event allow-list from
    /// its configuration
    pub fn new(driver: Arc<StripeDriver<S, C>>, verifier: Box<dyn SignatureVerifier>) -> Self {
        let allowed_events = driver.config().webhook_events.clone();
        Self {
            driver,
            verifier,
            allowed_events,
        }
    }

    /// Build the intake with a verifier derived from the driver
    /// configuration (signing secret and timestamp tolerance)
    pub fn from_config(driver: Arc<StripeDriver<S, C>>) -> PaymentResult<Self> {
        let config = driver.config();
        let secret = config.webhook_secret.as_ref().ok_or_else(|| {
            PaymentError::Config("webhook signing secret is not configured".to_string())
        })?;
        let verifier = StripeSignatureVerifier::new(secret.expose_secret())
            .with_tolerance(config.signature_tolerance_secs);
        Ok(Self::new(driver, Box::new(verifier)))
    }

    /// Handle one delivery. Infallible by design: every failure mode maps
    /// to an HTTP status for the provider.
    pub async fn handle(&self, body: &[u8], signature_header: &str) -> WebhookOutcome {
        if let Err(e) = self.verifier.verify(body, signature_header) {
            tracing::error!(error = %e, "webhook signature rejected");
            return WebhookOutcome::Rejected("invalid signature");
        }

        let event: EventEnvelope = match serde_json::from_slice(body) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "malformed webhook payload");
                return WebhookOutcome::Rejected("malformed payload");
            }
        };

        if !self.allowed_events.iter().any(|t| t == &event.event_type) {
            tracing::debug!(event = %event.event_type, "event type not allow-listed, ignoring");
            return WebhookOutcome::Ignored;
        }

        let Some(intent_id) = event.intent_id() else {
            tracing::error!(event = %event.id, "event object carries no intent id");
            return WebhookOutcome::Rejected("event without intent id");
        };

        let cart: Cart = match self.driver.store().find_cart_by_intent(intent_id).await {
            Ok(Some(cart)) => cart,
            Ok(None) => {
                // Operator alert: an event arrived for an intent this
                // system never recorded.
                tracing::error!(intent = %intent_id, "no cart references payment intent");
                return WebhookOutcome::Rejected("unknown cart");
            }
            Err(e) => {
                tracing::error!(intent = %intent_id, error = %e, "cart lookup failed");
                return WebhookOutcome::Failed("cart lookup failed");
            }
        };

        // Business-level failures still acknowledge the delivery; the
        // provider should only retry transport-class failures, which here
        // means backing-store faults.
        match self
            .driver
            .authorize(&cart, &AuthorizePayload::for_intent(intent_id))
            .await
        {
            Ok(attempt) => {
                tracing::debug!(
                    intent = %intent_id,
                    success = attempt.success,
                    "webhook reconciliation attempted"
                );
                WebhookOutcome::Handled
            }
            Err(e) => {
                tracing::error!(intent = %intent_id, error = %e, "webhook reconciliation failed");
                WebhookOutcome::Failed("reconciliation failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let verifier = StripeSignatureVerifier::new("whsec_test");
        let payload = br#"{"id":"evt_1"}"#;
        let header = verifier.sign(payload, chrono::Utc::now().timestamp());

        assert!(verifier.verify(payload, &header).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signer = StripeSignatureVerifier::new("whsec_a");
        let verifier = StripeSignatureVerifier::new("whsec_b");
        let payload = b"payload";
        let header = signer.sign(payload, chrono::Utc::now().timestamp());

        assert!(matches!(
            verifier.verify(payload, &header),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let verifier = StripeSignatureVerifier::new("whsec_test");
        let header = verifier.sign(b"original", chrono::Utc::now().timestamp());

        assert!(matches!(
            verifier.verify(b"tampered", &header),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let verifier = StripeSignatureVerifier::new("whsec_test").with_tolerance(60);
        let payload = b"payload";
        let header = verifier.sign(payload, chrono::Utc::now().timestamp() - 1000);

        assert!(matches!(
            verifier.verify(payload, &header),
            Err(SignatureError::TimestampOutOfTolerance { .. })
        ));
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let verifier = StripeSignatureVerifier::new("whsec_test");
        assert!(matches!(
            verifier.verify(b"payload", "garbage"),
            Err(SignatureError::MalformedHeader)
        ));
    }

    #[test]
    fn test_envelope_intent_extraction() {
        let event: EventEnvelope = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123", "object": "payment_intent" } },
        }))
        .unwrap();

        assert_eq!(event.intent_id(), Some("pi_123"));
        assert_eq!(event.event_type, "payment_intent.succeeded");
    }
}

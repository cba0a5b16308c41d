//! Read-only projections of Stripe payment state
//!
//! These structs mirror only the fields the reconciliation flow reads.
//! Depending on the pinned API version, Stripe exposes an intent's charges
//! either as an embedded list or as a single `latest_charge`; [`ChargeSet`]
//! carries both shapes and is only consumed through
//! [`ChargeSet::authoritative`].

use crate::commerce::ShippingDetail;
use crate::config::CapturePolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Payment intent lifecycle status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    RequiresCapture,
    Processing,
    Succeeded,
    Canceled,
    /// Status value this driver does not recognize
    Other(String),
}

impl IntentStatus {
    /// Parse from the wire value
    pub fn from_str(s: &str) -> Self {
        match s {
            "requires_payment_method" => Self::RequiresPaymentMethod,
            "requires_confirmation" => Self::RequiresConfirmation,
            "requires_action" => Self::RequiresAction,
            "requires_capture" => Self::RequiresCapture,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "canceled" => Self::Canceled,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire value
    pub fn as_str(&self) -> &str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::RequiresCapture => "requires_capture",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
            Self::Other(s) => s,
        }
    }

    /// Terminal success; the only status that can place an order
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl<'de> Deserialize<'de> for IntentStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s))
    }
}

impl Serialize for IntentStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Charge status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeStatus {
    Succeeded,
    /// Legacy alias for a settled charge on old API versions
    Paid,
    Pending,
    Failed,
    Other(String),
}

impl ChargeStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "succeeded" => Self::Succeeded,
            "paid" => Self::Paid,
            "pending" => Self::Pending,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Paid => "paid",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Other(s) => s,
        }
    }

    /// Funds moved
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Paid)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl<'de> Deserialize<'de> for ChargeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_str(&s))
    }
}

impl Serialize for ChargeStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Card verification check results, recorded verbatim for fraud review
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardChecks {
    pub address_line1_check: Option<String>,
    pub address_postal_code_check: Option<String>,
    pub cvc_check: Option<String>,
}

/// Card summary attached to a charge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardSummary {
    pub brand: Option<String>,
    pub last4: Option<String>,
    #[serde(default)]
    pub checks: Option<CardChecks>,
}

/// Payment method details; absent for non-card payment methods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentMethodDetails {
    #[serde(default)]
    pub card: Option<CardSummary>,
}

/// A funds-movement attempt against a payment method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub id: String,
    pub status: ChargeStatus,
    #[serde(default)]
    pub captured: bool,
    /// Fully refunded
    #[serde(default)]
    pub refunded: bool,
    pub amount: i64,
    #[serde(default)]
    pub amount_captured: i64,
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub failure_code: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
    #[serde(default)]
    pub payment_method_details: Option<PaymentMethodDetails>,
    /// Parent intent id
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(with = "epoch_seconds")]
    pub created: DateTime<Utc>,
}

impl Charge {
    /// Card summary, if the payment method was a card
    pub fn card(&self) -> Option<&CardSummary> {
        self.payment_method_details
            .as_ref()
            .and_then(|d| d.card.as_ref())
    }

    /// No failure code and not in a failure state
    pub fn is_successful(&self) -> bool {
        self.failure_code.is_none() && !self.status.is_failure()
    }
}

/// The charges attached to an intent, in either provider API shape
#[derive(Debug, Clone)]
pub enum ChargeSet {
    /// Newer API versions expose a single `latest_charge`
    Latest(Option<Box<Charge>>),
    /// Older API versions embed the charge list, most recent first
    List(Vec<Charge>),
}

impl ChargeSet {
    /// Select the authoritative charge to reconcile against.
    ///
    /// The latest-charge field wins outright. For a list, prefer the first
    /// successful charge that has not been fully refunded, falling back to
    /// the first entry. `None` means there is no charge to record yet.
    pub fn authoritative(&self) -> Option<&Charge> {
        match self {
            Self::Latest(charge) => charge.as_deref(),
            Self::List(charges) => charges
                .iter()
                .find(|c| c.status.is_success() && !c.refunded)
                .or_else(|| charges.first()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Latest(charge) => charge.is_none(),
            Self::List(charges) => charges.is_empty(),
        }
    }
}

/// Read-only projection of a provider payment intent
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount: i64,
    pub currency: String,
    /// Message of the last payment error, if any
    pub last_payment_error: Option<String>,
    pub charges: ChargeSet,
}

impl PaymentIntent {
    /// Construct an intent projection directly (mainly for tests and mocks)
    pub fn new(id: impl Into<String>, status: IntentStatus, charges: ChargeSet) -> Self {
        Self {
            id: id.into(),
            status,
            amount: 0,
            currency: "usd".to_string(),
            last_payment_error: None,
            charges,
        }
    }
}

impl<'de> Deserialize<'de> for PaymentIntent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct LastPaymentError {
            #[serde(default)]
            message: Option<String>,
        }

        #[derive(Deserialize)]
        struct ChargeList {
            #[serde(default)]
            data: Vec<Charge>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum LatestCharge {
            Object(Box<Charge>),
            Id(String),
        }

        #[derive(Deserialize)]
        struct Raw {
            id: String,
            status: IntentStatus,
            #[serde(default)]
            amount: i64,
            #[serde(default)]
            currency: String,
            #[serde(default)]
            last_payment_error: Option<LastPaymentError>,
            #[serde(default)]
            charges: Option<ChargeList>,
            #[serde(default)]
            latest_charge: Option<LatestCharge>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let charges = match (raw.charges, raw.latest_charge) {
            (Some(list), _) => ChargeSet::List(list.data),
            (None, Some(LatestCharge::Object(charge))) => ChargeSet::Latest(Some(charge)),
            // An unexpanded latest_charge id carries no charge fields to
            // record; treated as "no charge yet".
            (None, _) => ChargeSet::Latest(None),
        };

        Ok(PaymentIntent {
            id: raw.id,
            status: raw.status,
            amount: raw.amount,
            currency: raw.currency,
            last_payment_error: raw.last_payment_error.and_then(|e| e.message),
            charges,
        })
    }
}

/// A provider refund record
#[derive(Debug, Clone, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    /// Raw provider status string
    pub status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(with = "epoch_seconds")]
    pub created: DateTime<Utc>,
}

impl Refund {
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }
}

/// Parameters for creating an intent from a cart
#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    /// Amount in minor currency units
    pub amount: i64,
    /// ISO currency code
    pub currency: String,
    pub capture_method: CapturePolicy,
    pub shipping: Option<ShippingDetail>,
}

pub(crate) mod epoch_seconds {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.timestamp())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {secs}")))
    }
}

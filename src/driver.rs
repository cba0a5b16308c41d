//! Payment drivers: authorize, capture, refund
//!
//! [`PaymentDriver`] is the capability interface the surrounding checkout
//! consumes; additional providers are additional implementations registered
//! in a [`DriverRegistry`] keyed by driver name. [`StripeDriver`] is the
//! Stripe implementation.
//!
//! All provider rejections and domain conflicts surface as result objects
//! with a `success` flag and message; nothing business-level propagates as
//! an error past the driver boundary. Only backing-store faults do.

use crate::client::StripeClient;
use crate::commerce::{Cart, PAYMENT_INTENT_KEY};
use crate::config::{CapturePolicy, StripeConfig};
use crate::error::{PaymentError, PaymentResult};
use crate::events::{EventSink, NullSink, PaymentAttemptEvent};
use crate::ledger::LedgerUpsert;
use crate::reconcile::Reconciler;
use crate::status::StatusMapping;
use crate::store::{CommerceStore, StoreError};
use crate::types::{CreateIntentParams, IntentStatus, PaymentIntent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Result of an authorize call; also the payload of the emitted
/// payment-attempt notification
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAuthorize {
    pub success: bool,
    pub message: Option<String>,
    pub order_id: Option<Uuid>,
}

impl PaymentAuthorize {
    pub fn ok(order_id: Uuid) -> Self {
        Self {
            success: true,
            message: None,
            order_id: Some(order_id),
        }
    }

    pub fn failed(message: impl Into<String>, order_id: Option<Uuid>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            order_id,
        }
    }
}

/// Result of a capture call
#[derive(Debug, Clone, Serialize)]
pub struct PaymentCapture {
    pub success: bool,
    pub message: Option<String>,
}

impl PaymentCapture {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Result of a refund call
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRefund {
    pub success: bool,
    pub message: Option<String>,
}

impl PaymentRefund {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Data handed to authorize by the checkout or the webhook intake
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizePayload {
    /// Intent id; falls back to the cart's stored metadata when absent
    pub payment_intent: Option<String>,
}

impl AuthorizePayload {
    pub fn for_intent(id: impl Into<String>) -> Self {
        Self {
            payment_intent: Some(id.into()),
        }
    }
}

/// A payment-type driver
#[async_trait]
pub trait PaymentDriver: Send + Sync {
    /// Registry key
    fn name(&self) -> &'static str;

    /// Authorize the payment for a cart and reconcile the resulting order
    async fn authorize(
        &self,
        cart: &Cart,
        payload: &AuthorizePayload,
    ) -> PaymentResult<PaymentAuthorize>;

    /// Capture a previously authorized transaction, optionally partially
    async fn capture(
        &self,
        transaction_id: Uuid,
        amount: Option<i64>,
    ) -> PaymentResult<PaymentCapture>;

    /// Refund a captured transaction, optionally partially
    async fn refund(
        &self,
        transaction_id: Uuid,
        amount: Option<i64>,
        notes: Option<String>,
    ) -> PaymentResult<PaymentRefund>;
}

/// Lookup of payment drivers keyed by name
#[derive(Default)]
pub struct DriverRegistry {
    drivers: HashMap<&'static str, Arc<dyn PaymentDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn PaymentDriver>) {
        self.drivers.insert(driver.name(), driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PaymentDriver>> {
        self.drivers.get(name).cloned()
    }
}

/// Stripe payment driver
pub struct StripeDriver<S, C> {
    store: Arc<S>,
    client: Arc<C>,
    config: StripeConfig,
    mapping: StatusMapping,
    sink: Arc<dyn EventSink>,
}

impl<S, C> StripeDriver<S, C>
where
    S: CommerceStore,
    C: StripeClient,
{
    pub fn new(store: Arc<S>, client: Arc<C>, config: StripeConfig) -> Self {
        let mapping = StatusMapping::new(config.status_map.clone());
        Self {
            store,
            client,
            config,
            mapping,
            sink: Arc::new(NullSink),
        }
    }

    /// Attach a payment-attempt event sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    fn reconciler(&self) -> Reconciler<'_, S> {
        Reconciler::new(self.store.as_ref(), &self.mapping)
            .with_labels(&self.config.placed_status, &self.config.failed_status)
    }

    /// Resolve the cart's intent, creating a new one when the stored id is
    /// missing or no longer resolves at the provider. The new intent id is
    /// merged into the cart metadata.
    pub async fn create_intent(&self, cart: &Cart) -> PaymentResult<PaymentIntent> {
        if let Some(id) = cart.payment_intent_id() {
            if let Some(intent) = self.fetch_intent(id).await? {
                return Ok(intent);
            }
        }

        let intent = self
            .client
            .create_intent(&CreateIntentParams {
                amount: cart.total,
                currency: cart.currency.clone(),
                capture_method: self.config.capture_policy,
                shipping: cart.shipping.clone(),
            })
            .await?;

        self.store
            .merge_cart_meta(cart.id, PAYMENT_INTENT_KEY, Value::String(intent.id.clone()))
            .await?;

        Ok(intent)
    }

    /// Retrieve an intent, mapping the provider's "no such resource"
    /// rejection to `None`. Transient provider errors (rate limits,
    /// outages) propagate so callers do not mistake them for a stale id.
    pub async fn fetch_intent(&self, id: &str) -> PaymentResult<Option<PaymentIntent>> {
        match self.client.retrieve_intent(id).await {
            Ok(intent) => Ok(Some(intent)),
            Err(PaymentError::IntentNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn authorize_inner(
        &self,
        cart: &Cart,
        payload: &AuthorizePayload,
    ) -> PaymentResult<PaymentAuthorize> {
        let order = match self
            .store
            .order_for_cart(cart, &self.config.pending_status)
            .await
        {
            Ok(order) => order,
            Err(StoreError::OrderConflict) => {
                return Ok(PaymentAuthorize::failed(
                    PaymentError::OrderConflict(cart.id.to_string()).to_string(),
                    None,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if order.is_placed() {
            return Ok(PaymentAuthorize::failed(
                PaymentError::OrderAlreadyPlaced.to_string(),
                Some(order.id),
            ));
        }

        let Some(intent_id) = payload
            .payment_intent
            .clone()
            .or_else(|| cart.payment_intent_id().map(str::to_string))
        else {
            return Ok(PaymentAuthorize::failed(
                PaymentError::IntentNotFound("none recorded for cart".to_string()).to_string(),
                Some(order.id),
            ));
        };

        let mut intent = match self.client.retrieve_intent(&intent_id).await {
            Ok(intent) => intent,
            Err(
                e @ (PaymentError::IntentNotFound(_)
                | PaymentError::Provider(_)
                | PaymentError::Network(_)),
            ) => {
                tracing::error!(intent = %intent_id, error = %e, "unable to retrieve payment intent");
                return Ok(PaymentAuthorize::failed(e.to_string(), Some(order.id)));
            }
            Err(e) => return Err(e),
        };

        if intent.status == IntentStatus::RequiresPaymentMethod {
            return Ok(PaymentAuthorize::failed(
                PaymentError::PaymentMethodRequired.to_string(),
                Some(order.id),
            ));
        }

        if intent.status == IntentStatus::RequiresCapture
            && self.config.capture_policy == CapturePolicy::Automatic
        {
            let key = format!("cap-{}-{}", order.id, intent.id);
            intent = match self.client.capture_intent(&intent.id, None, &key).await {
                Ok(intent) => intent,
                Err(e @ (PaymentError::Provider(_) | PaymentError::Network(_))) => {
                    tracing::warn!(intent = %intent_id, error = %e, "automatic capture rejected");
                    return Ok(PaymentAuthorize::failed(e.to_string(), Some(order.id)));
                }
                Err(e) => return Err(e),
            };
        }

        self.store
            .merge_cart_meta(cart.id, PAYMENT_INTENT_KEY, Value::String(intent.id.clone()))
            .await?;

        let order = self.reconciler().reconcile(order, &intent).await?;

        // Non-terminal intent states leave the order pending without
        // failing the attempt; only a failed charge or dead-end status is
        // reported as a failure.
        let success = order.is_placed()
            || matches!(
                intent.status,
                IntentStatus::Processing
                    | IntentStatus::RequiresCapture
                    | IntentStatus::RequiresAction
                    | IntentStatus::RequiresConfirmation
            );
        if success {
            return Ok(PaymentAuthorize::ok(order.id));
        }

        let message = intent
            .charges
            .authoritative()
            .and_then(|c| c.failure_message.clone())
            .or_else(|| intent.last_payment_error.clone())
            .unwrap_or_else(|| "payment failed".to_string());
        Ok(PaymentAuthorize::failed(message, Some(order.id)))
    }
}

#[async_trait]
impl<S, C> PaymentDriver for StripeDriver<S, C>
where
    S: CommerceStore + 'static,
    C: StripeClient + 'static,
{
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn authorize(
        &self,
        cart: &Cart,
        payload: &AuthorizePayload,
    ) -> PaymentResult<PaymentAuthorize> {
        let outcome = self.authorize_inner(cart, payload).await?;

        self.sink
            .dispatch(PaymentAttemptEvent {
                driver: self.name().to_string(),
                success: outcome.success,
                message: outcome.message.clone(),
                order_id: outcome.order_id,
            })
            .await;

        Ok(outcome)
    }

    async fn capture(
        &self,
        transaction_id: Uuid,
        amount: Option<i64>,
    ) -> PaymentResult<PaymentCapture> {
        let transaction = match self.store.load_transaction(transaction_id).await {
            Ok(t) => t,
            Err(e @ StoreError::TransactionNotFound(_)) => {
                return Ok(PaymentCapture::failed(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let order = self.store.load_order(transaction.order_id).await?;

        // Deterministic key: a retried capture of the same row cannot
        // double-capture at the provider.
        let key = format!("cap-{}", transaction.id);
        let intent = match self
            .client
            .capture_intent(&transaction.reference, amount, &key)
            .await
        {
            Ok(intent) => intent,
            Err(
                e @ (PaymentError::Provider(_)
                | PaymentError::Network(_)
                | PaymentError::IntentNotFound(_)),
            ) => {
                tracing::warn!(reference = %transaction.reference, error = %e, "capture rejected");
                return Ok(PaymentCapture::failed(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        self.reconciler()
            .reconcile_with_parent(order, &intent, Some(transaction.id))
            .await?;

        Ok(PaymentCapture::ok())
    }

    async fn refund(
        &self,
        transaction_id: Uuid,
        amount: Option<i64>,
        notes: Option<String>,
    ) -> PaymentResult<PaymentRefund> {
        let transaction = match self.store.load_transaction(transaction_id).await {
            Ok(t) => t,
            Err(e @ StoreError::TransactionNotFound(_)) => {
                return Ok(PaymentRefund::failed(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let key = format!("ref-{}-{}", transaction.id, amount.unwrap_or(0));
        let refund = match self
            .client
            .create_refund(&transaction.reference, amount, &key)
            .await
        {
            Ok(refund) => refund,
            Err(
                e @ (PaymentError::Provider(_)
                | PaymentError::Network(_)
                | PaymentError::IntentNotFound(_)),
            ) => {
                // Rejected operations leave the ledger untouched
                tracing::warn!(reference = %transaction.reference, error = %e, "refund rejected");
                return Ok(PaymentRefund::failed(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        self.store
            .append_transaction(LedgerUpsert::from_refund(&refund, &transaction, notes))
            .await?;

        Ok(PaymentRefund::ok())
    }
}

//! Stripe API client
//!
//! The driver talks to Stripe through the [`StripeClient`] trait so tests
//! and embedders can substitute their own handle; [`StripeHttpClient`] is
//! the real implementation over `reqwest`. Each driver instance owns an
//! explicitly constructed client rather than sharing process-global SDK
//! state.

use crate::config::StripeConfig;
use crate::error::{PaymentError, PaymentResult};
use crate::types::{Charge, CreateIntentParams, PaymentIntent, Refund};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Outbound Stripe operations the payment flow depends on
#[async_trait]
pub trait StripeClient: Send + Sync {
    /// Retrieve an intent by id
    async fn retrieve_intent(&self, id: &str) -> PaymentResult<PaymentIntent>;

    /// Create a new intent
    async fn create_intent(&self, params: &CreateIntentParams) -> PaymentResult<PaymentIntent>;

    /// Capture an authorized intent, optionally for a partial amount
    async fn capture_intent(
        &self,
        id: &str,
        amount_to_capture: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<PaymentIntent>;

    /// Refund against an intent, optionally for a partial amount
    async fn create_refund(
        &self,
        payment_intent: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<Refund>;

    /// Retrieve a charge by id
    async fn retrieve_charge(&self, id: &str) -> PaymentResult<Charge>;
}

/// HTTP client for the Stripe API
pub struct StripeHttpClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    api_version: Option<String>,
}

impl StripeHttpClient {
    /// Build a client from the driver configuration
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.expose_secret().into(),
            api_version: config.api_version.clone(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> PaymentResult<T> {
        let response = self
            .request(reqwest::Method::GET, path, None)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> PaymentResult<T> {
        let response = self
            .request(reqwest::Method::POST, path, idempotency_key)
            .form(params)
            .send()
            .await?;
        Self::decode(response).await
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        idempotency_key: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.api_key.expose_secret());
        if let Some(version) = &self.api_version {
            builder = builder.header("Stripe-Version", version);
        }
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        builder
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> PaymentResult<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let envelope: Result<ErrorEnvelope, _> = response.json().await;
        let message = envelope
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("unexpected response status {status}"));

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::Provider(format!("no such resource: {message}")));
        }
        Err(PaymentError::Provider(message))
    }
}

#[async_trait]
impl StripeClient for StripeHttpClient {
    async fn retrieve_intent(&self, id: &str) -> PaymentResult<PaymentIntent> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/payment_intents/{id}"),
                None,
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PaymentError::IntentNotFound(id.to_string()));
        }
        Self::decode(response).await
    }

    async fn create_intent(&self, params: &CreateIntentParams) -> PaymentResult<PaymentIntent> {
        let mut form: Vec<(&str, String)> = vec![
            ("amount", params.amount.to_string()),
            ("currency", params.currency.to_lowercase()),
            ("payment_method_types[]", "card".to_string()),
            ("capture_method", params.capture_method.as_str().to_string()),
        ];

        if let Some(shipping) = &params.shipping {
            form.push(("shipping[name]", shipping.name.clone()));
            let address = [
                ("shipping[address][line1]", &shipping.line1),
                ("shipping[address][line2]", &shipping.line2),
                ("shipping[address][city]", &shipping.city),
                ("shipping[address][state]", &shipping.state),
                ("shipping[address][postal_code]", &shipping.postal_code),
                ("shipping[address][country]", &shipping.country),
            ];
            for (field, value) in address {
                if let Some(value) = value {
                    form.push((field, value.clone()));
                }
            }
        }

        self.post_form("/payment_intents", &form, None).await
    }

    async fn capture_intent(
        &self,
        id: &str,
        amount_to_capture: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<PaymentIntent> {
        let mut form: Vec<(&str, String)> = Vec::new();
        if let Some(amount) = amount_to_capture {
            form.push(("amount_to_capture", amount.to_string()));
        }
        self.post_form(
            &format!("/payment_intents/{id}/capture"),
            &form,
            Some(idempotency_key),
        )
        .await
    }

    async fn create_refund(
        &self,
        payment_intent: &str,
        amount: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<Refund> {
        let mut form: Vec<(&str, String)> =
            vec![("payment_intent", payment_intent.to_string())];
        if let Some(amount) = amount {
            form.push(("amount", amount.to_string()));
        }
        self.post_form("/refunds", &form, Some(idempotency_key))
            .await
    }

    async fn retrieve_charge(&self, id: &str) -> PaymentResult<Charge> {
        self.get(&format!("/charges/{id}")).await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    #[allow(dead_code)]
    #[serde(rename = "type")]
    error_type: Option<String>,
    #[allow(dead_code)]
    code: Option<String>,
}

//! Shared test support: a scriptable Stripe client and fixture builders.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use commerce_stripe::client::StripeClient;
use commerce_stripe::error::{PaymentError, PaymentResult};
use commerce_stripe::types::{
    CardChecks, CardSummary, Charge, ChargeSet, ChargeStatus, CreateIntentParams, IntentStatus,
    PaymentIntent, PaymentMethodDetails, Refund,
};
use std::collections::HashMap;
use std::sync::Mutex;

pub const CHARGE_CREATED: i64 = 1_700_000_000;

#[derive(Default)]
struct MockState {
    intents: HashMap<String, PaymentIntent>,
    retrieve_error: Option<String>,
    capture_response: Option<Result<PaymentIntent, String>>,
    refund_response: Option<Result<Refund, String>>,
    create_response: Option<PaymentIntent>,
    idempotency_keys: Vec<String>,
    create_calls: usize,
}

/// Scriptable provider client: seed the responses, run the flow under
/// test, then assert on the recorded calls.
#[derive(Default)]
pub struct MockStripeClient {
    state: Mutex<MockState>,
}

impl MockStripeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_intent(&self, intent: PaymentIntent) {
        self.state
            .lock()
            .unwrap()
            .intents
            .insert(intent.id.clone(), intent);
    }

    pub fn reject_retrieve(&self, message: &str) {
        self.state.lock().unwrap().retrieve_error = Some(message.to_string());
    }

    pub fn on_create(&self, intent: PaymentIntent) {
        self.state.lock().unwrap().create_response = Some(intent);
    }

    pub fn on_capture(&self, intent: PaymentIntent) {
        self.state.lock().unwrap().capture_response = Some(Ok(intent));
    }

    pub fn reject_capture(&self, message: &str) {
        self.state.lock().unwrap().capture_response = Some(Err(message.to_string()));
    }

    pub fn on_refund(&self, refund: Refund) {
        self.state.lock().unwrap().refund_response = Some(Ok(refund));
    }

    pub fn reject_refund(&self, message: &str) {
        self.state.lock().unwrap().refund_response = Some(Err(message.to_string()));
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().idempotency_keys.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }
}

#[async_trait]
impl StripeClient for MockStripeClient {
    async fn retrieve_intent(&self, id: &str) -> PaymentResult<PaymentIntent> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.retrieve_error {
            return Err(PaymentError::Provider(message.clone()));
        }
        state
            .intents
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::IntentNotFound(id.to_string()))
    }

    async fn create_intent(&self, _params: &CreateIntentParams) -> PaymentResult<PaymentIntent> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let intent = state
            .create_response
            .clone()
            .ok_or_else(|| PaymentError::Provider("no create response scripted".to_string()))?;
        state.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn capture_intent(
        &self,
        _id: &str,
        _amount_to_capture: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<PaymentIntent> {
        let mut state = self.state.lock().unwrap();
        state.idempotency_keys.push(idempotency_key.to_string());
        match state.capture_response.clone() {
            Some(Ok(intent)) => {
                state.intents.insert(intent.id.clone(), intent.clone());
                Ok(intent)
            }
            Some(Err(message)) => Err(PaymentError::Provider(message)),
            None => Err(PaymentError::Provider(
                "no capture response scripted".to_string(),
            )),
        }
    }

    async fn create_refund(
        &self,
        _payment_intent: &str,
        _amount: Option<i64>,
        idempotency_key: &str,
    ) -> PaymentResult<Refund> {
        let mut state = self.state.lock().unwrap();
        state.idempotency_keys.push(idempotency_key.to_string());
        match state.refund_response.clone() {
            Some(Ok(refund)) => Ok(refund),
            Some(Err(message)) => Err(PaymentError::Provider(message)),
            None => Err(PaymentError::Provider(
                "no refund response scripted".to_string(),
            )),
        }
    }

    async fn retrieve_charge(&self, id: &str) -> PaymentResult<Charge> {
        Err(PaymentError::Provider(format!(
            "no charge response scripted for {id}"
        )))
    }
}

pub fn card_charge(id: &str, amount: i64) -> Charge {
    Charge {
        id: id.to_string(),
        status: ChargeStatus::Succeeded,
        captured: true,
        refunded: false,
        amount,
        amount_captured: amount,
        amount_refunded: 0,
        failure_code: None,
        failure_message: None,
        payment_method_details: Some(PaymentMethodDetails {
            card: Some(CardSummary {
                brand: Some("visa".to_string()),
                last4: Some("4242".to_string()),
                checks: Some(CardChecks {
                    address_line1_check: Some("pass".to_string()),
                    address_postal_code_check: Some("pass".to_string()),
                    cvc_check: Some("pass".to_string()),
                }),
            }),
        }),
        payment_intent: None,
        created: Utc.timestamp_opt(CHARGE_CREATED, 0).unwrap(),
    }
}

pub fn succeeded_intent(id: &str, amount: i64) -> PaymentIntent {
    let mut charge = card_charge("ch_1", amount);
    charge.payment_intent = Some(id.to_string());
    let mut intent = PaymentIntent::new(
        id,
        IntentStatus::Succeeded,
        ChargeSet::Latest(Some(Box::new(charge))),
    );
    intent.amount = amount;
    intent
}

pub fn uncaptured_intent(id: &str, amount: i64) -> PaymentIntent {
    let mut charge = card_charge("ch_1", amount);
    charge.captured = false;
    charge.amount_captured = 0;
    charge.payment_intent = Some(id.to_string());
    let mut intent = PaymentIntent::new(
        id,
        IntentStatus::RequiresCapture,
        ChargeSet::Latest(Some(Box::new(charge))),
    );
    intent.amount = amount;
    intent
}

pub fn chargeless_intent(id: &str, status: IntentStatus) -> PaymentIntent {
    PaymentIntent::new(id, status, ChargeSet::Latest(None))
}

pub fn declined_intent(id: &str, amount: i64) -> PaymentIntent {
    let mut charge = card_charge("ch_1", amount);
    charge.status = ChargeStatus::Failed;
    charge.captured = false;
    charge.amount_captured = 0;
    charge.failure_code = Some("card_declined".to_string());
    charge.failure_message = Some("Your card was declined.".to_string());
    charge.payment_intent = Some(id.to_string());
    let mut intent = PaymentIntent::new(
        id,
        IntentStatus::RequiresPaymentMethod,
        ChargeSet::Latest(Some(Box::new(charge))),
    );
    intent.amount = amount;
    intent
}

pub fn refund_ok(id: &str, payment_intent: &str, amount: i64) -> Refund {
    Refund {
        id: id.to_string(),
        amount,
        status: "succeeded".to_string(),
        payment_intent: Some(payment_intent.to_string()),
        charge: Some("ch_1".to_string()),
        created: Utc::now(),
    }
}

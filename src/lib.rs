//! Stripe payment integration for hosted-intent checkouts
//!
//! The crate ties a commerce backend (orders, carts, a transaction ledger)
//! to Stripe's payment-intent lifecycle:
//!
//! - [`driver::StripeDriver`] implements [`driver::PaymentDriver`]
//!   (authorize, capture, refund) against a [`store::CommerceStore`]
//! - [`reconcile::Reconciler`] folds an intent snapshot into the order
//!   exactly once, no matter how many times the same snapshot is replayed
//! - [`webhook::WebhookIntake`] verifies provider deliveries and routes
//!   them through the same reconciliation path the checkout uses
//!
//! ```no_run
//! use commerce_stripe::client::StripeHttpClient;
//! use commerce_stripe::config::StripeConfig;
//! use commerce_stripe::driver::StripeDriver;
//! use commerce_stripe::store::MemoryStore;
//! use std::sync::Arc;
//!
//! let config = StripeConfig::new("sk_test_123");
//! let client = Arc::new(StripeHttpClient::new(&config));
//! let store = Arc::new(MemoryStore::new());
//! let driver = StripeDriver::new(store, client, config);
//! # let _ = driver;
//! ```

pub mod client;
pub mod commerce;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod ledger;
pub mod reconcile;
pub mod status;
pub mod store;
pub mod types;
pub mod webhook;

pub use client::{StripeClient, StripeHttpClient};
pub use commerce::{Cart, Order, ShippingDetail, Transaction, TransactionType};
pub use config::{CapturePolicy, StripeConfig};
pub use driver::{
    AuthorizePayload, DriverRegistry, PaymentAuthorize, PaymentCapture, PaymentDriver,
    PaymentRefund, StripeDriver,
};
pub use error::{PaymentError, PaymentResult};
pub use events::{BroadcastSink, EventSink, NullSink, PaymentAttemptEvent};
pub use ledger::LedgerUpsert;
pub use reconcile::Reconciler;
pub use status::{MappedStatus, StatusMapping};
pub use store::{CommerceStore, MemoryStore, OrderPatch, StoreError};
pub use types::{Charge, ChargeSet, ChargeStatus, IntentStatus, PaymentIntent, Refund};
pub use webhook::{
    SignatureVerifier, StripeSignatureVerifier, WebhookIntake, WebhookOutcome,
};

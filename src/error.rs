//! Error types for the Stripe payment driver

use crate::store::StoreError;
use thiserror::Error;

/// Payment error types
#[derive(Error, Debug)]
pub enum PaymentError {
    /// The order has already been placed; placement is terminal
    #[error("this order has already been placed")]
    OrderAlreadyPlaced,

    /// The commerce domain forbids another draft order for this cart
    #[error("cart already has a draft order in progress: {0}")]
    OrderConflict(String),

    /// No payment intent with this id exists at the provider
    #[error("payment intent not found: {0}")]
    IntentNotFound(String),

    /// The intent still needs a payment method before it can be confirmed
    #[error("payment intent requires a payment method")]
    PaymentMethodRequired,

    /// Provider rejected the operation (validation, invalid state)
    #[error("provider rejected the request: {0}")]
    Provider(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backing store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        PaymentError::Network(err.to_string())
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;

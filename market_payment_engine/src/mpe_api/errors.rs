use thiserror::Error;

use crate::{
    db_types::OrderId,
    traits::{ChainIssuerError, PaymentGatewayError, RailError},
};

#[derive(Debug, Error)]
pub enum CheckoutApiError {
    #[error("Invalid checkout request: {0}")]
    InvalidRequest(String),
    #[error("The payment rail failed to initiate the order: {0}")]
    RailFailure(#[from] RailError),
    #[error(transparent)]
    Backend(#[from] PaymentGatewayError),
}

impl CheckoutApiError {
    /// A failed checkout releases its reservation before this error surfaces, so a retryable failure can be retried
    /// immediately with a fresh order id.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutApiError::RailFailure(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum IssuanceApiError {
    #[error("Order {0} cannot be issued: {1}")]
    NotIssuable(OrderId, String),
    #[error("Gave up on the chain call after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("The chain call failed: {0}")]
    Chain(#[from] ChainIssuerError),
    #[error(transparent)]
    Backend(#[from] PaymentGatewayError),
}

use mps_common::Money;
use thiserror::Error;

use crate::{
    db_types::{MerchantConfig, OrderId},
    rail_types::{BankInitResponse, CreditInitResponse},
};

/// Parameters for a tokenized-card capture against the credit rail.
#[derive(Debug, Clone)]
pub struct CreditInitRequest {
    pub order_id: OrderId,
    pub price: Money,
    /// Short-lived card token obtained by the client from the rail's tokenizer
    pub card_token: String,
    pub email: String,
}

/// Parameters for issuing a bank virtual account for the order.
#[derive(Debug, Clone)]
pub struct BankInitRequest {
    pub order_id: OrderId,
    pub price: Money,
    pub payer_name: String,
    pub email: String,
}

/// The outbound contract against a payment provider.
///
/// The rail is the system of record for money movement; this engine is the system of record for fulfilment intent.
/// Initiation calls are blocking I/O to the provider, and the checkout flow only makes them once its reservation has
/// durably committed, rolling the reservation back if they fail.
#[allow(async_fn_in_trait)]
pub trait PaymentRail: Clone {
    async fn initiate_credit(
        &self,
        merchant: &MerchantConfig,
        req: CreditInitRequest,
    ) -> Result<CreditInitResponse, RailError>;

    async fn initiate_bank(&self, merchant: &MerchantConfig, req: BankInitRequest)
        -> Result<BankInitResponse, RailError>;
}

#[derive(Debug, Clone, Error)]
pub enum RailError {
    #[error("The rail could not be reached: {0}")]
    Unreachable(String),
    #[error("The rail answered with a malformed response: {0}")]
    MalformedResponse(String),
    #[error("The rail rejected our credentials: {0}")]
    AuthRejected(String),
    #[error("The rail rejected the request: {0}")]
    Rejected(String),
}

impl RailError {
    /// Initiation failures are surfaced to the caller as retryable unless the rail positively rejected the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RailError::Unreachable(_) | RailError::MalformedResponse(_))
    }
}

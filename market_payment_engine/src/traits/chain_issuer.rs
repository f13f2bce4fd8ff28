use thiserror::Error;

/// The receipt for a submitted chain transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: String,
    /// True once the transaction is confirmed. The issuance orchestrator only advances order state on confirmed
    /// receipts.
    pub confirmed: bool,
}

/// The chain's view of a token, as returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainAsset {
    pub token_id: i64,
    pub owner: String,
    pub tx_hash: String,
}

/// The outbound contract against the asset-chain service.
///
/// The engine never owns blockchain state directly; it requests mints and transfers and observes their outcome.
/// Implementations are expected to be safe to call twice with the same (contract, token id): the orchestrator checks
/// [`ChainIssuer::asset_status`] before submitting, but a crash between submit and record can still produce a
/// duplicate request, which the chain itself rejects.
#[allow(async_fn_in_trait)]
pub trait ChainIssuer: Clone {
    async fn mint(
        &self,
        contract_address: &str,
        token_id: i64,
        metadata: &serde_json::Value,
    ) -> Result<ChainReceipt, ChainIssuerError>;

    async fn transfer(
        &self,
        contract_address: &str,
        token_id: i64,
        to: &str,
    ) -> Result<ChainReceipt, ChainIssuerError>;

    async fn asset_status(
        &self,
        contract_address: &str,
        token_id: i64,
    ) -> Result<Option<OnChainAsset>, ChainIssuerError>;
}

#[derive(Debug, Clone, Error)]
pub enum ChainIssuerError {
    #[error("The chain service could not be reached: {0}")]
    Unreachable(String),
    #[error("The chain call failed: {0}")]
    CallFailed(String),
    #[error("The transaction was submitted but confirmation timed out: {0}")]
    ConfirmationTimeout(String),
    #[error("Token {1} is already minted on contract {0}")]
    AlreadyMinted(String, i64),
}

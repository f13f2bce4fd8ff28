use std::sync::Arc;

use chrono::{Duration, Utc};
use log::*;
use market_payment_engine::traits::{ChainIssuer, ChainIssuerError, ChainReceipt, OnChainAsset, RailError};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    config::RailConfig,
    data_objects::{AssetWire, AuthBody, AuthWire, MintBody, ReceiptWire, TransferBody},
    session::{AccessToken, TokenSession, TokenSource},
};

/// REST client for the asset-chain service.
///
/// The service authenticates with short-lived bearer tokens obtained from the API key. The token is cached in a
/// [`TokenSession`] and refreshed in single flight; a request that comes back 401 before the advertised expiry
/// invalidates the cache and retries once with a fresh token.
#[derive(Clone)]
pub struct ChainApiClient {
    config: RailConfig,
    client: Arc<Client>,
    session: TokenSession,
}

enum CallFailure {
    Unreachable(String),
    Status(StatusCode, String),
    Malformed(String),
}

impl ChainApiClient {
    pub fn new(config: RailConfig) -> Result<Self, ChainIssuerError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ChainIssuerError::CallFailed(format!("could not initialize HTTP client: {e}")))?;
        Ok(Self { config, client: Arc::new(client), session: TokenSession::new() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.chain_base_url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, CallFailure> {
        let mut retried = false;
        loop {
            let token = self
                .session
                .bearer(self)
                .await
                .map_err(|e| CallFailure::Unreachable(format!("token refresh failed: {e}")))?;
            let mut req = self.client.request(method.clone(), self.url(path)).bearer_auth(token);
            if let Some(body) = &body {
                req = req.json(body);
            }
            let response = req.send().await.map_err(|e| CallFailure::Unreachable(e.to_string()))?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!("⛓️ Access token rejected before expiry. Refreshing and retrying once.");
                self.session.invalidate().await;
                retried = true;
                continue;
            }
            if status.is_success() {
                return response.json::<T>().await.map_err(|e| CallFailure::Malformed(e.to_string()));
            }
            let message = response.text().await.unwrap_or_default();
            return Err(CallFailure::Status(status, message));
        }
    }
}

impl TokenSource for ChainApiClient {
    async fn fetch_token(&self) -> Result<AccessToken, RailError> {
        let body = AuthBody { api_key: self.config.chain_api_key.reveal().clone() };
        let response = self
            .client
            .post(self.url("/v1/auth/tokens"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RailError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RailError::AuthRejected(format!("{status}: {message}")));
        }
        let wire = response.json::<AuthWire>().await.map_err(|e| RailError::MalformedResponse(e.to_string()))?;
        debug!("⛓️ Obtained a chain access token, valid for {}s", wire.expires_in);
        Ok(AccessToken { token: wire.access_token, expires_at: Utc::now() + Duration::seconds(wire.expires_in) })
    }
}

impl ChainIssuer for ChainApiClient {
    async fn mint(
        &self,
        contract_address: &str,
        token_id: i64,
        metadata: &Value,
    ) -> Result<ChainReceipt, ChainIssuerError> {
        let body = MintBody {
            contract_address: contract_address.to_string(),
            token_id,
            metadata: metadata.clone(),
        };
        debug!("⛓️ Submitting mint for token {token_id} on {contract_address}");
        let body = serde_json::to_value(&body).map_err(|e| ChainIssuerError::CallFailed(e.to_string()))?;
        let wire: ReceiptWire = self.call(Method::POST, "/v1/assets/mint", Some(body)).await.map_err(|e| match e {
            CallFailure::Status(StatusCode::CONFLICT, _) => {
                ChainIssuerError::AlreadyMinted(contract_address.to_string(), token_id)
            },
            e => into_chain_error(e),
        })?;
        Ok(ChainReceipt { tx_hash: wire.tx_hash, confirmed: wire.confirmed })
    }

    async fn transfer(
        &self,
        contract_address: &str,
        token_id: i64,
        to: &str,
    ) -> Result<ChainReceipt, ChainIssuerError> {
        let body =
            TransferBody { contract_address: contract_address.to_string(), token_id, to: to.to_string() };
        debug!("⛓️ Submitting transfer of token {token_id} on {contract_address} to {to}");
        let body = serde_json::to_value(&body).map_err(|e| ChainIssuerError::CallFailed(e.to_string()))?;
        let wire: ReceiptWire =
            self.call(Method::POST, "/v1/assets/transfer", Some(body)).await.map_err(into_chain_error)?;
        Ok(ChainReceipt { tx_hash: wire.tx_hash, confirmed: wire.confirmed })
    }

    async fn asset_status(
        &self,
        contract_address: &str,
        token_id: i64,
    ) -> Result<Option<OnChainAsset>, ChainIssuerError> {
        let path = format!("/v1/assets/{contract_address}/{token_id}");
        match self.call::<AssetWire>(Method::GET, &path, None).await {
            Ok(wire) => Ok(Some(OnChainAsset { token_id: wire.token_id, owner: wire.owner, tx_hash: wire.tx_hash })),
            Err(CallFailure::Status(StatusCode::NOT_FOUND, _)) => Ok(None),
            Err(e) => Err(into_chain_error(e)),
        }
    }
}

fn into_chain_error(e: CallFailure) -> ChainIssuerError {
    match e {
        CallFailure::Unreachable(msg) => ChainIssuerError::Unreachable(msg),
        CallFailure::Malformed(msg) => ChainIssuerError::CallFailed(format!("malformed response: {msg}")),
        CallFailure::Status(StatusCode::GATEWAY_TIMEOUT, msg) => ChainIssuerError::ConfirmationTimeout(msg),
        CallFailure::Status(status, msg) => ChainIssuerError::CallFailed(format!("{status}: {msg}")),
    }
}

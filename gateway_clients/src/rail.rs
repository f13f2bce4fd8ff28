use std::sync::Arc;

use log::*;
use market_payment_engine::{
    db_types::MerchantConfig,
    rail_types::{BankInitResponse, CreditInitResponse},
    traits::{BankInitRequest, CreditInitRequest, PaymentRail, RailError},
};
use mps_common::KRW_CURRENCY_CODE;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::RailConfig,
    data_objects::{BankInitBody, BankInitWire, CreditInitBody, CreditInitWire},
};

/// REST client for the payment provider. One provider fronts both rails; credit captures and virtual-account
/// issuance are separate endpoints with the same merchant authentication scheme.
#[derive(Clone)]
pub struct GatewayRailClient {
    config: RailConfig,
    client: Arc<Client>,
}

impl GatewayRailClient {
    pub fn new(config: RailConfig) -> Result<Self, RailError> {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RailError::Unreachable(format!("could not initialize HTTP client: {e}")))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Merchant credentials ride along per call, since every town has its own merchant account.
    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        merchant: &MerchantConfig,
        body: &B,
    ) -> Result<T, RailError> {
        trace!("Sending rail request: {url}");
        let response = self
            .client
            .post(url)
            .header("X-Merchant-Id", &merchant.merchant_cc_id)
            .header("X-Api-Key", &merchant.merchant_secret_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RailError::Unreachable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| RailError::MalformedResponse(e.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RailError::AuthRejected(message)),
            s if s.is_client_error() => Err(RailError::Rejected(format!("{s}: {message}"))),
            s => Err(RailError::Unreachable(format!("{s}: {message}"))),
        }
    }
}

impl PaymentRail for GatewayRailClient {
    async fn initiate_credit(
        &self,
        merchant: &MerchantConfig,
        req: CreditInitRequest,
    ) -> Result<CreditInitResponse, RailError> {
        let url = format!("{}/v1/credit/payments", self.config.credit_base_url);
        let body = CreditInitBody {
            order_id: req.order_id.as_str().to_string(),
            amount: req.price.value(),
            currency: KRW_CURRENCY_CODE,
            card_token: req.card_token,
            email: req.email,
        };
        debug!("💳️ Initiating credit capture for order {}", req.order_id);
        let wire: CreditInitWire = self.post(&url, merchant, &body).await?;
        info!("💳️ Credit capture for order {} accepted (request id {})", req.order_id, wire.request_id);
        Ok(CreditInitResponse { request_id: wire.request_id, redirect_url: wire.redirect_url })
    }

    async fn initiate_bank(
        &self,
        merchant: &MerchantConfig,
        req: BankInitRequest,
    ) -> Result<BankInitResponse, RailError> {
        let url = format!("{}/v1/vbank/accounts", self.config.bank_base_url);
        let body = BankInitBody {
            order_id: req.order_id.as_str().to_string(),
            amount: req.price.value(),
            currency: KRW_CURRENCY_CODE,
            payer_name: req.payer_name,
            email: req.email,
        };
        debug!("🏦️ Requesting virtual account for order {}", req.order_id);
        let wire: BankInitWire = self.post(&url, merchant, &body).await?;
        info!("🏦️ Virtual account for order {} issued (confirm number {})", req.order_id, wire.confirm_number);
        Ok(BankInitResponse {
            institution_code: wire.institution_code,
            customer_number: wire.customer_number,
            confirm_number: wire.confirm_number,
        })
    }
}

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Asset, NewAsset, OrderId, OwnedProduct, OwnedProductStatus, PaymentStatus, PendingPayment, Product},
    events::{AssetMintedEvent, AssetTransferredEvent, EventProducers},
    mpe_api::errors::IssuanceApiError,
    traits::{ChainIssuer, ChainIssuerError, PaymentGatewayDatabase, PaymentGatewayError},
};

/// `IssuanceApi` drives on-chain fulfilment for asset-backed products.
///
/// Minting is idempotent per (contract, token id): the local asset table is consulted first, then the chain itself,
/// and only then is a mint submitted. Submissions are retried with exponential backoff up to a bound; an order that
/// exhausts its attempts stays `Purchased` with a recorded error, visible in the manual-intervention queue, and a
/// later call picks up exactly where the failure left off.
pub struct IssuanceApi<B, C> {
    db: B,
    chain: C,
    producers: EventProducers,
    max_attempts: u32,
    backoff: std::time::Duration,
}

impl<B, C> Debug for IssuanceApi<B, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IssuanceApi")
    }
}

impl<B, C> IssuanceApi<B, C> {
    pub fn new(db: B, chain: C, producers: EventProducers) -> Self {
        Self { db, chain, producers, max_attempts: 3, backoff: std::time::Duration::from_millis(500) }
    }

    /// Overrides the default retry policy (3 attempts, 500ms base backoff, doubling per attempt).
    pub fn with_retry_policy(mut self, max_attempts: u32, backoff: std::time::Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }
}

impl<B, C> IssuanceApi<B, C>
where
    B: PaymentGatewayDatabase,
    C: ChainIssuer,
{
    /// Mints one token per unit of the order. Safe to call again after a partial failure: already-minted tokens are
    /// recognised and skipped, and the order's units only advance to `NftMinted` once every token is confirmed.
    pub async fn mint_for_order(&self, order_id: &OrderId) -> Result<Vec<Asset>, IssuanceApiError> {
        let (payment, product) = self.issuable_order(order_id).await?;
        let units = self.db.fetch_owned_products(order_id).await?;
        let mut assets = Vec::with_capacity(units.len());
        for unit in &units {
            match unit.status {
                OwnedProductStatus::Purchased => {
                    let asset = self.ensure_minted(&payment, &product, unit).await?;
                    assets.push(asset);
                },
                OwnedProductStatus::NftMinted | OwnedProductStatus::NftTransferred => {
                    // Already issued. Collect the existing record so re-entry returns the full set.
                    if let Some(asset) = self.fetch_unit_asset(&product, unit).await? {
                        assets.push(asset);
                    }
                },
                status => {
                    return Err(IssuanceApiError::NotIssuable(
                        order_id.clone(),
                        format!("unit {} is {status}", unit.id),
                    ));
                },
            }
        }
        let moved = self
            .db
            .advance_owned_products(order_id, OwnedProductStatus::Purchased, OwnedProductStatus::NftMinted)
            .await?;
        if !moved.is_empty() {
            info!("⛓️ Order {order_id}: {} unit(s) minted on contract", moved.len());
            self.call_asset_minted_hook(&moved, &assets).await;
        }
        Ok(assets)
    }

    /// Transfers every minted token of the order to `recipient`. Gated on `NftMinted`; tokens already owned by the
    /// recipient are skipped, so the call is safe to repeat.
    pub async fn transfer_for_order(&self, order_id: &OrderId, recipient: &str) -> Result<Vec<Asset>, IssuanceApiError> {
        let (_, product) = self.issuable_order(order_id).await?;
        let contract = self.contract_of(order_id, &product)?.1;
        let units = self.db.fetch_owned_products(order_id).await?;
        let mut assets = Vec::with_capacity(units.len());
        for unit in &units {
            match unit.status {
                OwnedProductStatus::NftMinted => {
                    let token_id = self.token_of(order_id, unit)?;
                    assets.push(self.transfer_token(&contract, token_id, recipient).await?);
                },
                OwnedProductStatus::NftTransferred => {
                    if let Some(asset) = self.fetch_unit_asset(&product, unit).await? {
                        assets.push(asset);
                    }
                },
                status => {
                    return Err(IssuanceApiError::NotIssuable(
                        order_id.clone(),
                        format!("unit {} is {status}, transfer requires NftMinted", unit.id),
                    ));
                },
            }
        }
        let moved = self
            .db
            .advance_owned_products(order_id, OwnedProductStatus::NftMinted, OwnedProductStatus::NftTransferred)
            .await?;
        if !moved.is_empty() {
            info!("⛓️ Order {order_id}: {} unit(s) transferred to {recipient}", moved.len());
            self.call_asset_transferred_hook(&moved, &assets).await;
        }
        Ok(assets)
    }

    //----------------------------------- internals ----------------------------------------------

    async fn issuable_order(&self, order_id: &OrderId) -> Result<(PendingPayment, Product), IssuanceApiError> {
        let payment = self
            .db
            .fetch_pending_payment(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        if payment.status != PaymentStatus::Success {
            return Err(IssuanceApiError::NotIssuable(
                order_id.clone(),
                format!("payment has status {}", payment.status),
            ));
        }
        let product = self
            .db
            .fetch_product(payment.product_id)
            .await?
            .ok_or(PaymentGatewayError::ProductNotFound(payment.product_id))?;
        if !product.is_asset_backed() {
            return Err(IssuanceApiError::NotIssuable(order_id.clone(), "product is not asset-backed".to_string()));
        }
        Ok((payment, product))
    }

    fn contract_of(&self, order_id: &OrderId, product: &Product) -> Result<(i64, String), IssuanceApiError> {
        match (product.chain_id, product.contract_address.clone()) {
            (Some(chain_id), Some(contract)) => Ok((chain_id, contract)),
            _ => Err(IssuanceApiError::NotIssuable(
                order_id.clone(),
                format!("product {} has no chain configuration", product.id),
            )),
        }
    }

    fn token_of(&self, order_id: &OrderId, unit: &OwnedProduct) -> Result<i64, IssuanceApiError> {
        unit.token_id.ok_or_else(|| {
            IssuanceApiError::NotIssuable(order_id.clone(), format!("unit {} has no reserved token id", unit.id))
        })
    }

    async fn fetch_unit_asset(&self, product: &Product, unit: &OwnedProduct) -> Result<Option<Asset>, IssuanceApiError> {
        let (Some(contract), Some(token_id)) = (product.contract_address.as_deref(), unit.token_id) else {
            return Ok(None);
        };
        Ok(self.db.fetch_asset(contract, token_id).await?)
    }

    async fn ensure_minted(
        &self,
        payment: &PendingPayment,
        product: &Product,
        unit: &OwnedProduct,
    ) -> Result<Asset, IssuanceApiError> {
        let order_id = &unit.order_id;
        let (chain_id, contract) = self.contract_of(order_id, product)?;
        let token_id = self.token_of(order_id, unit)?;
        if let Some(asset) = self.db.fetch_asset(&contract, token_id).await? {
            trace!("⛓️ Token {token_id} on {contract} is already recorded locally");
            return Ok(asset);
        }
        let metadata = serde_json::json!({
            "order_id": payment.order_id.as_str(),
            "product_id": product.id,
            "product_name": product.name,
        });
        // A mint may have been submitted before a crash; ask the chain before submitting again.
        if let Some(on_chain) = self.chain.asset_status(&contract, token_id).await? {
            debug!("⛓️ Token {token_id} on {contract} was minted earlier (tx {}). Recording it.", on_chain.tx_hash);
            return self.record_asset(chain_id, &contract, token_id, metadata, on_chain.tx_hash).await;
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self.chain.mint(&contract, token_id, &metadata).await {
                Ok(receipt) if receipt.confirmed => {
                    return self.record_asset(chain_id, &contract, token_id, metadata, receipt.tx_hash).await;
                },
                Ok(receipt) => ChainIssuerError::ConfirmationTimeout(receipt.tx_hash),
                Err(ChainIssuerError::AlreadyMinted(..)) => {
                    // Raced an earlier submission. The status query has the transaction hash.
                    match self.chain.asset_status(&contract, token_id).await? {
                        Some(on_chain) => {
                            return self.record_asset(chain_id, &contract, token_id, metadata, on_chain.tx_hash).await;
                        },
                        None => ChainIssuerError::CallFailed(
                            "chain reports the token as minted but the status query came back empty".to_string(),
                        ),
                    }
                },
                Err(e) => e,
            };
            if attempt >= self.max_attempts {
                error!("⛓️ Giving up on minting token {token_id} for order {order_id} after {attempt} attempts: {failure}");
                self.db.record_mint_attempt(order_id, &failure.to_string()).await?;
                return Err(IssuanceApiError::RetriesExhausted { attempts: attempt, last_error: failure.to_string() });
            }
            let delay = self.backoff * 2u32.pow(attempt - 1);
            debug!("⛓️ Mint attempt {attempt} for token {token_id} failed ({failure}). Retrying in {delay:?}.");
            tokio::time::sleep(delay).await;
        }
    }

    async fn transfer_token(&self, contract: &str, token_id: i64, recipient: &str) -> Result<Asset, IssuanceApiError> {
        let asset = self
            .db
            .fetch_asset(contract, token_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::AssetNotFound(contract.to_string(), token_id))?;
        if asset.owner.as_deref() == Some(recipient) {
            trace!("⛓️ Token {token_id} on {contract} already belongs to {recipient}");
            return Ok(asset);
        }
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let failure = match self.chain.transfer(contract, token_id, recipient).await {
                Ok(receipt) if receipt.confirmed => {
                    let asset = self.db.set_asset_owner(contract, token_id, recipient).await?;
                    return Ok(asset);
                },
                Ok(receipt) => ChainIssuerError::ConfirmationTimeout(receipt.tx_hash),
                Err(e) => e,
            };
            if attempt >= self.max_attempts {
                error!("⛓️ Giving up on transferring token {token_id} to {recipient} after {attempt} attempts: {failure}");
                return Err(IssuanceApiError::RetriesExhausted { attempts: attempt, last_error: failure.to_string() });
            }
            let delay = self.backoff * 2u32.pow(attempt - 1);
            debug!("⛓️ Transfer attempt {attempt} for token {token_id} failed ({failure}). Retrying in {delay:?}.");
            tokio::time::sleep(delay).await;
        }
    }

    async fn call_asset_minted_hook(&self, units: &[OwnedProduct], assets: &[Asset]) {
        for emitter in &self.producers.asset_minted_producer {
            for unit in units {
                let Some(asset) = assets.iter().find(|a| Some(a.token_id) == unit.token_id) else { continue };
                emitter.publish_event(AssetMintedEvent { unit: unit.clone(), asset: asset.clone() }).await;
            }
        }
    }

    async fn call_asset_transferred_hook(&self, units: &[OwnedProduct], assets: &[Asset]) {
        for emitter in &self.producers.asset_transferred_producer {
            for unit in units {
                let Some(asset) = assets.iter().find(|a| Some(a.token_id) == unit.token_id) else { continue };
                emitter.publish_event(AssetTransferredEvent { unit: unit.clone(), asset: asset.clone() }).await;
            }
        }
    }

    async fn record_asset(
        &self,
        chain_id: i64,
        contract: &str,
        token_id: i64,
        attributes: serde_json::Value,
        mint_tx_hash: String,
    ) -> Result<Asset, IssuanceApiError> {
        let asset =
            NewAsset { chain_id, contract_address: contract.to_string(), token_id, attributes, mint_tx_hash };
        match self.db.insert_asset(asset).await {
            Ok(asset) => Ok(asset),
            // A concurrent caller recorded it first. Use theirs.
            Err(PaymentGatewayError::AssetAlreadyExists(..)) => Ok(self
                .db
                .fetch_asset(contract, token_id)
                .await?
                .ok_or_else(|| PaymentGatewayError::AssetNotFound(contract.to_string(), token_id))?),
            Err(e) => Err(e.into()),
        }
    }
}

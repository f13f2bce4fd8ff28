//! In-process fakes for the payment rail and the chain service.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
        Mutex,
    },
};

use crate::{
    db_types::MerchantConfig,
    rail_types::{BankInitResponse, CreditInitResponse},
    traits::{
        BankInitRequest,
        ChainIssuer,
        ChainIssuerError,
        ChainReceipt,
        CreditInitRequest,
        OnChainAsset,
        PaymentRail,
        RailError,
    },
};

/// A scriptable [`PaymentRail`]: either every initiation succeeds with a deterministic reference, or every
/// initiation fails with the configured error.
#[derive(Clone, Default)]
pub struct TestRail {
    failure: Option<RailError>,
    calls: Arc<AtomicUsize>,
}

impl TestRail {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failing(failure: RailError) -> Self {
        Self { failure: Some(failure), calls: Arc::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentRail for TestRail {
    async fn initiate_credit(
        &self,
        _merchant: &MerchantConfig,
        req: CreditInitRequest,
    ) -> Result<CreditInitResponse, RailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(CreditInitResponse { request_id: format!("req-{}", req.order_id.as_str()), redirect_url: None }),
        }
    }

    async fn initiate_bank(
        &self,
        _merchant: &MerchantConfig,
        req: BankInitRequest,
    ) -> Result<BankInitResponse, RailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(BankInitResponse {
                institution_code: "088".to_string(),
                customer_number: "70012345".to_string(),
                confirm_number: format!("vbank-{}", req.order_id.as_str()),
            }),
        }
    }
}

/// An in-memory chain. Tracks minted tokens and owners, rejects duplicate mints the way the real chain does, and
/// can be told to fail its first N mint submissions.
#[derive(Clone, Default)]
pub struct TestChain {
    fail_first: usize,
    minted: Arc<Mutex<HashMap<(String, i64), OnChainAsset>>>,
    mint_calls: Arc<AtomicUsize>,
}

impl TestChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` mint submissions return [`ChainIssuerError::Unreachable`].
    pub fn failing_mints(n: usize) -> Self {
        Self { fail_first: n, ..Self::default() }
    }

    pub fn mint_calls(&self) -> usize {
        self.mint_calls.load(Ordering::SeqCst)
    }
}

impl ChainIssuer for TestChain {
    async fn mint(
        &self,
        contract_address: &str,
        token_id: i64,
        _metadata: &serde_json::Value,
    ) -> Result<ChainReceipt, ChainIssuerError> {
        let call = self.mint_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            return Err(ChainIssuerError::Unreachable("chain node down".to_string()));
        }
        let key = (contract_address.to_string(), token_id);
        let mut minted = self.minted.lock().unwrap();
        if minted.contains_key(&key) {
            return Err(ChainIssuerError::AlreadyMinted(contract_address.to_string(), token_id));
        }
        let tx_hash = format!("0xmint{token_id:08x}");
        minted.insert(key, OnChainAsset { token_id, owner: "treasury".to_string(), tx_hash: tx_hash.clone() });
        Ok(ChainReceipt { tx_hash, confirmed: true })
    }

    async fn transfer(
        &self,
        contract_address: &str,
        token_id: i64,
        to: &str,
    ) -> Result<ChainReceipt, ChainIssuerError> {
        let key = (contract_address.to_string(), token_id);
        let mut minted = self.minted.lock().unwrap();
        match minted.get_mut(&key) {
            Some(asset) => {
                asset.owner = to.to_string();
                Ok(ChainReceipt { tx_hash: format!("0xxfer{token_id:08x}"), confirmed: true })
            },
            None => Err(ChainIssuerError::CallFailed(format!("token {token_id} is not minted"))),
        }
    }

    async fn asset_status(
        &self,
        contract_address: &str,
        token_id: i64,
    ) -> Result<Option<OnChainAsset>, ChainIssuerError> {
        let key = (contract_address.to_string(), token_id);
        Ok(self.minted.lock().unwrap().get(&key).cloned())
    }
}

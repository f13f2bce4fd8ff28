use crate::db_types::{Asset, OwnedProduct, PendingPayment};

/// Emitted when a settlement has been applied to the ledger and the order's units have advanced to `Purchased`.
/// The server hooks this to trigger minting for asset-backed products.
#[derive(Debug, Clone)]
pub struct OrderSettledEvent {
    pub payment: PendingPayment,
    pub units: Vec<OwnedProduct>,
}

impl OrderSettledEvent {
    pub fn new(payment: PendingPayment, units: Vec<OwnedProduct>) -> Self {
        Self { payment, units }
    }
}

/// Emitted when an order attempt was declined, expired or cancelled and its reservation returned to the pool.
#[derive(Debug, Clone)]
pub struct OrderCanceledEvent {
    pub payment: PendingPayment,
    pub reason: String,
}

impl OrderCanceledEvent {
    pub fn new(payment: PendingPayment, reason: impl Into<String>) -> Self {
        Self { payment, reason: reason.into() }
    }
}

#[derive(Debug, Clone)]
pub struct AssetMintedEvent {
    pub unit: OwnedProduct,
    pub asset: Asset,
}

#[derive(Debug, Clone)]
pub struct AssetTransferredEvent {
    pub unit: OwnedProduct,
    pub asset: Asset,
}

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Asset,
        MerchantConfig,
        NewAsset,
        NewPaymentHistory,
        NewPendingPayment,
        OrderId,
        OwnedProduct,
        OwnedProductStatus,
        PaymentHistory,
        PaymentStatus,
        PendingPayment,
        Product,
        Rail,
        ReconciliationException,
    },
    traits::{InsertHistoryResult, TransitionResult},
};

/// This trait defines the highest level of behaviour for backends supporting the payment engine.
///
/// The behaviour covers:
/// * The pending payment ledger (one row per order attempt, CAS-linearized status transitions).
/// * Stock and token-id reservations (atomic decrement/claim, idempotent release).
/// * The fulfilled-unit lifecycle (`OwnedProduct` rows, forward-only).
/// * Webhook deduplication and the operator exception queue.
/// * The append-only payment history archive.
/// * Local asset records mirroring confirmed chain state.
///
/// Each method is individually idempotent or guarded, so flows composed of several calls are safe to partially
/// re-execute after a crash.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    //----------------------------------- Reference data -----------------------------------------

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError>;

    /// Per-town rail credentials. Read-only as far as this subsystem is concerned.
    async fn fetch_merchant_config(&self, town_id: i64) -> Result<Option<MerchantConfig>, PaymentGatewayError>;

    //----------------------------------- Pending payment ledger ---------------------------------

    /// Takes a new order attempt, and in a single atomic transaction:
    /// * decrements the product's stock counter (failing with [`PaymentGatewayError::OutOfStock`] without any
    ///   partial effect if fewer units remain than requested),
    /// * claims token ids from the product's pool for asset-backed products,
    /// * inserts the ledger row with status `Pending`,
    /// * inserts one `OwnedProduct` row per unit in `PendingPayment` status.
    ///
    /// Returns the stored ledger row with the reserved token ids filled in.
    async fn create_pending_order(&self, order: NewPendingPayment) -> Result<PendingPayment, PaymentGatewayError>;

    async fn fetch_pending_payment(&self, order_id: &OrderId) -> Result<Option<PendingPayment>, PaymentGatewayError>;

    /// Looks an attempt up by the rail-side reference stored at initiation time (credit request id or bank confirm
    /// number).
    async fn fetch_pending_payment_by_rail_ref(
        &self,
        rail_ref: &str,
    ) -> Result<Option<PendingPayment>, PaymentGatewayError>;

    /// Atomically transitions the row to `new_status` if and only if its current status is `Pending`. Any other
    /// current status yields [`TransitionResult::Conflict`], which callers treat as "already resolved". The reason
    /// is recorded on the row for audit. Rows are never deleted.
    async fn transition_payment(
        &self,
        order_id: &OrderId,
        new_status: PaymentStatus,
        reason: &str,
    ) -> Result<TransitionResult, PaymentGatewayError>;

    /// Stores the rail-side reference on the ledger row after a successful initiation call.
    async fn set_rail_ref(&self, order_id: &OrderId, rail_ref: &str) -> Result<(), PaymentGatewayError>;

    /// Returns the stock and token ids held by this order to the pool. Idempotent: releasing an order with no
    /// outstanding reservation is a no-op, so the call is safe to repeat after a crash.
    async fn release_reservation(&self, order_id: &OrderId) -> Result<(), PaymentGatewayError>;

    /// Moves the order's reserved token ids to `Issued` once settlement has been applied, so that a later release
    /// (which only touches reserved tokens) can never hand a sold token back to the pool.
    async fn mark_tokens_issued(&self, order_id: &OrderId) -> Result<(), PaymentGatewayError>;

    /// CAS-sweeps every `Pending` row whose term window lies before `now` to `Canceled`, returning the rows that
    /// were expired. Reservations are *not* released here; the caller follows up per row with the usual idempotent
    /// release/cancel/archive steps.
    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> Result<Vec<PendingPayment>, PaymentGatewayError>;

    //----------------------------------- Fulfilled units ----------------------------------------

    async fn fetch_owned_products(&self, order_id: &OrderId) -> Result<Vec<OwnedProduct>, PaymentGatewayError>;

    /// Moves every unit of the order currently in `from` to `to`. Guarded update: units in any other state are left
    /// untouched, which makes the call idempotent and enforces the forward-only lattice. Returns the units that
    /// moved.
    async fn advance_owned_products(
        &self,
        order_id: &OrderId,
        from: OwnedProductStatus,
        to: OwnedProductStatus,
    ) -> Result<Vec<OwnedProduct>, PaymentGatewayError>;

    /// Cancels the order's units. Only units in `PendingPayment` or `Purchased` are touched; minted or transferred
    /// units never revert.
    async fn cancel_owned_products(&self, order_id: &OrderId) -> Result<Vec<OwnedProduct>, PaymentGatewayError>;

    /// Records a failed mint submission against the order's units, for the manual-intervention queue.
    async fn record_mint_attempt(&self, order_id: &OrderId, error: &str) -> Result<(), PaymentGatewayError>;

    /// Units that are settled but stuck: `Purchased` asset units with at least one failed mint attempt.
    async fn fetch_units_awaiting_intervention(&self) -> Result<Vec<OwnedProduct>, PaymentGatewayError>;

    //----------------------------------- Webhook bookkeeping ------------------------------------

    async fn is_push_processed(&self, push_id: &str) -> Result<bool, PaymentGatewayError>;

    /// Records the push id in the processed set. Called only after every item of the batch has been handled, giving
    /// at-least-once outer semantics over individually idempotent inner steps.
    async fn mark_push_processed(
        &self,
        rail: Rail,
        webhook_id: &str,
        push_id: &str,
        push_time: DateTime<Utc>,
    ) -> Result<(), PaymentGatewayError>;

    /// Parks an unresolvable webhook item in the operator queue. Never fails the enclosing batch.
    async fn record_reconciliation_exception(
        &self,
        rail: Rail,
        push_id: &str,
        order_id: Option<&OrderId>,
        reason: &str,
        payload: serde_json::Value,
    ) -> Result<(), PaymentGatewayError>;

    async fn fetch_reconciliation_exceptions(&self) -> Result<Vec<ReconciliationException>, PaymentGatewayError>;

    //----------------------------------- Archive ------------------------------------------------

    /// Appends the resolved attempt to the payment history. Insert-once per order id; a repeat write returns
    /// [`InsertHistoryResult::AlreadyRecorded`] and changes nothing.
    async fn record_payment_history(
        &self,
        history: NewPaymentHistory,
    ) -> Result<InsertHistoryResult, PaymentGatewayError>;

    async fn fetch_payment_history(&self, order_id: &OrderId) -> Result<Option<PaymentHistory>, PaymentGatewayError>;

    //----------------------------------- Assets -------------------------------------------------

    async fn fetch_asset(&self, contract_address: &str, token_id: i64) -> Result<Option<Asset>, PaymentGatewayError>;

    /// Inserts the local record of a confirmed mint. The (contract, token id) pair is unique; inserting a duplicate
    /// returns [`PaymentGatewayError::AssetAlreadyExists`].
    async fn insert_asset(&self, asset: NewAsset) -> Result<Asset, PaymentGatewayError>;

    /// Sets the owner back-reference after a confirmed chain transaction.
    async fn set_asset_owner(
        &self,
        contract_address: &str,
        token_id: i64,
        owner: &str,
    ) -> Result<Asset, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested product {0} does not exist")]
    ProductNotFound(i64),
    #[error("No merchant configuration exists for town {0}")]
    MerchantConfigNotFound(i64),
    #[error("Product {0} does not have enough stock to reserve {1} units")]
    OutOfStock(i64, i64),
    #[error("Asset {1} already exists on contract {0}")]
    AssetAlreadyExists(String, i64),
    #[error("The requested asset (contract {0}, token {1}) does not exist")]
    AssetNotFound(String, i64),
    #[error("The requested order change is forbidden. {0}")]
    OrderModificationForbidden(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

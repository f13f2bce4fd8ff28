//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`PaymentGatewayDatabase`] trait by composing
//! the low-level functions in [`super::db`] inside pool connections or transactions as atomicity demands.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{
    assets,
    db_url,
    merchants,
    new_pool,
    owned_products,
    payment_history,
    pending_payments,
    products,
    webhooks,
};
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
    traits::{InsertHistoryResult, PaymentGatewayDatabase, PaymentGatewayError, TransitionResult},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let product = products::fetch_product(product_id, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_merchant_config(&self, town_id: i64) -> Result<Option<MerchantConfig>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let config = merchants::fetch_merchant_config(town_id, &mut conn).await?;
        Ok(config)
    }

    /// Reservation, ledger insert and unit creation happen in one transaction. If the stock decrement or the token
    /// claim fails, the rollback leaves no trace of the attempt. The stock decrement goes first so the transaction
    /// opens with the write lock rather than a read snapshot it would have to upgrade.
    async fn create_pending_order(&self, order: NewPendingPayment) -> Result<PendingPayment, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let tokens = products::reserve_units(order.product_id, order.amount, &order.order_id, &mut tx).await?;
        let payment = pending_payments::insert_pending_payment(order, &tokens, &mut tx).await?;
        owned_products::insert_units(
            &payment.order_id,
            payment.product_id,
            payment.user_id,
            payment.amount,
            &tokens,
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        debug!("🗃️ Order {} created in the ledger with {} reserved token(s)", payment.order_id, tokens.len());
        Ok(payment)
    }

    async fn fetch_pending_payment(&self, order_id: &OrderId) -> Result<Option<PendingPayment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = pending_payments::fetch_pending_payment(order_id, &mut conn).await?;
        Ok(payment)
    }

    async fn fetch_pending_payment_by_rail_ref(
        &self,
        rail_ref: &str,
    ) -> Result<Option<PendingPayment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let payment = pending_payments::fetch_pending_payment_by_rail_ref(rail_ref, &mut conn).await?;
        Ok(payment)
    }

    async fn transition_payment(
        &self,
        order_id: &OrderId,
        new_status: PaymentStatus,
        reason: &str,
    ) -> Result<TransitionResult, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        pending_payments::transition_payment(order_id, new_status, reason, &mut conn).await
    }

    async fn set_rail_ref(&self, order_id: &OrderId, rail_ref: &str) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        pending_payments::set_rail_ref(order_id, rail_ref, &mut conn).await
    }

    /// The release is guarded by the `reservation_released` flag on the ledger row, claimed and restored in the
    /// same transaction. Repeat calls, including crash-recovery replays, are no-ops. The claim is the
    /// transaction's first statement for the same reason the checkout decrement is: no read snapshot to upgrade.
    async fn release_reservation(&self, order_id: &OrderId) -> Result<(), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if !pending_payments::claim_reservation_release(order_id, &mut tx).await? {
            if pending_payments::fetch_pending_payment(order_id, &mut tx).await?.is_none() {
                return Err(PaymentGatewayError::OrderNotFound(order_id.clone()));
            }
            trace!("🗃️ Reservation for order {order_id} was already released. Nothing to do.");
            return Ok(());
        }
        let payment = pending_payments::fetch_pending_payment(order_id, &mut tx)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        products::restore_reservation(payment.product_id, payment.amount, order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn mark_tokens_issued(&self, order_id: &OrderId) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        products::mark_tokens_issued(order_id, &mut conn).await
    }

    async fn expire_stale_payments(&self, now: DateTime<Utc>) -> Result<Vec<PendingPayment>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        pending_payments::expire_stale_payments(now, &mut conn).await
    }

    async fn fetch_owned_products(&self, order_id: &OrderId) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let units = owned_products::fetch_units(order_id, &mut conn).await?;
        Ok(units)
    }

    async fn advance_owned_products(
        &self,
        order_id: &OrderId,
        from: OwnedProductStatus,
        to: OwnedProductStatus,
    ) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        owned_products::advance_units(order_id, from, to, &mut conn).await
    }

    async fn cancel_owned_products(&self, order_id: &OrderId) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        owned_products::cancel_units(order_id, &mut conn).await
    }

    async fn record_mint_attempt(&self, order_id: &OrderId, error: &str) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        owned_products::record_mint_attempt(order_id, error, &mut conn).await
    }

    async fn fetch_units_awaiting_intervention(&self) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let units = owned_products::fetch_units_awaiting_intervention(&mut conn).await?;
        Ok(units)
    }

    async fn is_push_processed(&self, push_id: &str) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let processed = webhooks::is_push_processed(push_id, &mut conn).await?;
        Ok(processed)
    }

    async fn mark_push_processed(
        &self,
        rail: Rail,
        webhook_id: &str,
        push_id: &str,
        push_time: DateTime<Utc>,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::mark_push_processed(rail, webhook_id, push_id, push_time, &mut conn).await
    }

    async fn record_reconciliation_exception(
        &self,
        rail: Rail,
        push_id: &str,
        order_id: Option<&OrderId>,
        reason: &str,
        payload: serde_json::Value,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::record_exception(rail, push_id, order_id, reason, payload, &mut conn).await
    }

    async fn fetch_reconciliation_exceptions(&self) -> Result<Vec<ReconciliationException>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let rows = webhooks::fetch_exceptions(&mut conn).await?;
        Ok(rows)
    }

    async fn record_payment_history(
        &self,
        history: NewPaymentHistory,
    ) -> Result<InsertHistoryResult, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payment_history::insert_history(history, &mut conn).await
    }

    async fn fetch_payment_history(&self, order_id: &OrderId) -> Result<Option<PaymentHistory>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let row = payment_history::fetch_history(order_id, &mut conn).await?;
        Ok(row)
    }

    async fn fetch_asset(&self, contract_address: &str, token_id: i64) -> Result<Option<Asset>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let asset = assets::fetch_asset(contract_address, token_id, &mut conn).await?;
        Ok(asset)
    }

    async fn insert_asset(&self, asset: NewAsset) -> Result<Asset, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let asset = assets::insert_asset(asset, &mut tx).await?;
        tx.commit().await?;
        Ok(asset)
    }

    async fn set_asset_owner(
        &self,
        contract_address: &str,
        token_id: i64,
        owner: &str,
    ) -> Result<Asset, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        assets::set_asset_owner(contract_address, token_id, owner, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        NewPaymentHistory,
        OrderId,
        OwnedProduct,
        PaymentHistory,
        PaymentStatus,
        PendingPayment,
        ReconciliationException,
    },
    events::{EventProducers, OrderCanceledEvent},
    mpe_api::order_objects::OrderStatusResult,
    traits::{PaymentGatewayDatabase, PaymentGatewayError, TransitionResult},
};

/// `OrderApi` covers the read side (status polls, operator queues) and the operational mutations that are not driven
/// by the rails: support cancellations and the expiry sweep.
pub struct OrderApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderApi")
    }
}

impl<B> OrderApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderApi<B>
where B: PaymentGatewayDatabase
{
    /// The ledger is the single source of truth; status polls are answered from it and never from the rail.
    pub async fn order_status(&self, order_id: &OrderId) -> Result<Option<OrderStatusResult>, PaymentGatewayError> {
        let Some(payment) = self.db.fetch_pending_payment(order_id).await? else {
            return Ok(None);
        };
        let units = self.db.fetch_owned_products(order_id).await?;
        let history = self.db.fetch_payment_history(order_id).await?;
        Ok(Some(OrderStatusResult { payment, units, history }))
    }

    /// Resolves a status poll keyed by the rail-side reference (credit request id or bank confirm number).
    pub async fn order_status_by_rail_ref(&self, rail_ref: &str) -> Result<Option<OrderStatusResult>, PaymentGatewayError> {
        let Some(payment) = self.db.fetch_pending_payment_by_rail_ref(rail_ref).await? else {
            return Ok(None);
        };
        let order_id = payment.order_id.clone();
        self.order_status(&order_id).await
    }

    /// Support-initiated cancellation.
    ///
    /// A `Pending` order is resolved to `Canceled` with the full unwind (release, cancel units, archive). A settled
    /// order can still have its unfulfilled units cancelled, but minted units never revert and the ledger row stays
    /// `Success`; the money side is a refund concern outside this subsystem.
    pub async fn cancel_order(&self, order_id: &OrderId, reason: &str) -> Result<PendingPayment, PaymentGatewayError> {
        let payment = self
            .db
            .fetch_pending_payment(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        match payment.status {
            PaymentStatus::Pending => {
                match self.db.transition_payment(order_id, PaymentStatus::Canceled, reason).await? {
                    TransitionResult::Applied(resolved) => {
                        self.db.release_reservation(order_id).await?;
                        self.db.cancel_owned_products(order_id).await?;
                        self.archive(&resolved, "canceled", serde_json::json!({ "reason": reason })).await?;
                        info!("🚫️ Order {order_id} cancelled: {reason}");
                        self.call_order_canceled_hook(resolved.clone(), reason).await;
                        Ok(resolved)
                    },
                    TransitionResult::Conflict(current) => Err(PaymentGatewayError::OrderModificationForbidden(
                        format!("Order {order_id} has already been resolved to {current}"),
                    )),
                }
            },
            PaymentStatus::Success => {
                let cancelled = self.db.cancel_owned_products(order_id).await?;
                if cancelled.is_empty() {
                    return Err(PaymentGatewayError::OrderModificationForbidden(format!(
                        "Order {order_id} has no cancellable units left; minted units never revert"
                    )));
                }
                info!("🚫️ Cancelled {} fulfilled unit(s) of settled order {order_id}: {reason}", cancelled.len());
                self.call_order_canceled_hook(payment.clone(), reason).await;
                Ok(payment)
            },
            status => Err(PaymentGatewayError::OrderModificationForbidden(format!(
                "Order {order_id} is already {status}"
            ))),
        }
    }

    /// Cancels every pending order whose term window has lapsed, returning its stock and tokens to the pool. The
    /// sweep shares the ledger's compare-and-set with the reconciler, so a settlement racing the sweep is decided by
    /// whoever lands first and the loser becomes a no-op.
    pub async fn expire_stale_orders(&self, now: DateTime<Utc>) -> Result<Vec<PendingPayment>, PaymentGatewayError> {
        let expired = self.db.expire_stale_payments(now).await?;
        for payment in &expired {
            let order_id = &payment.order_id;
            self.db.release_reservation(order_id).await?;
            self.db.cancel_owned_products(order_id).await?;
            self.archive(payment, "expired", serde_json::json!({ "reason": "term window expired" })).await?;
            self.call_order_canceled_hook(payment.clone(), "term window expired").await;
        }
        if !expired.is_empty() {
            info!("⏲️ Expired {} stale order(s)", expired.len());
        }
        Ok(expired)
    }

    pub async fn payment_history(&self, order_id: &OrderId) -> Result<Option<PaymentHistory>, PaymentGatewayError> {
        self.db.fetch_payment_history(order_id).await
    }

    /// The operator queue of webhook items that could not be applied.
    pub async fn reconciliation_exceptions(&self) -> Result<Vec<ReconciliationException>, PaymentGatewayError> {
        self.db.fetch_reconciliation_exceptions().await
    }

    /// Settled units whose minting has failed and needs a human.
    pub async fn units_awaiting_intervention(&self) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
        self.db.fetch_units_awaiting_intervention().await
    }

    async fn archive(
        &self,
        payment: &PendingPayment,
        status_code: &str,
        raw: serde_json::Value,
    ) -> Result<(), PaymentGatewayError> {
        let town_id = self.db.fetch_product(payment.product_id).await?.map(|p| p.town_id).unwrap_or_default();
        let history = NewPaymentHistory::from_resolved(payment, town_id, status_code, raw);
        self.db.record_payment_history(history).await?;
        Ok(())
    }

    async fn call_order_canceled_hook(&self, payment: PendingPayment, reason: &str) {
        for emitter in &self.producers.order_canceled_producer {
            emitter.publish_event(OrderCanceledEvent::new(payment.clone(), reason)).await;
        }
    }
}

use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewPaymentHistory, OwnedProduct, OwnedProductStatus, PaymentStatus, PendingPayment, Rail},
    events::{EventProducers, OrderCanceledEvent, OrderSettledEvent},
    mpe_api::order_objects::BatchSummary,
    rail_types::{BankWebhookItem, CreditWebhookItem, SettlementOutcome, WebhookBatch},
    traits::{InsertHistoryResult, PaymentGatewayDatabase, PaymentGatewayError, TransitionResult},
};

/// `ReconcilerApi` applies settlement notifications from the rails to the ledger.
///
/// Batches are deduplicated by push id: the id is recorded only after every item has been handled, so a crash
/// mid-batch causes a redelivery whose items all land on the ledger's compare-and-set and resolve as duplicates.
/// A single bad item never fails its batch; it is counted and, where an operator needs to look, parked in the
/// exception queue.
pub struct ReconcilerApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> ReconcilerApi<B>
where B: PaymentGatewayDatabase
{
    pub async fn process_credit_batch(
        &self,
        batch: &WebhookBatch<CreditWebhookItem>,
    ) -> Result<BatchSummary, PaymentGatewayError> {
        if self.db.is_push_processed(&batch.push_id).await? {
            info!("🔁️ Credit push {} has already been processed. Acknowledging without effect.", batch.push_id);
            return Ok(BatchSummary::replay());
        }
        let mut summary = BatchSummary::default();
        for item in &batch.items {
            let raw = serde_json::to_value(item).unwrap_or(serde_json::Value::Null);
            let Some(payment) = self.db.fetch_pending_payment(&item.order_id).await? else {
                warn!("🔁️ Credit push {} references unknown order {}", batch.push_id, item.order_id);
                self.db
                    .record_reconciliation_exception(
                        Rail::Credit,
                        &batch.push_id,
                        Some(&item.order_id),
                        "unknown order id",
                        raw,
                    )
                    .await?;
                summary.unknown += 1;
                continue;
            };
            self.apply_outcome(Rail::Credit, &batch.push_id, payment, item.outcome(), &item.status_code(), raw, &mut summary)
                .await?;
        }
        self.db.mark_push_processed(Rail::Credit, &batch.webhook_id, &batch.push_id, batch.push_time).await?;
        info!("🔁️ Credit push {} processed: {summary}", batch.push_id);
        Ok(summary)
    }

    pub async fn process_bank_batch(
        &self,
        batch: &WebhookBatch<BankWebhookItem>,
    ) -> Result<BatchSummary, PaymentGatewayError> {
        if self.db.is_push_processed(&batch.push_id).await? {
            info!("🔁️ Bank push {} has already been processed. Acknowledging without effect.", batch.push_id);
            return Ok(BatchSummary::replay());
        }
        let mut summary = BatchSummary::default();
        for item in &batch.items {
            let raw = serde_json::to_value(item).unwrap_or(serde_json::Value::Null);
            let Some(payment) = self.db.fetch_pending_payment(&item.order_id).await? else {
                warn!("🔁️ Bank push {} references unknown order {}", batch.push_id, item.order_id);
                self.db
                    .record_reconciliation_exception(
                        Rail::Bank,
                        &batch.push_id,
                        Some(&item.order_id),
                        "unknown order id",
                        raw,
                    )
                    .await?;
                summary.unknown += 1;
                continue;
            };
            // The expected amount comes from the ledger, never from the notification itself.
            let outcome = item.outcome(payment.price);
            self.apply_outcome(Rail::Bank, &batch.push_id, payment, outcome, &item.status_code(), raw, &mut summary)
                .await?;
        }
        self.db.mark_push_processed(Rail::Bank, &batch.webhook_id, &batch.push_id, batch.push_time).await?;
        info!("🔁️ Bank push {} processed: {summary}", batch.push_id);
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_outcome(
        &self,
        rail: Rail,
        push_id: &str,
        payment: PendingPayment,
        outcome: SettlementOutcome,
        status_code: &str,
        raw: serde_json::Value,
        summary: &mut BatchSummary,
    ) -> Result<(), PaymentGatewayError> {
        let order_id = payment.order_id.clone();
        match outcome {
            SettlementOutcome::Ambiguous => {
                warn!("🔁️ {rail} item for order {order_id} is ambiguous (code {status_code}). Parking it for an operator.");
                self.db
                    .record_reconciliation_exception(rail, push_id, Some(&order_id), "ambiguous settlement result", raw)
                    .await?;
                summary.ambiguous += 1;
            },
            SettlementOutcome::Settled => {
                match self.db.transition_payment(&order_id, PaymentStatus::Success, "settled by rail notification").await? {
                    TransitionResult::Conflict(current) => {
                        if current == PaymentStatus::Success {
                            // An earlier delivery won the CAS but may have crashed before finishing. Every
                            // follow-up is guarded, so completing them on the replay is a no-op when it didn't.
                            self.db
                                .advance_owned_products(
                                    &order_id,
                                    OwnedProductStatus::PendingPayment,
                                    OwnedProductStatus::Purchased,
                                )
                                .await?;
                            self.db.mark_tokens_issued(&order_id).await?;
                            self.archive(&payment, status_code, raw).await?;
                        }
                        debug!("🔁️ Order {order_id} was already {current}. Duplicate notification ignored.");
                        summary.duplicates += 1;
                    },
                    TransitionResult::Applied(resolved) => {
                        let units = self
                            .db
                            .advance_owned_products(&order_id, OwnedProductStatus::PendingPayment, OwnedProductStatus::Purchased)
                            .await?;
                        self.db.mark_tokens_issued(&order_id).await?;
                        self.archive(&resolved, status_code, raw).await?;
                        info!("🔁️ Order {order_id} settled on the {rail} rail. {} unit(s) purchased.", units.len());
                        self.call_order_settled_hook(resolved, units).await;
                        summary.settled += 1;
                    },
                }
            },
            SettlementOutcome::Declined => {
                let reason = format!("declined by rail (code {status_code})");
                match self.db.transition_payment(&order_id, PaymentStatus::Failed, &reason).await? {
                    TransitionResult::Conflict(current) => {
                        if current == PaymentStatus::Failed {
                            // Same crash-recovery contract as the settled arm: finish what the winner started.
                            self.db.release_reservation(&order_id).await?;
                            self.db.cancel_owned_products(&order_id).await?;
                            self.archive(&payment, status_code, raw).await?;
                        }
                        debug!("🔁️ Order {order_id} was already {current}. Duplicate notification ignored.");
                        summary.duplicates += 1;
                    },
                    TransitionResult::Applied(resolved) => {
                        self.db.release_reservation(&order_id).await?;
                        self.db.cancel_owned_products(&order_id).await?;
                        self.archive(&resolved, status_code, raw).await?;
                        info!("🔁️ Order {order_id} declined on the {rail} rail. Reservation released.");
                        self.call_order_canceled_hook(resolved, &reason).await;
                        summary.declined += 1;
                    },
                }
            },
        }
        Ok(())
    }

    async fn archive(
        &self,
        payment: &PendingPayment,
        status_code: &str,
        raw: serde_json::Value,
    ) -> Result<(), PaymentGatewayError> {
        let town_id = match self.db.fetch_product(payment.product_id).await? {
            Some(p) => p.town_id,
            None => {
                error!("🔁️ Product {} behind order {} has vanished. Archiving with town 0.", payment.product_id, payment.order_id);
                0
            },
        };
        let history = NewPaymentHistory::from_resolved(payment, town_id, status_code, raw);
        match self.db.record_payment_history(history).await? {
            InsertHistoryResult::Inserted => trace!("🔁️ Archived order {}", payment.order_id),
            InsertHistoryResult::AlreadyRecorded => {
                debug!("🔁️ History for order {} was already recorded", payment.order_id)
            },
        }
        Ok(())
    }

    async fn call_order_settled_hook(&self, payment: PendingPayment, units: Vec<OwnedProduct>) {
        for emitter in &self.producers.order_settled_producer {
            debug!("🔁️ Notifying order settled hook subscribers");
            emitter.publish_event(OrderSettledEvent::new(payment.clone(), units.clone())).await;
        }
    }

    async fn call_order_canceled_hook(&self, payment: PendingPayment, reason: &str) {
        for emitter in &self.producers.order_canceled_producer {
            emitter.publish_event(OrderCanceledEvent::new(payment.clone(), reason)).await;
        }
    }
}

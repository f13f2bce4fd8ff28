use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::{NewPaymentHistory, NewPendingPayment, PaymentStatus, PendingPayment, Product, Rail},
    events::{EventProducers, OrderCanceledEvent},
    helpers::generate_order_id,
    mpe_api::{
        errors::CheckoutApiError,
        order_objects::{CheckoutReceipt, CheckoutRequest, PaymentInstrument, RailReceipt},
    },
    traits::{
        BankInitRequest,
        CreditInitRequest,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        PaymentRail,
        RailError,
        TransitionResult,
    },
};

/// `CheckoutApi` turns a storefront purchase request into a durable order attempt.
///
/// The sequencing is deliberate: the reservation and the ledger row commit atomically *before* the rail is called,
/// and a failed rail call rolls the whole attempt back (release, cancel units, resolve the ledger row to `Failed`,
/// archive). The rail is never called while the stock claim is still speculative.
pub struct CheckoutApi<B, R> {
    db: B,
    rail: R,
    producers: EventProducers,
    credit_term: Duration,
    bank_term: Duration,
}

impl<B, R> Debug for CheckoutApi<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, R> CheckoutApi<B, R> {
    pub fn new(db: B, rail: R, producers: EventProducers) -> Self {
        Self { db, rail, producers, credit_term: Duration::minutes(30), bank_term: Duration::hours(72) }
    }

    /// Overrides the default term windows (30 minutes for credit, 72 hours for bank deposits).
    pub fn with_term_windows(mut self, credit: Duration, bank: Duration) -> Self {
        self.credit_term = credit;
        self.bank_term = bank;
        self
    }
}

impl<B, R> CheckoutApi<B, R>
where
    B: PaymentGatewayDatabase,
    R: PaymentRail,
{
    pub async fn checkout(&self, req: CheckoutRequest) -> Result<CheckoutReceipt, CheckoutApiError> {
        if req.amount <= 0 {
            return Err(CheckoutApiError::InvalidRequest(format!("amount must be positive, got {}", req.amount)));
        }
        if req.email.trim().is_empty() {
            return Err(CheckoutApiError::InvalidRequest("an email address is required".to_string()));
        }
        let product = self
            .db
            .fetch_product(req.product_id)
            .await?
            .ok_or(PaymentGatewayError::ProductNotFound(req.product_id))?;
        let authoritative = product
            .unit_price
            .checked_mul(req.amount)
            .ok_or_else(|| CheckoutApiError::InvalidRequest(format!("quantity {} overflows the total", req.amount)))?;
        if req.expected_price != authoritative {
            return Err(CheckoutApiError::InvalidRequest(format!(
                "price mismatch: client sent {}, catalogue says {authoritative}",
                req.expected_price
            )));
        }
        let merchant = self
            .db
            .fetch_merchant_config(product.town_id)
            .await?
            .ok_or(PaymentGatewayError::MerchantConfigNotFound(product.town_id))?;
        let rail = req.instrument.rail();
        let order_id = req.order_id.clone().unwrap_or_else(generate_order_id);
        let deadline = Utc::now() +
            match rail {
                Rail::Credit => self.credit_term,
                Rail::Bank => self.bank_term,
            };
        let mut order = NewPendingPayment::new(order_id.clone(), req.user_id, &product, req.amount, rail)
            .with_contact(&req.email, req.billing_info.clone())
            .with_term_window(deadline);
        if let Some(affiliate_ref) = &req.affiliate_ref {
            order = order.with_affiliate_ref(affiliate_ref);
        }
        let payment = self.db.create_pending_order(order).await?;
        debug!("🛒️ Order {order_id} created with {} unit(s) reserved", payment.amount);
        let receipt = match &req.instrument {
            PaymentInstrument::Credit { card_token } => {
                let init = CreditInitRequest {
                    order_id: order_id.clone(),
                    price: payment.price,
                    card_token: card_token.clone(),
                    email: req.email.clone(),
                };
                self.rail.initiate_credit(&merchant, init).await.map(RailReceipt::Credit)
            },
            PaymentInstrument::Bank { payer_name } => {
                let init = BankInitRequest {
                    order_id: order_id.clone(),
                    price: payment.price,
                    payer_name: payer_name.clone(),
                    email: req.email.clone(),
                };
                self.rail.initiate_bank(&merchant, init).await.map(RailReceipt::Bank)
            },
        };
        match receipt {
            Ok(receipt) => {
                self.db.set_rail_ref(&order_id, receipt.rail_ref()).await?;
                info!("🛒️ Checkout for order {order_id} initiated on the {rail} rail (ref {})", receipt.rail_ref());
                Ok(CheckoutReceipt { payment, rail: receipt })
            },
            Err(e) => {
                warn!("🛒️ Rail initiation for order {order_id} failed ({e}). Rolling the reservation back.");
                self.abandon_checkout(&payment, &product, &e).await?;
                Err(CheckoutApiError::RailFailure(e))
            },
        }
    }

    /// Unwinds an attempt whose rail initiation failed. Every step is individually idempotent, so a crash halfway
    /// through leaves nothing worse than an attempt the expiry sweep will finish unwinding later.
    async fn abandon_checkout(
        &self,
        payment: &PendingPayment,
        product: &Product,
        cause: &RailError,
    ) -> Result<(), PaymentGatewayError> {
        let order_id = &payment.order_id;
        let result = self
            .db
            .transition_payment(order_id, PaymentStatus::Failed, &format!("rail initiation failed: {cause}"))
            .await?;
        match result {
            TransitionResult::Applied(resolved) => {
                self.db.release_reservation(order_id).await?;
                self.db.cancel_owned_products(order_id).await?;
                let raw = serde_json::json!({ "error": cause.to_string() });
                let history = NewPaymentHistory::from_resolved(&resolved, product.town_id, "init_failed", raw);
                self.db.record_payment_history(history).await?;
                self.call_order_canceled_hook(resolved, "rail initiation failed").await;
            },
            // The order resolved (a webhook landed) while the rail call was in flight. The winner already owns the
            // reservation and the units; touching either here would unwind a settled order.
            TransitionResult::Conflict(status) => {
                info!("🛒️ Order {order_id} already resolved to {status} during rail initiation. Leaving it as-is.");
            },
        }
        Ok(())
    }

    async fn call_order_canceled_hook(&self, payment: PendingPayment, reason: &str) {
        for emitter in &self.producers.order_canceled_producer {
            emitter.publish_event(OrderCanceledEvent::new(payment.clone(), reason)).await;
        }
    }
}

//! Event hook wiring: settlement fires the hook exactly once, replays stay silent.
use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use chrono::Utc;
use futures_util::FutureExt;
use log::*;
use market_payment_engine::{
    db_types::{BillingInfo, OrderId, ProductKind},
    events::{EventHandlers, EventHooks},
    mpe_api::{CheckoutRequest, PaymentInstrument},
    rail_types::{CreditWebhookItem, WebhookBatch},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path, seed},
        TestRail,
    },
    CheckoutApi,
    ReconcilerApi,
    SqliteDatabase,
};
use mps_common::Money;

#[derive(Default, Clone)]
struct HookCalled {
    called: Arc<AtomicI32>,
}

impl HookCalled {
    pub fn called(&self) {
        let _ = self.called.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> i32 {
        self.called.load(Ordering::Relaxed)
    }
}

#[tokio::test]
async fn settled_hook_fires_once() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(12_000), 2).await;
    seed::merchant(db.pool(), 1).await;

    let event = HookCalled::default();
    let event_copy = event.clone();
    let mut hooks = EventHooks::default();
    hooks.on_order_settled(move |ev| {
        info!("🪝️ Order {} settled", ev.payment.order_id);
        event_copy.called();
        async {}.boxed()
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), producers.clone());
    let reconciler = ReconcilerApi::new(db.clone(), producers);
    let req = CheckoutRequest {
        order_id: Some(OrderId::from("ord-hook".to_string())),
        user_id: 3,
        product_id,
        amount: 1,
        expected_price: Money::from(12_000),
        email: "buyer@example.com".to_string(),
        billing_info: BillingInfo { name: "Choi".to_string(), phone: "010-2222-3333".to_string(), ..Default::default() },
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok-h".to_string() },
    };
    checkout.checkout(req).await.expect("Checkout failed");

    let batch = |push_id: &str| WebhookBatch {
        webhook_id: "wh".to_string(),
        push_id: push_id.to_string(),
        push_time: Utc::now(),
        items: vec![CreditWebhookItem {
            order_id: OrderId::from("ord-hook".to_string()),
            request_id: "req-hook".to_string(),
            result_code: "0000".to_string(),
            tx_type: "10".to_string(),
            card_status: "00".to_string(),
            amount: Money::from(12_000),
        }],
    };
    reconciler.process_credit_batch(&batch("push-h1")).await.unwrap();
    // Replays and CAS duplicates must not re-fire the hook.
    reconciler.process_credit_batch(&batch("push-h1")).await.unwrap();
    reconciler.process_credit_batch(&batch("push-h2")).await.unwrap();

    // Drop the producers so the handler drains and exits, then give it a beat.
    drop(checkout);
    drop(reconciler);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(event.count(), 1);
}

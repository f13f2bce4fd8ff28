//! Races on the stock counter and the ledger compare-and-set.
use chrono::{Duration, Utc};
use market_payment_engine::{
    db_types::{BillingInfo, OrderId, PaymentStatus, ProductKind},
    events::EventProducers,
    mpe_api::{CheckoutApiError, CheckoutRequest, PaymentInstrument},
    rail_types::{CreditWebhookItem, WebhookBatch},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path, seed},
        TestRail,
    },
    CheckoutApi,
    OrderApi,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    ReconcilerApi,
    SqliteDatabase,
};
use mps_common::Money;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

fn request(order_id: &str, product_id: i64, price: Money) -> CheckoutRequest {
    CheckoutRequest {
        order_id: Some(OrderId::from(order_id.to_string())),
        user_id: 7,
        product_id,
        amount: 1,
        expected_price: price,
        email: "buyer@example.com".to_string(),
        billing_info: BillingInfo { name: "Lee".to_string(), phone: "010-0000-0000".to_string(), ..Default::default() },
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok-r".to_string() },
    }
}

fn settled_batch(push_id: &str, order_id: &str, amount: Money) -> WebhookBatch<CreditWebhookItem> {
    WebhookBatch {
        webhook_id: "wh-credit-1".to_string(),
        push_id: push_id.to_string(),
        push_time: Utc::now(),
        items: vec![CreditWebhookItem {
            order_id: OrderId::from(order_id.to_string()),
            request_id: format!("req-{order_id}"),
            result_code: "0000".to_string(),
            tx_type: "10".to_string(),
            card_status: "00".to_string(),
            amount,
        }],
    }
}

#[tokio::test]
async fn last_unit_has_exactly_one_winner() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Asset, Money::from(50_000), 1).await;
    seed::tokens(db.pool(), product_id, &[901]).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());

    let (a, b) = tokio::join!(
        checkout.checkout(request("ord-race-a", product_id, Money::from(50_000))),
        checkout.checkout(request("ord-race-b", product_id, Money::from(50_000))),
    );
    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one checkout may claim the last unit");
    let loser = if a.is_err() { a } else { b };
    let err = loser.expect_err("one side lost");
    assert!(matches!(err, CheckoutApiError::Backend(PaymentGatewayError::OutOfStock(_, _))));
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
async fn duplicate_pushes_settle_exactly_once() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(9_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());

    checkout.checkout(request("ord-dup", product_id, Money::from(9_000))).await.unwrap();
    // Same notification delivered twice under different push ids, concurrently.
    let first = settled_batch("push-x", "ord-dup", Money::from(9_000));
    let second = settled_batch("push-y", "ord-dup", Money::from(9_000));
    let (s1, s2) = tokio::join!(reconciler.process_credit_batch(&first), reconciler.process_credit_batch(&second));
    let (s1, s2) = (s1.unwrap(), s2.unwrap());
    assert_eq!(s1.settled + s2.settled, 1, "only one delivery may win the CAS");
    assert_eq!(s1.duplicates + s2.duplicates, 1);
    let payment = db.fetch_pending_payment(&OrderId::from("ord-dup".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert!(db.fetch_payment_history(&payment.order_id).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_loses_to_a_settlement_that_landed_first() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(9_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default())
        .with_term_windows(Duration::seconds(-5), Duration::hours(72));
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    checkout.checkout(request("ord-lapse", product_id, Money::from(9_000))).await.unwrap();
    let summary =
        reconciler.process_credit_batch(&settled_batch("push-s", "ord-lapse", Money::from(9_000))).await.unwrap();
    assert_eq!(summary.settled, 1);

    // The term window has lapsed, but the row is no longer Pending so the sweep must not touch it.
    let expired = orders.expire_stale_orders(Utc::now()).await.unwrap();
    assert!(expired.is_empty());
    let payment = db.fetch_pending_payment(&OrderId::from("ord-lapse".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 2, "settled stock stays claimed");
}

#[tokio::test]
async fn settlement_loses_to_a_sweep_that_landed_first() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(9_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default())
        .with_term_windows(Duration::seconds(-5), Duration::hours(72));
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    checkout.checkout(request("ord-late", product_id, Money::from(9_000))).await.unwrap();
    assert_eq!(orders.expire_stale_orders(Utc::now()).await.unwrap().len(), 1);

    let summary =
        reconciler.process_credit_batch(&settled_batch("push-l", "ord-late", Money::from(9_000))).await.unwrap();
    assert_eq!(summary.duplicates, 1, "the late settlement resolves as a duplicate");
    let payment = db.fetch_pending_payment(&OrderId::from("ord-late".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Canceled);
    // The archive keeps the sweep's record; the insert-once guard swallowed the late write.
    let history = db.fetch_payment_history(&payment.order_id).await.unwrap().unwrap();
    assert_eq!(history.status_code, "expired");
}

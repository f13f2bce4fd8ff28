//! End-to-end checkout and reconciliation flows against a real SQLite backend.
use chrono::{Duration, Utc};
use market_payment_engine::{
    db_types::{BillingInfo, MerchantConfig, OrderId, OwnedProductStatus, PaymentStatus, ProductKind},
    events::EventProducers,
    mpe_api::{CheckoutApiError, CheckoutRequest, PaymentInstrument},
    rail_types::{BankInitResponse, BankWebhookItem, CreditInitResponse, CreditWebhookItem, WebhookBatch},
    traits::{BankInitRequest, CreditInitRequest, PaymentRail, RailError},
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

fn billing() -> BillingInfo {
    BillingInfo { name: "Kim Jiwoo".to_string(), phone: "010-1234-5678".to_string(), ..Default::default() }
}

fn credit_request(order_id: &str, product_id: i64, amount: i64, expected_price: Money) -> CheckoutRequest {
    CheckoutRequest {
        order_id: Some(OrderId::from(order_id.to_string())),
        user_id: 42,
        product_id,
        amount,
        expected_price,
        email: "buyer@example.com".to_string(),
        billing_info: billing(),
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok-abc".to_string() },
    }
}

fn credit_batch(push_id: &str, items: Vec<CreditWebhookItem>) -> WebhookBatch<CreditWebhookItem> {
    WebhookBatch { webhook_id: "wh-credit-1".to_string(), push_id: push_id.to_string(), push_time: Utc::now(), items }
}

fn settled_item(order_id: &str, amount: Money) -> CreditWebhookItem {
    CreditWebhookItem {
        order_id: OrderId::from(order_id.to_string()),
        request_id: format!("req-{order_id}"),
        result_code: "0000".to_string(),
        tx_type: "10".to_string(),
        card_status: "00".to_string(),
        amount,
    }
}

#[tokio::test]
async fn checkout_settle_and_archive() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 5).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    let receipt = checkout
        .checkout(credit_request("ord-1001", product_id, 2, Money::from(20_000)))
        .await
        .expect("Checkout failed");
    assert_eq!(receipt.payment.status, PaymentStatus::Pending);
    assert_eq!(receipt.payment.price, Money::from(20_000));
    assert_eq!(receipt.rail.rail_ref(), "req-ord-1001");
    let product = db.fetch_product(product_id).await.unwrap().unwrap();
    assert_eq!(product.stock, 3);

    let summary = reconciler
        .process_credit_batch(&credit_batch("push-1", vec![settled_item("ord-1001", Money::from(20_000))]))
        .await
        .expect("Batch failed");
    assert_eq!(summary.settled, 1);

    let status = orders.order_status(&OrderId::from("ord-1001".to_string())).await.unwrap().unwrap();
    assert_eq!(status.payment.status, PaymentStatus::Success);
    assert_eq!(status.units.len(), 2);
    assert!(status.units.iter().all(|u| u.status == OwnedProductStatus::Purchased));
    let history = status.history.expect("History should be archived");
    assert_eq!(history.status_code, "0000/00");

    // Replay of the same push id is acknowledged without effect.
    let replay = reconciler
        .process_credit_batch(&credit_batch("push-1", vec![settled_item("ord-1001", Money::from(20_000))]))
        .await
        .unwrap();
    assert!(replay.replay);
    assert_eq!(replay.settled, 0);

    // A different push carrying the same item lands on the ledger CAS and resolves as a duplicate.
    let dup = reconciler
        .process_credit_batch(&credit_batch("push-2", vec![settled_item("ord-1001", Money::from(20_000))]))
        .await
        .unwrap();
    assert_eq!(dup.duplicates, 1);
    assert_eq!(dup.settled, 0);
}

#[tokio::test]
async fn decline_releases_the_reservation() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(5_000), 2).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());

    checkout.checkout(credit_request("ord-2001", product_id, 2, Money::from(10_000))).await.unwrap();
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 0);

    let mut item = settled_item("ord-2001", Money::from(10_000));
    item.result_code = "2013".to_string();
    let summary = reconciler.process_credit_batch(&credit_batch("push-d1", vec![item])).await.unwrap();
    assert_eq!(summary.declined, 1);

    let payment = db.fetch_pending_payment(&OrderId::from("ord-2001".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 2);
    let units = db.fetch_owned_products(&payment.order_id).await.unwrap();
    assert!(units.iter().all(|u| u.status == OwnedProductStatus::Canceled));
}

#[tokio::test]
async fn ambiguous_results_never_settle() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(5_000), 2).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    checkout.checkout(credit_request("ord-3001", product_id, 1, Money::from(5_000))).await.unwrap();
    let mut item = settled_item("ord-3001", Money::from(5_000));
    item.result_code = "9999".to_string();
    let summary = reconciler.process_credit_batch(&credit_batch("push-a1", vec![item])).await.unwrap();
    assert_eq!(summary.ambiguous, 1);
    assert_eq!(summary.settled, 0);

    let payment = db.fetch_pending_payment(&OrderId::from("ord-3001".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    let exceptions = orders.reconciliation_exceptions().await.unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].reason, "ambiguous settlement result");
}

#[tokio::test]
async fn unknown_orders_are_parked_for_an_operator() {
    let db = setup().await;
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let summary = reconciler
        .process_credit_batch(&credit_batch("push-u1", vec![settled_item("ord-nope", Money::from(1_000))]))
        .await
        .unwrap();
    assert_eq!(summary.unknown, 1);
    let exceptions = db.fetch_reconciliation_exceptions().await.unwrap();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].order_id, Some(OrderId::from("ord-nope".to_string())));
}

#[tokio::test]
async fn bank_deposits_settle_only_on_exact_amounts() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 2, ProductKind::Physical, Money::from(30_000), 4).await;
    seed::merchant(db.pool(), 2).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());

    let make_request = |order_id: &str| CheckoutRequest {
        instrument: PaymentInstrument::Bank { payer_name: "Kim Jiwoo".to_string() },
        ..credit_request(order_id, product_id, 1, Money::from(30_000))
    };
    let receipt = checkout.checkout(make_request("ord-4001")).await.unwrap();
    assert_eq!(receipt.rail.rail_ref(), "vbank-ord-4001");
    checkout.checkout(make_request("ord-4002")).await.unwrap();

    let short_deposit = BankWebhookItem {
        order_id: OrderId::from("ord-4001".to_string()),
        receipt_date: Utc::now(),
        amount: Money::from(29_000),
        paid_flag: "Y".to_string(),
    };
    let full_deposit = BankWebhookItem {
        order_id: OrderId::from("ord-4002".to_string()),
        receipt_date: Utc::now(),
        amount: Money::from(30_000),
        paid_flag: "Y".to_string(),
    };
    let batch = WebhookBatch {
        webhook_id: "wh-bank-1".to_string(),
        push_id: "push-b1".to_string(),
        push_time: Utc::now(),
        items: vec![short_deposit, full_deposit],
    };
    let summary = reconciler.process_bank_batch(&batch).await.unwrap();
    assert_eq!(summary.settled, 1);
    assert_eq!(summary.ambiguous, 1);

    let short = db.fetch_pending_payment(&OrderId::from("ord-4001".to_string())).await.unwrap().unwrap();
    assert_eq!(short.status, PaymentStatus::Pending);
    let full = db.fetch_pending_payment(&OrderId::from("ord-4002".to_string())).await.unwrap().unwrap();
    assert_eq!(full.status, PaymentStatus::Success);
}

#[tokio::test]
async fn price_mismatches_are_refused_before_reserving() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());

    let err = checkout
        .checkout(credit_request("ord-5001", product_id, 2, Money::from(15_000)))
        .await
        .expect_err("Mismatched price must be refused");
    assert!(matches!(err, CheckoutApiError::InvalidRequest(_)));
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 3);
    assert!(db.fetch_pending_payment(&OrderId::from("ord-5001".to_string())).await.unwrap().is_none());
}

#[tokio::test]
async fn rail_failure_rolls_the_attempt_back() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let rail = TestRail::failing(market_payment_engine::traits::RailError::Unreachable("gateway down".to_string()));
    let checkout = CheckoutApi::new(db.clone(), rail, EventProducers::default());

    let err = checkout
        .checkout(credit_request("ord-6001", product_id, 1, Money::from(10_000)))
        .await
        .expect_err("Checkout must fail when the rail is down");
    assert!(err.is_retryable());

    let payment = db.fetch_pending_payment(&OrderId::from("ord-6001".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 3);
    let history = db.fetch_payment_history(&payment.order_id).await.unwrap().unwrap();
    assert_eq!(history.status_code, "init_failed");
}

#[tokio::test]
async fn expiry_sweep_cancels_lapsed_orders() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    // A negative term window puts the deadline in the past as soon as the order is created.
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default())
        .with_term_windows(Duration::seconds(-5), Duration::hours(72));
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    checkout.checkout(credit_request("ord-7001", product_id, 2, Money::from(20_000))).await.unwrap();
    let expired = orders.expire_stale_orders(Utc::now()).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, OrderId::from("ord-7001".to_string()));

    let payment = db.fetch_pending_payment(&OrderId::from("ord-7001".to_string())).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Canceled);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 3);
    let history = db.fetch_payment_history(&payment.order_id).await.unwrap().unwrap();
    assert_eq!(history.status_code, "expired");

    // Nothing left to sweep.
    assert!(orders.expire_stale_orders(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn support_can_cancel_a_pending_order_once() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let orders = OrderApi::new(db.clone(), EventProducers::default());

    checkout.checkout(credit_request("ord-8001", product_id, 1, Money::from(10_000))).await.unwrap();
    let cancelled = orders.cancel_order(&OrderId::from("ord-8001".to_string()), "customer request").await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Canceled);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 3);

    let err = orders
        .cancel_order(&OrderId::from("ord-8001".to_string()), "again")
        .await
        .expect_err("Second cancellation must be refused");
    assert!(matches!(err, PaymentGatewayError::OrderModificationForbidden(_)));
}

/// A rail whose initiation call is overtaken by its own settlement webhook before the (lost) response surfaces
/// as a failure.
#[derive(Clone)]
struct OvertakenRail {
    db: SqliteDatabase,
}

impl PaymentRail for OvertakenRail {
    async fn initiate_credit(
        &self,
        _merchant: &MerchantConfig,
        req: CreditInitRequest,
    ) -> Result<CreditInitResponse, RailError> {
        let reconciler = ReconcilerApi::new(self.db.clone(), EventProducers::default());
        let batch = credit_batch("push-overtaken", vec![settled_item(req.order_id.as_str(), req.price)]);
        reconciler.process_credit_batch(&batch).await.map_err(|e| RailError::MalformedResponse(e.to_string()))?;
        Err(RailError::Unreachable("initiation response lost".to_string()))
    }

    async fn initiate_bank(
        &self,
        _merchant: &MerchantConfig,
        _req: BankInitRequest,
    ) -> Result<BankInitResponse, RailError> {
        Err(RailError::Unreachable("unused".to_string()))
    }
}

#[tokio::test]
async fn lost_initiation_response_does_not_unwind_a_settled_order() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), OvertakenRail { db: db.clone() }, EventProducers::default());

    let err = checkout
        .checkout(credit_request("ord-9001", product_id, 1, Money::from(10_000)))
        .await
        .expect_err("The lost response still surfaces as a rail failure");
    assert!(matches!(err, CheckoutApiError::RailFailure(_)));

    // The settlement won the ledger CAS, so the rollback must not touch the reservation or the units.
    let order_id = OrderId::from("ord-9001".to_string());
    let payment = db.fetch_pending_payment(&order_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 2, "paid stock stays claimed");
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert!(units.iter().all(|u| u.status == OwnedProductStatus::Purchased));
    assert_eq!(db.fetch_payment_history(&order_id).await.unwrap().unwrap().status_code, "0000/00");
}

#[tokio::test]
async fn redelivery_finishes_a_settlement_interrupted_after_the_ledger_write() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());

    checkout.checkout(credit_request("ord-9101", product_id, 1, Money::from(10_000))).await.unwrap();
    // The first delivery won the ledger CAS and then died before any of the follow-up writes.
    let order_id = OrderId::from("ord-9101".to_string());
    let won =
        db.transition_payment(&order_id, PaymentStatus::Success, "settled by rail notification").await.unwrap();
    assert!(won.is_applied());

    let summary = reconciler
        .process_credit_batch(&credit_batch("push-recover", vec![settled_item("ord-9101", Money::from(10_000))]))
        .await
        .unwrap();
    assert_eq!(summary.duplicates, 1);
    // The redelivery completed what the interrupted run left behind.
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert!(units.iter().all(|u| u.status == OwnedProductStatus::Purchased));
    assert!(db.fetch_payment_history(&order_id).await.unwrap().is_some());
}

#[tokio::test]
async fn absurd_quantities_are_rejected_before_any_state_is_created() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(10_000), 3).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());

    let err = checkout
        .checkout(credit_request("ord-9201", product_id, i64::MAX, Money::from(10_000)))
        .await
        .expect_err("An overflowing total must be refused");
    assert!(matches!(err, CheckoutApiError::InvalidRequest(_)));
    assert!(db.fetch_pending_payment(&OrderId::from("ord-9201".to_string())).await.unwrap().is_none());
    assert_eq!(db.fetch_product(product_id).await.unwrap().unwrap().stock, 3);
}

#[tokio::test]
async fn releasing_an_unknown_order_is_an_error() {
    let db = setup().await;
    let err = db
        .release_reservation(&OrderId::from("ord-ghost".to_string()))
        .await
        .expect_err("An unknown order has no reservation to release");
    assert!(matches!(err, PaymentGatewayError::OrderNotFound(_)));
}

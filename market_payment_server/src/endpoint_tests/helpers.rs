use chrono::Utc;
use market_payment_engine::{
    db_types::{BillingInfo, OrderId, ProductKind},
    events::EventProducers,
    order_objects::{CheckoutRequest, PaymentInstrument},
    rail_types::{CreditWebhookItem, WebhookBatch},
    test_utils::{prepare_test_env, random_db_path, seed, TestRail},
    CheckoutApi,
    SqliteDatabase,
};
use mps_common::Money;

pub async fn setup_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database")
}

pub fn billing() -> BillingInfo {
    BillingInfo {
        name: "Yun Bora".to_string(),
        phone: "010-1234-5678".to_string(),
        address: Some("12 Teheran-ro, Gangnam-gu, Seoul".to_string()),
        postal_code: Some("06234".to_string()),
    }
}

/// Seeds a physical product and places a pending credit order against it, returning the order id.
pub async fn pending_credit_order(db: &SqliteDatabase, order_id: &str, unit_price: i64, amount: i64) -> OrderId {
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(unit_price), 10).await;
    seed::merchant(db.pool(), 1).await;
    let api = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let req = CheckoutRequest {
        order_id: Some(OrderId::from(order_id.to_string())),
        user_id: 42,
        product_id,
        amount,
        expected_price: Money::from(unit_price * amount),
        email: "bora@example.com".to_string(),
        billing_info: billing(),
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok-test".to_string() },
    };
    let receipt = api.checkout(req).await.expect("Error placing test order");
    receipt.payment.order_id
}

pub fn settled_credit_batch(push_id: &str, order_id: &OrderId, amount: i64) -> WebhookBatch<CreditWebhookItem> {
    WebhookBatch {
        webhook_id: "wh-credit-1".to_string(),
        push_id: push_id.to_string(),
        push_time: Utc::now(),
        items: vec![CreditWebhookItem {
            order_id: order_id.clone(),
            request_id: format!("req-{}", order_id.as_str()),
            result_code: "0000".to_string(),
            tx_type: "10".to_string(),
            card_status: "00".to_string(),
            amount: Money::from(amount),
        }],
    }
}

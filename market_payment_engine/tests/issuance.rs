//! Minting and transfer of on-chain certificates for settled orders.
use std::time::Duration;

use chrono::Utc;
use market_payment_engine::{
    db_types::{BillingInfo, OrderId, OwnedProductStatus, ProductKind},
    events::EventProducers,
    mpe_api::{CheckoutRequest, IssuanceApiError, PaymentInstrument},
    rail_types::{CreditWebhookItem, WebhookBatch},
    test_utils::{
        prepare_env::{prepare_test_env, random_db_path, seed},
        TestChain,
        TestRail,
    },
    traits::ChainIssuer,
    CheckoutApi,
    IssuanceApi,
    PaymentGatewayDatabase,
    ReconcilerApi,
    SqliteDatabase,
};
use mps_common::Money;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// Seeds an asset product with the given token pool, checks out `amount` units and settles the order.
async fn settled_asset_order(db: &SqliteDatabase, order_id: &str, tokens: &[i64], amount: i64) -> i64 {
    let product_id = seed::product(db.pool(), 1, ProductKind::Asset, Money::from(100_000), tokens.len() as i64).await;
    seed::tokens(db.pool(), product_id, tokens).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let req = CheckoutRequest {
        order_id: Some(OrderId::from(order_id.to_string())),
        user_id: 11,
        product_id,
        amount,
        expected_price: Money::from(100_000 * amount),
        email: "collector@example.com".to_string(),
        billing_info: BillingInfo { name: "Park".to_string(), phone: "010-9999-0000".to_string(), ..Default::default() },
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok-nft".to_string() },
    };
    checkout.checkout(req).await.expect("Checkout failed");
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let batch = WebhookBatch {
        webhook_id: "wh-credit-1".to_string(),
        push_id: format!("push-{order_id}"),
        push_time: Utc::now(),
        items: vec![CreditWebhookItem {
            order_id: OrderId::from(order_id.to_string()),
            request_id: format!("req-{order_id}"),
            result_code: "0000".to_string(),
            tx_type: "10".to_string(),
            card_status: "00".to_string(),
            amount: Money::from(100_000 * amount),
        }],
    };
    assert_eq!(reconciler.process_credit_batch(&batch).await.unwrap().settled, 1);
    product_id
}

#[tokio::test]
async fn mint_is_idempotent_per_token() {
    let db = setup().await;
    settled_asset_order(&db, "ord-nft-1", &[101, 102], 2).await;
    let chain = TestChain::new();
    let issuance = IssuanceApi::new(db.clone(), chain.clone(), EventProducers::default());

    let order_id = OrderId::from("ord-nft-1".to_string());
    let assets = issuance.mint_for_order(&order_id).await.expect("Mint failed");
    assert_eq!(assets.len(), 2);
    assert_eq!(chain.mint_calls(), 2);
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert!(units.iter().all(|u| u.status == OwnedProductStatus::NftMinted));

    // Calling again returns the same set without touching the chain.
    let again = issuance.mint_for_order(&order_id).await.unwrap();
    assert_eq!(again.len(), 2);
    assert_eq!(chain.mint_calls(), 2);
}

#[tokio::test]
async fn exhausted_mints_land_in_the_intervention_queue() {
    let db = setup().await;
    settled_asset_order(&db, "ord-nft-2", &[201], 1).await;
    let chain = TestChain::failing_mints(3);
    let issuance = IssuanceApi::new(db.clone(), chain.clone(), EventProducers::default())
        .with_retry_policy(3, Duration::from_millis(1));

    let order_id = OrderId::from("ord-nft-2".to_string());
    let err = issuance.mint_for_order(&order_id).await.expect_err("All attempts fail");
    assert!(matches!(err, IssuanceApiError::RetriesExhausted { attempts: 3, .. }));

    // The order stays settled-but-unfulfilled with the failure on record.
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert_eq!(units[0].status, OwnedProductStatus::Purchased);
    assert!(units[0].mint_attempts > 0);
    let stuck = db.fetch_units_awaiting_intervention().await.unwrap();
    assert_eq!(stuck.len(), 1);

    // Once the chain recovers, the same call finishes the job.
    let assets = issuance.mint_for_order(&order_id).await.expect("Mint should succeed after recovery");
    assert_eq!(assets.len(), 1);
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert_eq!(units[0].status, OwnedProductStatus::NftMinted);
    assert!(db.fetch_units_awaiting_intervention().await.unwrap().is_empty());
}

#[tokio::test]
async fn a_mint_submitted_before_a_crash_is_recognised() {
    let db = setup().await;
    settled_asset_order(&db, "ord-nft-3", &[301], 1).await;
    let chain = TestChain::new();
    // The chain already holds the token, but no local record exists (crash between submit and record).
    chain.mint("0xc0ffee", 301, &serde_json::json!({})).await.unwrap();
    assert_eq!(chain.mint_calls(), 1);

    let issuance = IssuanceApi::new(db.clone(), chain.clone(), EventProducers::default());
    let order_id = OrderId::from("ord-nft-3".to_string());
    let assets = issuance.mint_for_order(&order_id).await.expect("Recovery mint failed");
    assert_eq!(assets.len(), 1);
    assert_eq!(chain.mint_calls(), 1, "no second submission may be made");
    assert_eq!(assets[0].token_id, 301);
}

#[tokio::test]
async fn transfer_requires_minted_units() {
    let db = setup().await;
    settled_asset_order(&db, "ord-nft-4", &[401], 1).await;
    let chain = TestChain::new();
    let issuance = IssuanceApi::new(db.clone(), chain.clone(), EventProducers::default());
    let order_id = OrderId::from("ord-nft-4".to_string());

    let err = issuance.transfer_for_order(&order_id, "0xwallet").await.expect_err("Nothing is minted yet");
    assert!(matches!(err, IssuanceApiError::NotIssuable(..)));

    issuance.mint_for_order(&order_id).await.unwrap();
    let assets = issuance.transfer_for_order(&order_id, "0xwallet").await.expect("Transfer failed");
    assert_eq!(assets[0].owner.as_deref(), Some("0xwallet"));
    let units = db.fetch_owned_products(&order_id).await.unwrap();
    assert!(units.iter().all(|u| u.status == OwnedProductStatus::NftTransferred));

    // Transferring again is a no-op.
    let again = issuance.transfer_for_order(&order_id, "0xwallet").await.unwrap();
    assert_eq!(again.len(), 1);
}

#[tokio::test]
async fn physical_orders_cannot_be_minted() {
    let db = setup().await;
    let product_id = seed::product(db.pool(), 1, ProductKind::Physical, Money::from(5_000), 2).await;
    seed::merchant(db.pool(), 1).await;
    let checkout = CheckoutApi::new(db.clone(), TestRail::ok(), EventProducers::default());
    let req = CheckoutRequest {
        order_id: Some(OrderId::from("ord-phys".to_string())),
        user_id: 11,
        product_id,
        amount: 1,
        expected_price: Money::from(5_000),
        email: "buyer@example.com".to_string(),
        billing_info: BillingInfo { name: "Park".to_string(), phone: "010-1".to_string(), ..Default::default() },
        affiliate_ref: None,
        instrument: PaymentInstrument::Credit { card_token: "tok".to_string() },
    };
    checkout.checkout(req).await.unwrap();
    let reconciler = ReconcilerApi::new(db.clone(), EventProducers::default());
    let batch = WebhookBatch {
        webhook_id: "wh".to_string(),
        push_id: "push-phys".to_string(),
        push_time: Utc::now(),
        items: vec![CreditWebhookItem {
            order_id: OrderId::from("ord-phys".to_string()),
            request_id: "req-phys".to_string(),
            result_code: "0000".to_string(),
            tx_type: "10".to_string(),
            card_status: "00".to_string(),
            amount: Money::from(5_000),
        }],
    };
    reconciler.process_credit_batch(&batch).await.unwrap();

    let issuance = IssuanceApi::new(db.clone(), TestChain::new(), EventProducers::default());
    let err = issuance.mint_for_order(&OrderId::from("ord-phys".to_string())).await.expect_err("Physical products have no tokens");
    assert!(matches!(err, IssuanceApiError::NotIssuable(..)));
}

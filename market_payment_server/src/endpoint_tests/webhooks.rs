use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use market_payment_engine::{
    db_types::PaymentStatus,
    events::EventProducers,
    OrderApi,
    ReconcilerApi,
    SqliteDatabase,
};
use mps_common::Secret;

use crate::{
    config::WebhookAuthConfig,
    data_objects::JsonResponse,
    endpoint_tests::helpers::{pending_credit_order, settled_credit_batch, setup_db},
    helpers::calculate_hmac,
    webhook_routes::{CreditWebhookRoute, SIGNATURE_HEADER},
};

const TEST_SECRET: &str = "whsec-endpoint-test";

fn webhook_auth(enabled: bool) -> WebhookAuthConfig {
    WebhookAuthConfig { secret: Secret::new(TEST_SECRET.to_string()), enabled }
}

#[actix_web::test]
async fn unsigned_pushes_are_rejected() {
    let db = setup_db().await;
    let api = ReconcilerApi::new(db, EventProducers::default());
    let app = App::new()
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(webhook_auth(true)))
        .service(CreditWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let req = TestRequest::post().uri("/webhook/credit").set_payload("{}").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let req = TestRequest::post()
        .uri("/webhook/credit")
        .insert_header((SIGNATURE_HEADER, "deadbeef"))
        .set_payload("{}")
        .to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn signed_pushes_settle_orders() {
    let db = setup_db().await;
    let order_id = pending_credit_order(&db, "srv-credit-1", 40_000, 2).await;
    let api = ReconcilerApi::new(db.clone(), EventProducers::default());
    let app = App::new()
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(webhook_auth(true)))
        .service(CreditWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let batch = settled_credit_batch("push-srv-1", &order_id, 80_000);
    let body = serde_json::to_vec(&batch).expect("Error serialising batch");
    let signature = calculate_hmac(TEST_SECRET, &body);
    let req = TestRequest::post()
        .uri("/webhook/credit")
        .insert_header((SIGNATURE_HEADER, signature))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let response: JsonResponse = test::read_body_json(res).await;
    assert!(response.success);

    let orders = OrderApi::new(db, EventProducers::default());
    let status = orders.order_status(&order_id).await.unwrap().expect("Order vanished");
    assert!(matches!(status.payment.status, PaymentStatus::Success));
}

#[actix_web::test]
async fn garbled_pushes_are_rejected_for_redelivery() {
    let db = setup_db().await;
    let api = ReconcilerApi::new(db, EventProducers::default());
    let app = App::new()
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(webhook_auth(true)))
        .service(CreditWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let body = b"this is not json".to_vec();
    let signature = calculate_hmac(TEST_SECRET, &body);
    let req = TestRequest::post()
        .uri("/webhook/credit")
        .insert_header((SIGNATURE_HEADER, signature))
        .set_payload(body)
        .to_request();
    let res = test::call_service(&service, req).await;
    // A push that does not parse is refused outright; the rail fixes its payload and redelivers.
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn signature_checks_can_be_disabled_for_development() {
    let db = setup_db().await;
    let order_id = pending_credit_order(&db, "srv-credit-2", 15_000, 1).await;
    let api = ReconcilerApi::new(db, EventProducers::default());
    let app = App::new()
        .app_data(web::Data::new(api))
        .app_data(web::Data::new(webhook_auth(false)))
        .service(CreditWebhookRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let batch = settled_credit_batch("push-srv-2", &order_id, 15_000);
    let body = serde_json::to_vec(&batch).expect("Error serialising batch");
    let req = TestRequest::post().uri("/webhook/credit").set_payload(body).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use market_payment_engine::{events::EventProducers, order_objects::OrderStatusResult, OrderApi, SqliteDatabase};

use crate::{
    endpoint_tests::helpers::{pending_credit_order, setup_db},
    routes::{health, CreditStatusRoute, OrderStatusRoute},
};

#[actix_web::test]
async fn health_check_works() {
    let service = test::init_service(App::new().service(health)).await;
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn order_status_by_id_and_rail_ref() {
    let db = setup_db().await;
    let order_id = pending_credit_order(&db, "srv-status-1", 25_000, 1).await;
    let api = OrderApi::new(db, EventProducers::default());
    let app = App::new()
        .app_data(web::Data::new(api))
        .service(OrderStatusRoute::<SqliteDatabase>::new())
        .service(CreditStatusRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let req = TestRequest::get().uri(&format!("/status/order/{}", order_id.as_str())).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let status: OrderStatusResult = test::read_body_json(res).await;
    assert_eq!(status.payment.order_id, order_id);

    // The same order, looked up by the reference the rail returned at initiation time.
    let req = TestRequest::get().uri(&format!("/status/credit/req-{}", order_id.as_str())).to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let status: OrderStatusResult = test::read_body_json(res).await;
    assert_eq!(status.payment.order_id, order_id);
}

#[actix_web::test]
async fn unknown_orders_are_a_404() {
    let db = setup_db().await;
    let api = OrderApi::new(db, EventProducers::default());
    let app = App::new().app_data(web::Data::new(api)).service(OrderStatusRoute::<SqliteDatabase>::new());
    let service = test::init_service(app).await;

    let req = TestRequest::get().uri("/status/order/no-such-order").to_request();
    let res = test::call_service(&service, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use market_payment_engine::{
    db_types::OrderId,
    order_objects::{CheckoutRequest, OrderStatusResult},
    traits::{ChainIssuer, PaymentGatewayDatabase, PaymentRail},
    CheckoutApi,
    IssuanceApi,
    OrderApi,
};

use crate::{
    data_objects::{
        BankCheckoutPayload,
        CancelOrderParams,
        CreditCheckoutPayload,
        MintOrderParams,
        TransferOrderParams,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout_credit => Post "/checkout/credit" impl PaymentGatewayDatabase, PaymentRail);
/// Route handler for credit-card checkouts.
///
/// Validates the payload against the catalogue, reserves stock (and certificate tokens, for asset-backed products),
/// and asks the credit rail to open a payment window. The response carries the ledger row and the rail's redirect
/// information. If the rail refuses, the reservation is already rolled back by the time the error surfaces.
pub async fn checkout_credit<B, R>(
    body: web::Json<CreditCheckoutPayload>,
    api: web::Data<CheckoutApi<B, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    R: PaymentRail,
{
    let req = CheckoutRequest::from(body.into_inner());
    debug!("💻️ POST credit checkout for user {} on product {}", req.user_id, req.product_id);
    let receipt = api.checkout(req).await?;
    info!("💻️ Credit checkout for order {} accepted", receipt.payment.order_id);
    Ok(HttpResponse::Ok().json(receipt))
}

route!(checkout_bank => Post "/checkout/bank" impl PaymentGatewayDatabase, PaymentRail);
/// Route handler for virtual-account checkouts. Same flow as the credit variant, but the rail response carries the
/// account number the customer must deposit into.
pub async fn checkout_bank<B, R>(
    body: web::Json<BankCheckoutPayload>,
    api: web::Data<CheckoutApi<B, R>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    R: PaymentRail,
{
    let req = CheckoutRequest::from(body.into_inner());
    debug!("💻️ POST bank checkout for user {} on product {}", req.user_id, req.product_id);
    let receipt = api.checkout(req).await?;
    info!("💻️ Bank checkout for order {} accepted", receipt.payment.order_id);
    Ok(HttpResponse::Ok().json(receipt))
}

//----------------------------------------------   Status  ----------------------------------------------------
route!(order_status => Get "/status/order/{order_id}" impl PaymentGatewayDatabase);
pub async fn order_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET status for order {order_id}");
    let status = api.order_status(&order_id).await?;
    ok_or_not_found(status, &order_id)
}

route!(credit_status => Get "/status/credit/{request_id}" impl PaymentGatewayDatabase);
/// Looks an order up by the request id the credit rail returned at initiation time. Storefronts that only hold the
/// rail's reference use this instead of [`order_status`].
pub async fn credit_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_id = path.into_inner();
    debug!("💻️ GET status for credit request {request_id}");
    let status = api.order_status_by_rail_ref(&request_id).await?;
    status
        .map(|s| HttpResponse::Ok().json(s))
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order for credit request {request_id}")))
}

route!(bank_status => Get "/status/bank/{confirm_number}" impl PaymentGatewayDatabase);
pub async fn bank_status<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let confirm_number = path.into_inner();
    debug!("💻️ GET status for virtual account {confirm_number}");
    let status = api.order_status_by_rail_ref(&confirm_number).await?;
    status
        .map(|s| HttpResponse::Ok().json(s))
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order for virtual account {confirm_number}")))
}

route!(payment_history => Get "/history/{order_id}" impl PaymentGatewayDatabase);
pub async fn payment_history<B: PaymentGatewayDatabase>(
    path: web::Path<String>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ GET payment history for order {order_id}");
    let history = api.payment_history(&order_id).await?;
    history
        .map(|h| HttpResponse::Ok().json(h))
        .ok_or_else(|| ServerError::NoRecordFound(format!("No payment history for order {order_id}")))
}

fn ok_or_not_found(status: Option<OrderStatusResult>, order_id: &OrderId) -> Result<HttpResponse, ServerError> {
    status
        .map(|s| HttpResponse::Ok().json(s))
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))
}

//----------------------------------------------   Cancellation  ----------------------------------------------------
route!(cancel_order => Post "/cancel" impl PaymentGatewayDatabase);
/// Cancels a pending order, returning its stock and reserved tokens to the pool. Settled orders whose certificates
/// have already been minted cannot be canceled here and come back as a 409.
pub async fn cancel_order<B: PaymentGatewayDatabase>(
    body: web::Json<CancelOrderParams>,
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let params = body.into_inner();
    info!("💻️ POST cancel order {}. Reason: {}", params.order_id, params.reason);
    let payment = api.cancel_order(&params.order_id, &params.reason).await?;
    Ok(HttpResponse::Ok().json(payment))
}

//----------------------------------------------   Issuance  ----------------------------------------------------
route!(mint_order => Post "/admin/mint" impl PaymentGatewayDatabase, ChainIssuer);
/// Manually drives minting for a settled order. Minting normally runs off the settlement event; this endpoint exists
/// for operators re-driving units that exhausted their automatic attempts.
pub async fn mint_order<B, C>(
    body: web::Json<MintOrderParams>,
    api: web::Data<IssuanceApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    C: ChainIssuer,
{
    let params = body.into_inner();
    info!("💻️ POST mint certificates for order {}", params.order_id);
    let assets = api.mint_for_order(&params.order_id).await?;
    info!("💻️ {} certificates minted for order {}", assets.len(), params.order_id);
    Ok(HttpResponse::Ok().json(assets))
}

route!(transfer_order => Post "/transfer" impl PaymentGatewayDatabase, ChainIssuer);
/// Transfers an order's minted certificates to the customer's wallet. Requires every unit in the order to have been
/// minted already.
pub async fn transfer_order<B, C>(
    body: web::Json<TransferOrderParams>,
    api: web::Data<IssuanceApi<B, C>>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentGatewayDatabase,
    C: ChainIssuer,
{
    let params = body.into_inner();
    info!("💻️ POST transfer certificates for order {} to {}", params.order_id, params.wallet_address);
    let assets = api.transfer_for_order(&params.order_id, &params.wallet_address).await?;
    info!("💻️ {} certificates transferred for order {}", assets.len(), params.order_id);
    Ok(HttpResponse::Ok().json(assets))
}

//----------------------------------------------   Operator views  ----------------------------------------------------
route!(reconciliation_exceptions => Get "/admin/exceptions" impl PaymentGatewayDatabase);
pub async fn reconciliation_exceptions<B: PaymentGatewayDatabase>(
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET reconciliation exceptions");
    let exceptions = api.reconciliation_exceptions().await?;
    Ok(HttpResponse::Ok().json(exceptions))
}

route!(units_awaiting_intervention => Get "/admin/interventions" impl PaymentGatewayDatabase);
pub async fn units_awaiting_intervention<B: PaymentGatewayDatabase>(
    api: web::Data<OrderApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET units awaiting intervention");
    let units = api.units_awaiting_intervention().await?;
    Ok(HttpResponse::Ok().json(units))
}

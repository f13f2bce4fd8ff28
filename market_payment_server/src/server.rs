use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::FutureExt;
use gateway_clients::{ChainApiClient, GatewayRailClient};
use log::*;
use market_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    CheckoutApi,
    IssuanceApi,
    IssuanceApiError,
    OrderApi,
    ReconcilerApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{
        health,
        BankStatusRoute,
        CancelOrderRoute,
        CheckoutBankRoute,
        CheckoutCreditRoute,
        CreditStatusRoute,
        MintOrderRoute,
        OrderStatusRoute,
        PaymentHistoryRoute,
        ReconciliationExceptionsRoute,
        TransferOrderRoute,
        UnitsAwaitingInterventionRoute,
    },
    webhook_routes::{BankWebhookRoute, CreditWebhookRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let rail = GatewayRailClient::new(config.rails.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let chain = ChainApiClient::new(config.rails.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_mint_on_settlement(db.clone(), chain.clone()).await;
    start_expiry_worker(db.clone(), producers.clone());
    let srv = create_server_instance(config, db, rail, chain, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Wires the settlement event to the chain issuer, so certificates start minting as soon as the reconciler marks a
/// payment successful. Physical orders settle too, but minting skips them with a `NotIssuable`.
async fn start_mint_on_settlement(db: SqliteDatabase, chain: ChainApiClient) -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.on_order_settled(move |event| {
        let api = IssuanceApi::new(db.clone(), chain.clone(), EventProducers::default());
        async move {
            let order_id = event.payment.order_id;
            match api.mint_for_order(&order_id).await {
                Ok(assets) => info!("⛓️ {} certificates minted for settled order {order_id}", assets.len()),
                Err(IssuanceApiError::NotIssuable(_, reason)) => {
                    debug!("⛓️ Order {order_id} needs no minting. {reason}");
                },
                Err(e) => {
                    // Retries are already exhausted at this point. The units sit in the intervention queue and an
                    // operator re-drives them through /admin/mint.
                    error!("⛓️ Could not mint certificates for order {order_id}. {e}");
                },
            }
        }
        .boxed()
    });
    let handlers = EventHandlers::new(50, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    rail: GatewayRailClient,
    chain: ChainApiClient,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone(), rail.clone(), producers.clone())
            .with_term_windows(config.credit_term, config.bank_term);
        let reconciler_api = ReconcilerApi::new(db.clone(), producers.clone());
        let order_api = OrderApi::new(db.clone(), producers.clone());
        let issuance_api = IssuanceApi::new(db.clone(), chain.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mps::access_log"))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(reconciler_api))
            .app_data(web::Data::new(order_api))
            .app_data(web::Data::new(issuance_api))
            .app_data(web::Data::new(config.webhook_auth.clone()))
            .service(health)
            .service(CheckoutCreditRoute::<SqliteDatabase, GatewayRailClient>::new())
            .service(CheckoutBankRoute::<SqliteDatabase, GatewayRailClient>::new())
            .service(OrderStatusRoute::<SqliteDatabase>::new())
            .service(CreditStatusRoute::<SqliteDatabase>::new())
            .service(BankStatusRoute::<SqliteDatabase>::new())
            .service(PaymentHistoryRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase>::new())
            .service(MintOrderRoute::<SqliteDatabase, ChainApiClient>::new())
            .service(TransferOrderRoute::<SqliteDatabase, ChainApiClient>::new())
            .service(ReconciliationExceptionsRoute::<SqliteDatabase>::new())
            .service(UnitsAwaitingInterventionRoute::<SqliteDatabase>::new())
            .service(CreditWebhookRoute::<SqliteDatabase>::new())
            .service(BankWebhookRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

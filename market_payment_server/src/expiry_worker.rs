use chrono::Utc;
use log::*;
use market_payment_engine::{db_types::PendingPayment, events::EventProducers, OrderApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the term-window expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(db: SqliteDatabase, producers: EventProducers) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        let api = OrderApi::new(db, producers);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running order expiry job");
            match api.expire_stale_orders(Utc::now()).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} orders expired past their term window", expired.len());
                    debug!("🕰️ Expired orders: {}", payment_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running order expiry job: {e}");
                },
            }
        }
    })
}

fn payment_list(payments: &[PendingPayment]) -> String {
    payments
        .iter()
        .map(|p| format!("[{}] order_id: {} user_id: {}", p.id, p.order_id, p.user_id))
        .collect::<Vec<String>>()
        .join(", ")
}

use chrono::{DateTime, Utc};
use log::{debug, warn};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{OrderId, Rail, ReconciliationException},
    traits::PaymentGatewayError,
};

pub async fn is_push_processed(push_id: &str, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let row: Option<i64> = sqlx::query_scalar("SELECT id FROM processed_webhooks WHERE push_id = $1")
        .bind(push_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

/// Records the push id in the dedup set. A concurrent worker finishing the same batch first trips the unique
/// constraint, which is fine: the batch was processed exactly once either way.
pub async fn mark_push_processed(
    rail: Rail,
    webhook_id: &str,
    push_id: &str,
    push_time: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let result = sqlx::query(
        "INSERT INTO processed_webhooks (rail, webhook_id, push_id, push_time) VALUES ($1, $2, $3, $4)",
    )
    .bind(rail.to_string())
    .bind(webhook_id)
    .bind(push_id)
    .bind(push_time)
    .execute(conn)
    .await;
    match result {
        Ok(_) => {
            debug!("🔁️ Push {push_id} ({rail}) marked as processed");
            Ok(())
        },
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
            warn!("🔁️ Push {push_id} was concurrently marked as processed by another worker");
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn record_exception(
    rail: Rail,
    push_id: &str,
    order_id: Option<&OrderId>,
    reason: &str,
    payload: serde_json::Value,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        "INSERT INTO reconciliation_exceptions (rail, push_id, order_id, reason, payload) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(rail.to_string())
    .bind(push_id)
    .bind(order_id.map(|o| o.as_str().to_string()))
    .bind(reason)
    .bind(Json(payload))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_exceptions(conn: &mut SqliteConnection) -> Result<Vec<ReconciliationException>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM reconciliation_exceptions ORDER BY created_at").fetch_all(conn).await?;
    Ok(rows)
}

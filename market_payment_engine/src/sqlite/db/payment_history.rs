use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewPaymentHistory, OrderId, PaymentHistory},
    traits::{InsertHistoryResult, PaymentGatewayError},
};

/// Appends the resolved attempt to the archive. The unique `order_id` makes this insert-once: the second writer
/// (a replayed webhook, a crash-recovered flow) gets `AlreadyRecorded` instead of a duplicate row.
pub async fn insert_history(
    history: NewPaymentHistory,
    conn: &mut SqliteConnection,
) -> Result<InsertHistoryResult, PaymentGatewayError> {
    let order_id = history.order_id.clone();
    let result = sqlx::query(
        r#"
            INSERT INTO payment_history (
                order_id, is_dummy, user_id, product_id, town_id, amount, price,
                term_window, rail, status_code, raw_result, email, billing_info
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(history.order_id)
    .bind(history.is_dummy)
    .bind(history.user_id)
    .bind(history.product_id)
    .bind(history.town_id)
    .bind(history.amount)
    .bind(history.price)
    .bind(history.term_window)
    .bind(history.rail.to_string())
    .bind(history.status_code)
    .bind(Json(history.raw_result))
    .bind(history.email)
    .bind(Json(history.billing_info))
    .execute(conn)
    .await;
    match result {
        Ok(_) => {
            debug!("🧾️ Payment history recorded for order {order_id}");
            Ok(InsertHistoryResult::Inserted)
        },
        Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(InsertHistoryResult::AlreadyRecorded),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_history(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentHistory>, sqlx::Error> {
    let row = sqlx::query_as("SELECT * FROM payment_history WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

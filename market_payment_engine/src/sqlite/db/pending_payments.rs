use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{NewPendingPayment, OrderId, PaymentStatus, PendingPayment},
    traits::{PaymentGatewayError, TransitionResult},
};

/// Inserts the ledger row for a new order attempt. The unique constraint on `order_id` is the "exactly one row per
/// order" invariant; a duplicate insert is mapped to `OrderAlreadyExists`.
pub async fn insert_pending_payment(
    order: NewPendingPayment,
    reserved_token_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<PendingPayment, PaymentGatewayError> {
    let order_id = order.order_id.clone();
    let payment: PendingPayment = sqlx::query_as(
        r#"
            INSERT INTO pending_payments (
                order_id,
                user_id,
                product_group_id,
                product_id,
                amount,
                price,
                rail,
                reserved_token_ids,
                email,
                billing_info,
                affiliate_ref,
                term_window
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.user_id)
    .bind(order.product_group_id)
    .bind(order.product_id)
    .bind(order.amount)
    .bind(order.price)
    .bind(order.rail.to_string())
    .bind(Json(reserved_token_ids.to_vec()))
    .bind(order.email)
    .bind(Json(order.billing_info))
    .bind(order.affiliate_ref)
    .bind(order.term_window)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => PaymentGatewayError::OrderAlreadyExists(order_id),
        _ => PaymentGatewayError::from(e),
    })?;
    debug!("📒️ Pending payment {} inserted with id {}", payment.order_id, payment.id);
    Ok(payment)
}

pub async fn fetch_pending_payment(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingPayment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM pending_payments WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_pending_payment_by_rail_ref(
    rail_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PendingPayment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM pending_payments WHERE rail_ref = $1")
        .bind(rail_ref)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// The compare-and-set at the heart of the reconciliation engine. The UPDATE only matches while the row is still
/// `Pending`, so concurrent resolvers racing on the same order id have exactly one winner; the losers learn the
/// already-applied status from the follow-up read.
pub async fn transition_payment(
    order_id: &OrderId,
    new_status: PaymentStatus,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<TransitionResult, PaymentGatewayError> {
    let updated: Option<PendingPayment> = sqlx::query_as(
        r#"
            UPDATE pending_payments
            SET status = $1, status_reason = $2, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $3 AND status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(new_status.to_string())
    .bind(reason)
    .bind(order_id.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(payment) => {
            debug!("📒️ Order {order_id} transitioned to {new_status} ({reason})");
            Ok(TransitionResult::Applied(payment))
        },
        None => {
            let current = fetch_pending_payment(order_id, conn)
                .await?
                .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
            trace!("📒️ Order {order_id} was already {} when a transition to {new_status} arrived", current.status);
            Ok(TransitionResult::Conflict(current.status))
        },
    }
}

pub async fn set_rail_ref(
    order_id: &OrderId,
    rail_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    let result = sqlx::query("UPDATE pending_payments SET rail_ref = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2")
        .bind(rail_ref)
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(PaymentGatewayError::OrderNotFound(order_id.clone()));
    }
    Ok(())
}

/// Flips the `reservation_released` guard. Returns true exactly once per order; repeat calls see the guard already
/// set and report false so the caller can skip the stock/token restore.
pub async fn claim_reservation_release(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let result = sqlx::query(
        "UPDATE pending_payments SET reservation_released = 1, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND reservation_released = 0",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// CAS-expires every pending row whose term window has passed. Shares the `status = 'Pending'` guard with
/// [`transition_payment`], so the sweep and a late webhook cannot both win.
pub async fn expire_stale_payments(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<PendingPayment>, PaymentGatewayError> {
    let rows = sqlx::query_as(
        r#"
            UPDATE pending_payments
            SET status = 'Canceled', status_reason = 'term window expired', updated_at = CURRENT_TIMESTAMP
            WHERE status = 'Pending' AND term_window <= $1
            RETURNING *;
        "#,
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, OwnedProduct, OwnedProductStatus},
    traits::PaymentGatewayError,
};

/// Inserts one `PendingPayment`-status unit per purchased item. For asset-backed products each unit carries one of
/// the order's reserved token ids; physical units carry none.
pub async fn insert_units(
    order_id: &OrderId,
    product_id: i64,
    user_id: i64,
    qty: i64,
    token_ids: &[i64],
    conn: &mut SqliteConnection,
) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
    let mut units = Vec::with_capacity(qty as usize);
    for i in 0..qty {
        let token_id = token_ids.get(i as usize).copied();
        let unit: OwnedProduct = sqlx::query_as(
            r#"
                INSERT INTO owned_products (order_id, product_id, user_id, token_id)
                VALUES ($1, $2, $3, $4)
                RETURNING *;
            "#,
        )
        .bind(order_id.as_str())
        .bind(product_id)
        .bind(user_id)
        .bind(token_id)
        .fetch_one(&mut *conn)
        .await?;
        units.push(unit);
    }
    trace!("📦️ {} unit(s) created for order {order_id}", units.len());
    Ok(units)
}

pub async fn fetch_units(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OwnedProduct>, sqlx::Error> {
    let units = sqlx::query_as("SELECT * FROM owned_products WHERE order_id = $1 ORDER BY id")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(units)
}

/// Guarded forward move: only units currently in `from` are touched, so a repeated call is a no-op and a unit can
/// never skip a state or move backwards.
pub async fn advance_units(
    order_id: &OrderId,
    from: OwnedProductStatus,
    to: OwnedProductStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
    let units: Vec<OwnedProduct> = sqlx::query_as(
        r#"
            UPDATE owned_products
            SET status = $1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(to.to_string())
    .bind(order_id.as_str())
    .bind(from.to_string())
    .fetch_all(conn)
    .await?;
    if !units.is_empty() {
        debug!("📦️ {} unit(s) of order {order_id} moved {from} -> {to}", units.len());
    }
    Ok(units)
}

/// Cancels the order's units. `Canceled` is only reachable from `PendingPayment` or `Purchased`; minted and
/// transferred units are deliberately excluded from the guard.
pub async fn cancel_units(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OwnedProduct>, PaymentGatewayError> {
    let units: Vec<OwnedProduct> = sqlx::query_as(
        r#"
            UPDATE owned_products
            SET status = 'Canceled', updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status IN ('PendingPayment', 'Purchased')
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(units)
}

pub async fn record_mint_attempt(
    order_id: &OrderId,
    error: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            UPDATE owned_products
            SET mint_attempts = mint_attempts + 1, issuance_error = $1, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status = 'Purchased'
        "#,
    )
    .bind(error)
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_units_awaiting_intervention(
    conn: &mut SqliteConnection,
) -> Result<Vec<OwnedProduct>, sqlx::Error> {
    let units = sqlx::query_as(
        "SELECT * FROM owned_products WHERE status = 'Purchased' AND mint_attempts > 0 ORDER BY updated_at",
    )
    .fetch_all(conn)
    .await?;
    Ok(units)
}

use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, Product},
    traits::PaymentGatewayError,
};

pub async fn fetch_product(product_id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product =
        sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(product_id).fetch_optional(conn).await?;
    Ok(product)
}

/// Reserves `qty` units of the product for the given order: a guarded atomic decrement of the stock counter,
/// followed by claiming token ids from the pool for asset-backed products.
///
/// The decrement is a single `UPDATE ... WHERE stock >= qty`, never a read-then-write, so concurrent checkouts on
/// the last unit leave exactly one winner. It must also be the *first* statement of the checkout transaction:
/// a transaction that reads first takes a snapshot SQLite refuses to upgrade when a rival writer got in between.
/// On any error the whole transaction rolls back and no partial reservation survives.
pub async fn reserve_units(
    product_id: i64,
    qty: i64,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<i64>, PaymentGatewayError> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 AND stock >= $1",
    )
    .bind(qty)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        // The guard matched nothing. A follow-up read tells a missing product apart from an empty shelf.
        return match fetch_product(product_id, conn).await? {
            Some(_) => Err(PaymentGatewayError::OutOfStock(product_id, qty)),
            None => Err(PaymentGatewayError::ProductNotFound(product_id)),
        };
    }
    let product = fetch_product(product_id, &mut *conn)
        .await?
        .ok_or(PaymentGatewayError::ProductNotFound(product_id))?;
    trace!("📦️ Reserved {qty} unit(s) of product {product_id} for order {order_id}");
    if !product.is_asset_backed() {
        return Ok(Vec::new());
    }
    let tokens: Vec<i64> = sqlx::query_scalar(
        r#"
            UPDATE product_tokens SET state = 'Reserved', order_id = $1
            WHERE product_id = $2 AND token_id IN (
                SELECT token_id FROM product_tokens
                WHERE product_id = $2 AND state = 'Available'
                ORDER BY token_id
                LIMIT $3
            )
            RETURNING token_id;
        "#,
    )
    .bind(order_id.as_str())
    .bind(product_id)
    .bind(qty)
    .fetch_all(&mut *conn)
    .await?;
    if (tokens.len() as i64) < qty {
        // The stock counter and the token pool have diverged. Rolling back leaves both untouched.
        return Err(PaymentGatewayError::OutOfStock(product_id, qty));
    }
    debug!("📦️ Order {order_id} holds tokens {tokens:?} of product {product_id}");
    Ok(tokens)
}

/// Returns the order's reserved tokens to the pool and restores the stock counter. The caller must have won the
/// `claim_reservation_release` guard first; this function itself is a plain restore.
pub async fn restore_reservation(
    product_id: i64,
    qty: i64,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        "UPDATE product_tokens SET state = 'Available', order_id = NULL WHERE order_id = $1 AND state = 'Reserved'",
    )
    .bind(order_id.as_str())
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE products SET stock = stock + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2")
        .bind(qty)
        .bind(product_id)
        .execute(conn)
        .await?;
    debug!("📦️ Reservation for order {order_id} released ({qty} unit(s) of product {product_id})");
    Ok(())
}

/// Marks the order's reserved tokens as issued. Called once the corresponding mint has been confirmed.
pub async fn mark_tokens_issued(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    sqlx::query("UPDATE product_tokens SET state = 'Issued' WHERE order_id = $1 AND state = 'Reserved'")
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

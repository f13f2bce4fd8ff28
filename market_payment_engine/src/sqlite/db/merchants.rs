use sqlx::SqliteConnection;

use crate::db_types::MerchantConfig;

pub async fn fetch_merchant_config(
    town_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<MerchantConfig>, sqlx::Error> {
    let config = sqlx::query_as("SELECT * FROM merchants WHERE town_id = $1")
        .bind(town_id)
        .fetch_optional(conn)
        .await?;
    Ok(config)
}

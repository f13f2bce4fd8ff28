use log::debug;
use sqlx::{types::Json, SqliteConnection};

use crate::{
    db_types::{Asset, NewAsset},
    traits::PaymentGatewayError,
};

pub async fn fetch_asset(
    contract_address: &str,
    token_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Asset>, sqlx::Error> {
    let asset = sqlx::query_as("SELECT * FROM assets WHERE contract_address = $1 AND token_id = $2")
        .bind(contract_address)
        .bind(token_id)
        .fetch_optional(conn)
        .await?;
    Ok(asset)
}

/// Records a confirmed mint. The unique (contract, token) pair maps a duplicate insert to `AssetAlreadyExists`,
/// which the issuance orchestrator treats as "minted by an earlier attempt".
pub async fn insert_asset(asset: NewAsset, conn: &mut SqliteConnection) -> Result<Asset, PaymentGatewayError> {
    let contract = asset.contract_address.clone();
    let token_id = asset.token_id;
    let asset: Asset = sqlx::query_as(
        r#"
            INSERT INTO assets (chain_id, contract_address, token_id, attributes, mint_tx_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(asset.chain_id)
    .bind(asset.contract_address)
    .bind(asset.token_id)
    .bind(Json(asset.attributes))
    .bind(asset.mint_tx_hash)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            PaymentGatewayError::AssetAlreadyExists(contract, token_id)
        },
        _ => PaymentGatewayError::from(e),
    })?;
    debug!("🪙️ Asset {token_id} on {} recorded ({})", asset.contract_address, asset.mint_tx_hash);
    Ok(asset)
}

pub async fn set_asset_owner(
    contract_address: &str,
    token_id: i64,
    owner: &str,
    conn: &mut SqliteConnection,
) -> Result<Asset, PaymentGatewayError> {
    let asset: Option<Asset> = sqlx::query_as(
        r#"
            UPDATE assets SET owner = $1, updated_at = CURRENT_TIMESTAMP
            WHERE contract_address = $2 AND token_id = $3
            RETURNING *;
        "#,
    )
    .bind(owner)
    .bind(contract_address)
    .bind(token_id)
    .fetch_optional(conn)
    .await?;
    asset.ok_or_else(|| PaymentGatewayError::AssetNotFound(contract_address.to_string(), token_id))
}

use std::path::Path;

use log::*;
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};

use crate::SqliteDatabase;

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    format!("sqlite://../data/test_store_{}", rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(db.pool()).await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database<P: AsRef<Path>>(path: P) {
    let p = path.as_ref().as_os_str().to_str().unwrap();
    if let Err(e) = Sqlite::drop_database(p).await {
        warn!("Error dropping database {p}: {e:?}");
    }
    Sqlite::create_database(p).await.expect("Error creating database");
    info!("Created Sqlite database {p}");
}

/// Row seeding for tests. These write reference data (catalogue, token pools, merchant credentials) directly, since
/// catalogue management is not part of this subsystem's API.
pub mod seed {
    use mps_common::Money;
    use sqlx::SqlitePool;

    use crate::db_types::ProductKind;

    pub async fn product(pool: &SqlitePool, town_id: i64, kind: ProductKind, unit_price: Money, stock: i64) -> i64 {
        let (chain_id, contract) = match kind {
            ProductKind::Physical => (None, None),
            ProductKind::Asset => (Some(8217i64), Some("0xc0ffee".to_string())),
        };
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO products (product_group_id, town_id, name, kind, unit_price, stock, chain_id, \
             contract_address) VALUES (1, $1, 'test product', $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(town_id)
        .bind(kind.to_string())
        .bind(unit_price)
        .bind(stock)
        .bind(chain_id)
        .bind(contract)
        .fetch_one(pool)
        .await
        .expect("Error seeding product");
        id
    }

    pub async fn tokens(pool: &SqlitePool, product_id: i64, token_ids: &[i64]) {
        for token_id in token_ids {
            sqlx::query("INSERT INTO product_tokens (product_id, token_id) VALUES ($1, $2)")
                .bind(product_id)
                .bind(token_id)
                .execute(pool)
                .await
                .expect("Error seeding token pool");
        }
    }

    pub async fn merchant(pool: &SqlitePool, town_id: i64) {
        sqlx::query(
            "INSERT INTO merchants (town_id, merchant_cc_id, merchant_secret_key, token_api_key) VALUES ($1, \
             'mid-test', 'sk-test', 'tk-test')",
        )
        .bind(town_id)
        .execute(pool)
        .await
        .expect("Error seeding merchant config");
    }
}

//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction
//! as the need arises and call through to the functions without any other changes.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod assets;
pub mod merchants;
pub mod owned_products;
pub mod payment_history;
pub mod pending_payments;
pub mod products;
pub mod webhooks;

const SQLITE_DB_URL: &str = "sqlite://data/mps_store.db";

pub fn db_url() -> String {
    let result = env::var("MPS_DATABASE_URL").unwrap_or_else(|_| {
        info!("MPS_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // Without a busy timeout, a connection that hits a held write lock fails immediately with SQLITE_BUSY
    // instead of waiting its turn.
    let options = SqliteConnectOptions::from_str(url)?.busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

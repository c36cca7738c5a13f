//! Persistence layer.
//!
//! Every operation on the `cryptocurrencies` table goes through the
//! `CoinStore` trait. Two backends exist: the hosted Supabase table
//! (PostgREST over HTTPS) and a local SQLite file for development and
//! tests. Symbols are normalised to upper-case on every call.

pub mod sqlite;
pub mod supabase;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::config::{AppConfig, DatabaseBackend};
use crate::types::CryptoRecord;

pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;

/// CRUD access to the cryptocurrency table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoinStore: Send + Sync {
    /// Insert-or-update every record keyed by `id`; last writer wins.
    /// Returns the number of records written.
    async fn upsert_many(&self, records: &[CryptoRecord]) -> Result<usize>;

    /// All rows.
    async fn list_all(&self) -> Result<Vec<CryptoRecord>>;

    /// First row with this symbol, or `None`.
    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>>;

    /// Insert a new row. A duplicate `id` is an error.
    async fn insert(&self, record: &CryptoRecord) -> Result<CryptoRecord>;

    /// Set the price of rows with this symbol; `None` when no row matched.
    async fn update_price(&self, symbol: &str, price: Decimal) -> Result<Option<CryptoRecord>>;

    /// Delete rows with this symbol; returns the deleted row, `None` when
    /// nothing matched.
    async fn delete_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>>;

    /// Backend name for logging.
    fn backend(&self) -> &'static str;
}

/// Build the store selected in config. Missing hosted-database
/// credentials are a startup error.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn CoinStore>> {
    let store: Arc<dyn CoinStore> = match config.database.backend {
        DatabaseBackend::Supabase => {
            let creds = config.database_credentials()?;
            Arc::new(SupabaseStore::new(&creds, &config.database.table)?)
        }
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStore::connect(&config.database.sqlite_url, &config.database.table).await?,
        ),
    };
    info!(backend = store.backend(), table = %config.database.table, "Database client initialized");
    Ok(store)
}

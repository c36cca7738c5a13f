//! SQLite backend (sqlx).
//!
//! Mirrors the hosted table's schema. `price_in_usd` is kept as TEXT so
//! decimals survive unchanged; `last_updated` defaults to the current
//! UTC time in RFC 3339 form.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::debug;

use super::CoinStore;
use crate::types::{normalize_symbol, parse_timestamp, CoinwatchError, CryptoRecord};

const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and ensure the table exists.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        // An in-memory database lives and dies with one connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)
            .with_context(|| format!("Failed to open SQLite database: {url}"))?;

        let store = Self {
            pool,
            table: checked_table_name(table)?,
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Fresh private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", "cryptocurrencies").await
    }

    async fn migrate(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                id           TEXT PRIMARY KEY,
                symbol       TEXT NOT NULL,
                name         TEXT NOT NULL,
                price_in_usd TEXT NOT NULL,
                last_updated TEXT NOT NULL DEFAULT ({NOW_SQL})
            )",
            t = self.table
        );
        sqlx::query(&sql).execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }
}

fn db_err(e: sqlx::Error) -> CoinwatchError {
    CoinwatchError::Database(e.to_string())
}

/// The table name is spliced into SQL, so only plain identifiers pass.
fn checked_table_name(table: &str) -> Result<String> {
    let ok = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if ok {
        Ok(table.to_string())
    } else {
        Err(CoinwatchError::Config(format!("invalid table name: {table:?}")).into())
    }
}

fn row_to_record(row: &SqliteRow) -> Result<CryptoRecord, CoinwatchError> {
    let price_raw: String = row.try_get("price_in_usd").map_err(db_err)?;
    let price_in_usd = Decimal::from_str(&price_raw)
        .map_err(|e| CoinwatchError::Database(format!("bad price {price_raw:?}: {e}")))?;
    let last_updated: Option<String> = row.try_get("last_updated").map_err(db_err)?;

    Ok(CryptoRecord {
        id: row.try_get("id").map_err(db_err)?,
        symbol: row.try_get("symbol").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        price_in_usd,
        last_updated: last_updated.as_deref().and_then(parse_timestamp),
    })
}

fn rows_to_records(rows: &[SqliteRow]) -> Result<Vec<CryptoRecord>> {
    Ok(rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?)
}

#[async_trait]
impl CoinStore for SqliteStore {
    async fn upsert_many(&self, records: &[CryptoRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "INSERT INTO {t} (id, symbol, name, price_in_usd, last_updated)
             VALUES (?, ?, ?, ?, COALESCE(?, {NOW_SQL}))
             ON CONFLICT(id) DO UPDATE SET
                symbol = excluded.symbol,
                name = excluded.name,
                price_in_usd = excluded.price_in_usd,
                last_updated = excluded.last_updated",
            t = self.table
        );

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for r in records {
            sqlx::query(&sql)
                .bind(&r.id)
                .bind(normalize_symbol(&r.symbol))
                .bind(&r.name)
                .bind(r.price_in_usd.to_string())
                .bind(r.last_updated.map(|ts| ts.to_rfc3339()))
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        debug!(count = records.len(), "SQLite upsert complete");
        Ok(records.len())
    }

    async fn list_all(&self) -> Result<Vec<CryptoRecord>> {
        let sql = format!("SELECT * FROM {} ORDER BY id", self.table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(db_err)?;
        rows_to_records(&rows)
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>> {
        let sql = format!("SELECT * FROM {} WHERE symbol = ? ORDER BY id LIMIT 1", self.table);
        let row = sqlx::query(&sql)
            .bind(normalize_symbol(symbol))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(row_to_record).transpose()?)
    }

    async fn insert(&self, record: &CryptoRecord) -> Result<CryptoRecord> {
        let sql = format!(
            "INSERT INTO {t} (id, symbol, name, price_in_usd, last_updated)
             VALUES (?, ?, ?, ?, COALESCE(?, {NOW_SQL}))
             RETURNING *",
            t = self.table
        );
        let row = sqlx::query(&sql)
            .bind(&record.id)
            .bind(normalize_symbol(&record.symbol))
            .bind(&record.name)
            .bind(record.price_in_usd.to_string())
            .bind(record.last_updated.map(|ts| ts.to_rfc3339()))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row_to_record(&row)?)
    }

    async fn update_price(&self, symbol: &str, price: Decimal) -> Result<Option<CryptoRecord>> {
        let sql = format!(
            "UPDATE {t} SET price_in_usd = ?, last_updated = {NOW_SQL}
             WHERE symbol = ? RETURNING *",
            t = self.table
        );
        let rows = sqlx::query(&sql)
            .bind(price.to_string())
            .bind(normalize_symbol(symbol))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows_to_records(&rows)?.into_iter().next())
    }

    async fn delete_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>> {
        let sql = format!("DELETE FROM {} WHERE symbol = ? RETURNING *", self.table);
        let rows = sqlx::query(&sql)
            .bind(normalize_symbol(symbol))
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows_to_records(&rows)?.into_iter().next())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn btc(price: Decimal) -> CryptoRecord {
        CryptoRecord::new("bitcoin", "btc", "Bitcoin", price)
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row_with_second_price() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_many(&[btc(dec!(60000))]).await.unwrap();
        store.upsert_many(&[btc(dec!(65000.55))]).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].price_in_usd, dec!(65000.55));
        assert_eq!(all[0].symbol, "BTC");
    }

    #[tokio::test]
    async fn test_upsert_empty_is_noop() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.upsert_many(&[]).await.unwrap(), 0);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_keeps_source_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        let ts = Utc.with_ymd_and_hms(2026, 2, 21, 12, 0, 0).unwrap();
        store.upsert_many(&[btc(dec!(1)).with_last_updated(ts)]).await.unwrap();
        let row = store.get_by_symbol("BTC").await.unwrap().unwrap();
        assert_eq!(row.last_updated, Some(ts));
    }

    #[tokio::test]
    async fn test_database_defaults_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        let row = store.insert(&btc(dec!(1))).await.unwrap();
        assert!(row.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_get_by_symbol_case_insensitive_and_missing() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.upsert_many(&[btc(dec!(1))]).await.unwrap();
        assert!(store.get_by_symbol("btc").await.unwrap().is_some());
        assert!(store.get_by_symbol("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_is_database_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&btc(dec!(1))).await.unwrap();
        let err = store.insert(&btc(dec!(2))).await.unwrap_err();
        assert_eq!(crate::types::error_category(&err), "database");
    }

    #[tokio::test]
    async fn test_update_price() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&btc(dec!(1))).await.unwrap();
        let updated = store.update_price("btc", dec!(2.5)).await.unwrap().unwrap();
        assert_eq!(updated.price_in_usd, dec!(2.5));
        assert!(store.update_price("ZZZ", dec!(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_delete_missing() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert(&btc(dec!(1))).await.unwrap();
        let deleted = store.delete_by_symbol("BTC").await.unwrap().unwrap();
        assert_eq!(deleted.id, "bitcoin");
        assert!(store.delete_by_symbol("BTC").await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_table_name() {
        assert!(SqliteStore::connect("sqlite::memory:", "coins; DROP TABLE x").await.is_err());
        assert!(checked_table_name("1coins").is_err());
        assert!(checked_table_name("crypto_2").is_ok());
    }
}

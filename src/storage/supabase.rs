//! Supabase backend.
//!
//! Talks to the table through Supabase's PostgREST endpoint:
//! `{SUPABASE_URL}/rest/v1/{table}`.
//! Auth: the project key in both the `apikey` and bearer headers.
//! Filters use PostgREST syntax (`symbol=eq.BTC`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::CoinStore;
use crate::config::DatabaseCredentials;
use crate::types::{normalize_symbol, CoinwatchError, CryptoRecord};

const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=minimal";
const PREFER_RETURN: &str = "return=representation";

pub struct SupabaseStore {
    http: Client,
    rest_url: String,
    key: SecretString,
}

/// Upsert payload row. PostgREST rejects a bulk body whose objects have
/// different key sets, so every row carries `last_updated`.
#[derive(Debug, Serialize)]
struct UpsertRow<'a> {
    id: &'a str,
    symbol: String,
    name: &'a str,
    price_in_usd: Decimal,
    last_updated: DateTime<Utc>,
}

fn upsert_rows(records: &[CryptoRecord], now: DateTime<Utc>) -> Vec<UpsertRow<'_>> {
    records
        .iter()
        .map(|r| UpsertRow {
            id: &r.id,
            symbol: normalize_symbol(&r.symbol),
            name: &r.name,
            price_in_usd: r.price_in_usd,
            last_updated: r.last_updated.unwrap_or(now),
        })
        .collect()
}

/// Decode a PostgREST row array.
fn parse_rows(body: &[u8]) -> Result<Vec<CryptoRecord>> {
    let rows: Vec<CryptoRecord> = serde_json::from_slice(body)
        .map_err(|e| CoinwatchError::Database(format!("unexpected row shape: {e}")))?;
    Ok(rows)
}

impl SupabaseStore {
    pub fn new(creds: &DatabaseCredentials, table: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build Supabase HTTP client")?;

        Ok(Self {
            http,
            rest_url: format!("{}/rest/v1/{}", creds.url.trim_end_matches('/'), table),
            key: creds.key.clone(),
        })
    }

    /// Request against the table with auth headers and an optional query string.
    fn request(&self, method: Method, query: &str) -> RequestBuilder {
        let url = if query.is_empty() {
            self.rest_url.clone()
        } else {
            format!("{}?{}", self.rest_url, query)
        };
        self.http
            .request(method, url)
            .header("apikey", self.key.expose_secret())
            .bearer_auth(self.key.expose_secret())
            .header("Content-Type", "application/json")
    }

    fn symbol_filter(symbol: &str) -> String {
        format!("symbol=eq.{}", urlencoding::encode(&normalize_symbol(symbol)))
    }

    fn upsert_request(&self, records: &[CryptoRecord]) -> RequestBuilder {
        self.request(Method::POST, "on_conflict=id")
            .header("Prefer", PREFER_UPSERT)
            .json(&upsert_rows(records, Utc::now()))
    }

    fn list_request(&self) -> RequestBuilder {
        self.request(Method::GET, "select=*&order=id.asc")
    }

    fn by_symbol_request(&self, symbol: &str) -> RequestBuilder {
        let query = format!("select=*&{}&limit=1", Self::symbol_filter(symbol));
        self.request(Method::GET, &query)
    }

    fn insert_request(&self, record: &CryptoRecord) -> RequestBuilder {
        let body = CryptoRecord {
            symbol: normalize_symbol(&record.symbol),
            ..record.clone()
        };
        self.request(Method::POST, "")
            .header("Prefer", PREFER_RETURN)
            .json(&body)
    }

    fn update_price_request(&self, symbol: &str, price: Decimal) -> RequestBuilder {
        self.request(Method::PATCH, &Self::symbol_filter(symbol))
            .header("Prefer", PREFER_RETURN)
            .json(&json!({ "price_in_usd": price, "last_updated": Utc::now() }))
    }

    fn delete_request(&self, symbol: &str) -> RequestBuilder {
        self.request(Method::DELETE, &Self::symbol_filter(symbol))
            .header("Prefer", PREFER_RETURN)
    }

    async fn send(builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| CoinwatchError::Database(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CoinwatchError::Database(format!("HTTP {status}: {body}")).into());
        }
        Ok(resp)
    }

    async fn rows(builder: RequestBuilder) -> Result<Vec<CryptoRecord>> {
        let body = Self::send(builder)
            .await?
            .bytes()
            .await
            .map_err(|e| CoinwatchError::Database(format!("read body failed: {e}")))?;
        parse_rows(&body)
    }
}

#[async_trait]
impl CoinStore for SupabaseStore {
    async fn upsert_many(&self, records: &[CryptoRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        Self::send(self.upsert_request(records)).await?;

        debug!(count = records.len(), "Supabase upsert complete");
        Ok(records.len())
    }

    async fn list_all(&self) -> Result<Vec<CryptoRecord>> {
        Self::rows(self.list_request()).await
    }

    async fn get_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>> {
        let rows = Self::rows(self.by_symbol_request(symbol)).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(&self, record: &CryptoRecord) -> Result<CryptoRecord> {
        let rows = Self::rows(self.insert_request(record)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| CoinwatchError::Database("insert returned no rows".into()).into())
    }

    async fn update_price(&self, symbol: &str, price: Decimal) -> Result<Option<CryptoRecord>> {
        let rows = Self::rows(self.update_price_request(symbol, price)).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_by_symbol(&self, symbol: &str) -> Result<Option<CryptoRecord>> {
        let rows = Self::rows(self.delete_request(symbol)).await?;
        Ok(rows.into_iter().next())
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

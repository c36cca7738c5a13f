//! CoinGecko market data integration.
//!
//! API docs: https://docs.coingecko.com/reference/coins-markets
//! Endpoint: `GET /api/v3/coins/markets`
//! Auth: demo key via the `x_cg_demo_api_key` query param.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::config::MarketDataConfig;
use crate::types::{CoinwatchError, CryptoRecord};

// ---------------------------------------------------------------------------
// API response types (CoinGecko JSON → Rust)
// ---------------------------------------------------------------------------

/// One element of the `/coins/markets` array. Every field is optional
/// here so a missing field surfaces as a validation error naming the
/// coin rather than as an opaque parse failure.
#[derive(Debug, Deserialize)]
struct CoinGeckoMarket {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    last_updated: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct CoinGeckoClient {
    http: Client,
    base_url: Url,
    vs_currency: String,
    api_key: SecretString,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketDataConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build CoinGecko HTTP client")?;

        let base_url = Url::parse(&format!(
            "{}/coins/markets",
            config.base_url.trim_end_matches('/')
        ))
        .with_context(|| format!("Invalid market data base URL: {}", config.base_url))?;

        Ok(Self {
            http,
            base_url,
            vs_currency: config.vs_currency.clone(),
            api_key,
        })
    }

    /// Build the `/coins/markets` URL for the top `count` coins.
    fn markets_url(&self, count: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("vs_currency", &self.vs_currency)
            .append_pair("order", "market_cap_desc")
            .append_pair("per_page", &count.to_string())
            .append_pair("page", "1")
            .append_pair("sparkline", "false")
            .append_pair("x_cg_demo_api_key", self.api_key.expose_secret());
        url
    }

    /// Shape-check the raw response into records. Any invalid element
    /// fails the whole batch.
    fn validate(raw: Vec<CoinGeckoMarket>) -> Result<Vec<CryptoRecord>, CoinwatchError> {
        raw.into_iter()
            .enumerate()
            .map(|(idx, m)| Self::validate_one(idx, m))
            .collect()
    }

    fn validate_one(idx: usize, m: CoinGeckoMarket) -> Result<CryptoRecord, CoinwatchError> {
        let field = |value: Option<String>, name: &str| -> Result<String, CoinwatchError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(CoinwatchError::Validation(format!(
                    "coin #{idx}: missing or empty `{name}`"
                ))),
            }
        };

        let id = field(m.id, "id")?;
        let symbol = field(m.symbol, "symbol")?;
        let name = field(m.name, "name")?;

        let price = m
            .current_price
            .and_then(Decimal::from_f64)
            .ok_or_else(|| {
                CoinwatchError::Validation(format!("coin #{idx} ({id}): missing `current_price`"))
            })?;

        let mut record = CryptoRecord::new(id, &symbol, name, price);

        if let Some(ts) = m.last_updated {
            let parsed = DateTime::parse_from_rfc3339(&ts).map_err(|e| {
                CoinwatchError::Validation(format!(
                    "coin #{idx} ({}): bad `last_updated` {ts:?}: {e}",
                    record.id
                ))
            })?;
            record = record.with_last_updated(parsed.with_timezone(&Utc));
        }

        Ok(record)
    }
}

// ---------------------------------------------------------------------------
// MarketDataSource trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn fetch_top_coins(&self, count: u32) -> Result<Vec<CryptoRecord>> {
        debug!(count, "Fetching CoinGecko markets");

        let resp = self
            .http
            .get(self.markets_url(count))
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| CoinwatchError::MarketData(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CoinwatchError::MarketData(format!("HTTP {status}: {body}")).into());
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| CoinwatchError::MarketData(format!("read body failed: {e}")))?;

        let raw: Vec<CoinGeckoMarket> = serde_json::from_slice(&body).map_err(|e| {
            CoinwatchError::Validation(format!("response is not a list of coins: {e}"))
        })?;

        let records = Self::validate(raw)?;
        info!(count = records.len(), "Fetched and validated CoinGecko market data");
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

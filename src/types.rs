//! Shared types for coinwatch.
//!
//! The single persisted entity is a [`CryptoRecord`], one row of the
//! `cryptocurrencies` table. Both the poller and the MCP server speak
//! in terms of this type, so it lives here rather than in either binary.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Cryptocurrency record
// ---------------------------------------------------------------------------

/// One row of the `cryptocurrencies` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoRecord {
    /// Primary key, e.g. "bitcoin".
    pub id: String,
    /// Ticker symbol, stored upper-case, e.g. "BTC".
    pub symbol: String,
    /// Display name, e.g. "Bitcoin".
    pub name: String,
    pub price_in_usd: Decimal,
    /// Omitted on write so the database default applies. Accepts RFC 3339
    /// or a naive ISO-8601 timestamp (read as UTC) on the way in.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_timestamp"
    )]
    pub last_updated: Option<DateTime<Utc>>,
}

impl CryptoRecord {
    /// Build a record with a normalised (upper-case) symbol.
    pub fn new(
        id: impl Into<String>,
        symbol: &str,
        name: impl Into<String>,
        price_in_usd: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: normalize_symbol(symbol),
            name: name.into(),
            price_in_usd,
            last_updated: None,
        }
    }

    pub fn with_last_updated(mut self, ts: DateTime<Utc>) -> Self {
        self.last_updated = Some(ts);
        self
    }

    #[cfg(test)]
    pub fn sample(id: &str) -> Self {
        Self::new(id, &id[..id.len().min(4)], id, Decimal::ONE)
    }
}

impl fmt::Display for CryptoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) ${}", self.name, self.symbol, self.price_in_usd)?;
        if let Some(ts) = self.last_updated {
            write!(f, " @ {}", ts.format("%Y-%m-%d %H:%M:%S UTC"))?;
        }
        Ok(())
    }
}

/// Symbols are stored and looked up upper-case so poller rows and
/// tool-server lookups agree.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Parse a database timestamp. `timestamp without time zone` columns
/// come back without an offset; those are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw:?}"))),
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for coinwatch.
#[derive(Debug, thiserror::Error)]
pub enum CoinwatchError {
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error ({model}): {message}")]
    Llm { model: String, message: String },

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoinwatchError {
    /// Short category label used in cycle failure logs.
    pub fn category(&self) -> &'static str {
        match self {
            CoinwatchError::MarketData(_) => "api",
            CoinwatchError::Validation(_) => "validation",
            CoinwatchError::Database(_) => "database",
            CoinwatchError::Llm { .. } => "llm",
            CoinwatchError::Agent(_) => "agent",
            CoinwatchError::Config(_) => "config",
            CoinwatchError::NotFound(_) => "not_found",
        }
    }
}

/// Classify an `anyhow` error by the first `CoinwatchError` in its chain.
pub fn error_category(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|e| e.downcast_ref::<CoinwatchError>())
        .map(CoinwatchError::category)
        .unwrap_or("other")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

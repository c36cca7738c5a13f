//! Market data sources.
//!
//! Defines the `MarketDataSource` trait and the CoinGecko implementation
//! used by the poller's agent tool.

pub mod coingecko;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::CryptoRecord;

/// Abstraction over a top-N-by-market-cap feed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch and shape-validate the top `count` coins, ranked by market cap.
    async fn fetch_top_coins(&self, count: u32) -> Result<Vec<CryptoRecord>>;
}

//! Tools the agent can call.

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::llm::ToolSpec;
use crate::market::MarketDataSource;
use crate::types::CryptoRecord;

pub const FETCH_TOP_COINS: &str = "fetch_top_coins_data";

/// Fetches the top-N coins by market cap and returns validated records.
///
/// Takes no arguments: the coin count is fixed by configuration so a
/// model cannot shrink the poll and fake a wave of exits.
pub struct FetchTopCoinsTool {
    source: Arc<dyn MarketDataSource>,
    count: u32,
}

impl FetchTopCoinsTool {
    pub fn new(source: Arc<dyn MarketDataSource>, count: u32) -> Self {
        Self { source, count }
    }

    pub fn name(&self) -> &'static str {
        FETCH_TOP_COINS
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: FETCH_TOP_COINS.to_string(),
            description: format!(
                "Fetches current market data (id, symbol, name, USD price, last update) \
                 for the top {} cryptocurrencies by market capitalisation.",
                self.count
            ),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    pub async fn invoke(&self, _arguments: &Value) -> Result<Vec<CryptoRecord>> {
        info!(tool = FETCH_TOP_COINS, count = self.count, "Agent triggered tool");
        self.source.fetch_top_coins(self.count).await
    }

    /// Compact description of a tool result, for logs.
    pub fn summarize(records: &[CryptoRecord]) -> String {
        json!({
            "count": records.len(),
            "ids": records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        })
        .to_string()
    }
}

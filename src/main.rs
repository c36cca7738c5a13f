//! coinwatch: top-N crypto price poller.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects the market data source and the database, and runs the
//! agent-driven poll loop until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use coinwatch::agent::tools::FetchTopCoinsTool;
use coinwatch::agent::Agent;
use coinwatch::config::AppConfig;
use coinwatch::engine::Poller;
use coinwatch::llm::openai::OpenAiCompatClient;
use coinwatch::logging::{init_logging, LogTarget};
use coinwatch::market::coingecko::CoinGeckoClient;
use coinwatch::storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging(LogTarget::Stdout);

    let cfg = AppConfig::load_or_default("config.toml")?;

    info!(
        interval_secs = cfg.agent.poll_interval_secs,
        top_n = cfg.agent.top_n,
        backend = ?cfg.database.backend,
        "coinwatch starting up"
    );

    // -- Initialise components -------------------------------------------

    let api_key = cfg
        .market_data_key()
        .context("CRYPTO_API_KEY not found in environment variables")?;
    let source = Arc::new(CoinGeckoClient::new(&cfg.market_data, api_key)?);
    let tool = FetchTopCoinsTool::new(source, cfg.agent.top_n);

    let store = storage::open_store(&cfg).await?;

    let agent = if cfg.llm.enabled {
        let client = OpenAiCompatClient::new(&cfg.llm, cfg.llm_api_key())?;
        info!(model = %cfg.llm.model, base_url = %cfg.llm.base_url, "Using chat model");
        Agent::new(Box::new(client), tool, cfg.agent.max_steps)
    } else {
        warn!("LLM disabled, fetch tool will be called directly");
        Agent::direct(tool)
    };

    let mut poller = Poller::new(agent, store, cfg.agent.prompt.clone());

    // -- Main loop -------------------------------------------------------

    info!(
        interval_secs = cfg.agent.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    poller
        .run_until(
            Duration::from_secs(cfg.agent.poll_interval_secs),
            tokio::signal::ctrl_c(),
        )
        .await;

    info!(cycles = poller.cycle_count(), "coinwatch shut down cleanly.");
    Ok(())
}

//! coinwatch-mcp: MCP tool server over the cryptocurrency table.
//!
//! Logs go to stderr so the stdio transport keeps stdout for protocol
//! frames.

use anyhow::Result;
use tracing::info;

use coinwatch::config::{AppConfig, Transport};
use coinwatch::logging::{init_logging, LogTarget};
use coinwatch::mcp::{self, McpServer};
use coinwatch::storage;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    init_logging(LogTarget::Stderr);

    let cfg = AppConfig::load_or_default("config.toml")?;
    let store = storage::open_store(&cfg).await?;
    let server = McpServer::new(store, cfg.server.name.clone());

    info!(name = %cfg.server.name, transport = ?cfg.server.transport, "Starting MCP server");

    match cfg.server.transport {
        Transport::Stdio => mcp::stdio::serve(&server).await,
        Transport::Http => mcp::http::serve(server, cfg.server.port).await,
    }
}

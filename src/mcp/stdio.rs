//! Stdio transport: one JSON-RPC frame per line on stdin, replies on stdout.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use super::server::McpServer;

/// Serve stdin/stdout until stdin closes.
pub async fn serve(server: &McpServer) -> Result<()> {
    info!(name = server.name(), "MCP server listening on stdio");
    serve_io(server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Request loop over any line reader / writer pair, in arrival order.
pub async fn serve_io<R, W>(server: &McpServer, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read request")? {
        if let Some(reply) = server.handle_line(&line).await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    info!("stdin closed, MCP server stopping");
    Ok(())
}

//! HTTP transport: axum server with `POST /mcp` and `GET /health`.
//!
//! Each POST body is one JSON-RPC frame. Notifications get `202 Accepted`
//! with an empty body. CORS is open for local tooling.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::server::McpServer;

/// Build the Axum router with all routes and middleware.
pub fn build_router(server: McpServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/health", get(health))
        .layer(cors)
        .with_state(server)
}

/// Serve until the process is stopped.
pub async fn serve(server: McpServer, port: u16) -> Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind MCP port {port}"))?;

    info!(port, name = server.name(), "MCP server listening on http://localhost:{port}/mcp");

    axum::serve(listener, build_router(server))
        .await
        .context("MCP HTTP server error")
}

async fn handle_rpc(State(server): State<McpServer>, body: String) -> Response {
    match server.handle_line(&body).await {
        Some(text) => ([(header::CONTENT_TYPE, "application/json")], text).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn health(State(server): State<McpServer>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "name": server.name() }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

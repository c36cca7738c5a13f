//! JSON-RPC dispatch for the MCP tool server.

use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::rpc::{RpcRequest, RpcResponse};
use super::tools;
use crate::storage::CoinStore;
use crate::types::CoinwatchError;

pub const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Clone)]
pub struct McpServer {
    store: Arc<dyn CoinStore>,
    name: String,
}

impl McpServer {
    pub fn new(store: Arc<dyn CoinStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one request. Notifications yield `None`.
    pub async fn handle(&self, request: RpcRequest) -> Option<RpcResponse> {
        debug!(method = %request.method, "Received JSON-RPC request");

        if request.is_notification() {
            debug!(method = %request.method, "Notification, no response");
            return None;
        }

        if request.jsonrpc != "2.0" {
            return Some(RpcResponse::invalid_request(
                request.id,
                "Unsupported jsonrpc version (expected 2.0)",
            ));
        }

        let id = request.id.clone();
        let response = match request.method.as_str() {
            "initialize" => RpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": {
                        "name": self.name,
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            ),
            "ping" => RpcResponse::success(id, json!({})),
            "tools/list" => RpcResponse::success(id, json!({ "tools": tools::definitions() })),
            "tools/call" => self.handle_tool_call(id, request.params).await,
            other => {
                warn!(method = other, "Unknown JSON-RPC method");
                RpcResponse::method_not_found(id, other)
            }
        };
        Some(response)
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> RpcResponse {
        let Some(Value::Object(params)) = params else {
            return RpcResponse::invalid_params(id, "params must be an object with name");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return RpcResponse::invalid_params(id, "params.name must be a string");
        };
        let args = match params.get("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args.clone(),
            Some(_) => return RpcResponse::invalid_params(id, "params.arguments must be an object"),
        };

        match tools::call(self.store.as_ref(), name, &args).await {
            Ok(value) => RpcResponse::success(id, tool_result(value, false)),
            Err(err) => match err.downcast_ref::<CoinwatchError>() {
                Some(CoinwatchError::Validation(msg)) | Some(CoinwatchError::NotFound(msg)) => {
                    RpcResponse::invalid_params(id, msg.clone())
                }
                _ => {
                    error!(tool = name, error = %err, "Tool call failed");
                    RpcResponse::success(id, tool_result(Value::String(format!("{err:#}")), true))
                }
            },
        }
    }

    /// Handle one newline-delimited frame; returns the serialized reply.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let response = match serde_json::from_str::<Value>(line) {
            Err(e) => Some(RpcResponse::parse_error(format!("Parse error: {e}"))),
            Ok(raw) => {
                let id = raw.get("id").cloned().filter(|v| !v.is_null());
                match serde_json::from_value::<RpcRequest>(raw) {
                    Ok(request) => self.handle(request).await,
                    Err(e) => Some(RpcResponse::invalid_request(id, format!("Invalid request: {e}"))),
                }
            }
        }?;

        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                error!(error = %e, "Failed to serialize response");
                None
            }
        }
    }
}

/// MCP tool result: JSON text content plus the structured value.
fn tool_result(value: Value, is_error: bool) -> Value {
    let text = match &value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": { "result": value },
        "isError": is_error,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

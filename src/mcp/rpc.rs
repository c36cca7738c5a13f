use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: Option<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Requests without an id get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Option<Value>,
}

impl RpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::error(None, PARSE_ERROR, message)
    }

    pub fn invalid_request(id: Option<Value>, message: impl Into<String>) -> Self {
        Self::error(id, INVALID_REQUEST, message)
    }

    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(id, METHOD_NOT_FOUND, format!("Method '{method}' not found"))
    }

    pub fn invalid_params(id: Option<Value>, message: impl Into<String>) -> Self {
        Self::error(id, INVALID_PARAMS, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_omits_error() {
        let text = serde_json::to_string(&RpcResponse::success(Some(json!(1)), json!({}))).unwrap();
        assert!(!text.contains("error"));
        assert!(text.contains("\"jsonrpc\":\"2.0\""));
    }

    #[test]
    fn test_missing_id_is_notification() {
        let req: RpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_none());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcResponse::parse_error("x").error.unwrap().code, -32700);
        assert_eq!(RpcResponse::method_not_found(None, "nope").error.unwrap().code, -32601);
    }
}

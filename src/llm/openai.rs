//! OpenAI-compatible chat-completions client with tool calling.
//!
//! Targets any server that speaks the `/v1/chat/completions` format,
//! including a local Ollama instance (`http://localhost:11434/v1`).
//! One attempt per call; failures are reported to the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatMessage, ChatModel, ModelTurn, ToolCall, ToolSpec};
use crate::config::LlmConfig;
use crate::types::CoinwatchError;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// OpenAI sends a JSON-encoded string; some compatible servers send
    /// an object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec,
}

#[derive(Debug, Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u32,
}

fn function_type() -> String {
    "function".to_string()
}

// ---------------------------------------------------------------------------
// Wire conversion
// ---------------------------------------------------------------------------

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        match msg {
            ChatMessage::System(text) => WireMessage {
                role: "system".into(),
                content: Some(text.clone()),
                ..Default::default()
            },
            ChatMessage::User(text) => WireMessage {
                role: "user".into(),
                content: Some(text.clone()),
                ..Default::default()
            },
            ChatMessage::Assistant { content, tool_calls } => WireMessage {
                role: "assistant".into(),
                content: content.clone(),
                tool_calls: tool_calls
                    .iter()
                    .map(|c| WireToolCall {
                        id: Some(c.id.clone()),
                        kind: function_type(),
                        function: WireFunctionCall {
                            name: c.name.clone(),
                            arguments: Value::String(c.arguments.to_string()),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            },
            ChatMessage::Tool { tool_call_id, content } => WireMessage {
                role: "tool".into(),
                content: Some(content.clone()),
                tool_call_id: Some(tool_call_id.clone()),
                ..Default::default()
            },
        }
    }
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        WireTool {
            kind: "function",
            function: WireFunctionSpec {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.parameters.clone(),
            },
        }
    }
}

/// Normalise tool-call arguments to a JSON object.
fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::String(s) if s.trim().is_empty() => json!({}),
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        Value::Null => json!({}),
        other => other,
    }
}

fn into_turn(body: ChatResponse) -> ModelTurn {
    let message = body.choices.into_iter().next().and_then(|c| c.message);
    let tokens_used = body.usage.map(|u| u.total_tokens).unwrap_or(0);

    let Some(message) = message else {
        return ModelTurn {
            tokens_used,
            ..ModelTurn::default()
        };
    };

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|c| ToolCall {
            id: c
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: c.function.name,
            arguments: decode_arguments(c.function.arguments),
        })
        .collect();

    ModelTurn {
        content: message.content.filter(|c| !c.trim().is_empty()),
        tool_calls,
        tokens_used,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiCompatClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
        }
    }

    fn llm_error(&self, message: String) -> CoinwatchError {
        CoinwatchError::Llm {
            model: self.model.clone(),
            message,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelTurn> {
        let request = self.build_request(messages, tools);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "LLM request");

        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.llm_error(format!("request error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.llm_error(format!("HTTP {status}: {error_text}")).into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.llm_error(format!("failed to parse response: {e}")))?;

        let turn = into_turn(body);
        debug!(
            model = %self.model,
            tool_calls = turn.tool_calls.len(),
            tokens = turn.tokens_used,
            "LLM response"
        );
        Ok(turn)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiCompatClient {
        OpenAiCompatClient::new(&LlmConfig::default(), None).unwrap()
    }

    fn fetch_spec() -> ToolSpec {
        ToolSpec {
            name: "fetch_top_coins_data".into(),
            description: "Fetch top coins".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn test_client_construction() {
        let c = client();
        assert_eq!(c.model_name(), "llama3.2");
        assert_eq!(c.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn test_request_serialization_with_tools() {
        let c = client();
        let req = c.build_request(
            &[ChatMessage::System("sys".into()), ChatMessage::User("hi".into())],
            &[fetch_spec()],
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "fetch_top_coins_data");
        assert!(json["messages"][1].get("tool_calls").is_none());
    }

    #[test]
    fn test_request_omits_empty_tools() {
        let req = client().build_request(&[ChatMessage::User("hi".into())], &[]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_tool_result_message_wire_shape() {
        let msg = WireMessage::from(&ChatMessage::Tool {
            tool_call_id: "call_1".into(),
            content: "[]".into(),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
    }

    #[test]
    fn test_assistant_tool_call_round_trips_arguments_as_string() {
        let msg = WireMessage::from(&ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call_1".into(),
                name: "fetch_top_coins_data".into(),
                arguments: json!({}),
            }],
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(json["tool_calls"][0]["type"], "function");
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {"name": "fetch_top_coins_data", "arguments": "{\"count\": 50}"}
                }]
            }}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        let turn = into_turn(body);
        assert!(turn.wants_tools());
        assert!(turn.content.is_none());
        assert_eq!(turn.tokens_used, 15);
        assert_eq!(turn.tool_calls[0].id, "call_abc");
        assert_eq!(turn.tool_calls[0].arguments["count"], 50);
    }

    #[test]
    fn test_parse_object_arguments_and_missing_id() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {
                "role": "assistant",
                "tool_calls": [{"function": {"name": "fetch_top_coins_data", "arguments": {}}}]
            }}]
        }))
        .unwrap();
        let turn = into_turn(body);
        assert!(turn.tool_calls[0].id.starts_with("call_"));
        assert_eq!(turn.tool_calls[0].arguments, json!({}));
    }

    #[test]
    fn test_parse_text_only_response() {
        let body: ChatResponse = serde_json::from_value(json!({
            "choices": [{"message": {"role": "assistant", "content": "Done."}}]
        }))
        .unwrap();
        let turn = into_turn(body);
        assert!(!turn.wants_tools());
        assert_eq!(turn.content.as_deref(), Some("Done."));
    }

    #[test]
    fn test_parse_empty_choices() {
        let body: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert_eq!(into_turn(body), ModelTurn::default());
    }

    #[test]
    fn test_decode_arguments() {
        assert_eq!(decode_arguments(Value::String(String::new())), json!({}));
        assert_eq!(decode_arguments(Value::Null), json!({}));
        assert_eq!(decode_arguments(json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(decode_arguments(json!("not json")), json!("not json"));
    }
}

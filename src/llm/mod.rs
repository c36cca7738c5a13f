//! LLM integration for tool-calling agents.
//!
//! Defines the `ChatModel` trait and the message types exchanged with it.
//! The only implementation is an OpenAI-compatible chat-completions client,
//! which also covers a local Ollama server.

pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A tool the model may call, described by a JSON schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// The model's reply to one `complete` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tokens_used: u32,
}

impl ModelTurn {
    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Abstraction over chat models that support function/tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the transcript and the available tools; return the next turn.
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ModelTurn>;

    /// Model identifier string.
    fn model_name(&self) -> &str;
}

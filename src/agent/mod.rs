//! Tool-calling agent that drives each poll.
//!
//! The agent sends the configured prompt to a chat model together with
//! the `fetch_top_coins_data` tool. When the model calls the tool, the
//! tool's validated records become the run's output; the model is never
//! asked to re-emit market data. Without a model (direct mode) the tool
//! is invoked straight away.

pub mod tools;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel};
use crate::types::{CoinwatchError, CryptoRecord};
use tools::FetchTopCoinsTool;

const SYSTEM_PROMPT: &str = "You are a market data assistant. When asked for cryptocurrency \
market data, call the `fetch_top_coins_data` tool. Do not invent prices.";

/// Result of one agent run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub records: Vec<CryptoRecord>,
    /// Model turns taken (0 in direct mode).
    pub steps: u32,
    pub tokens_used: u32,
}

pub struct Agent {
    model: Option<Box<dyn ChatModel>>,
    tool: FetchTopCoinsTool,
    max_steps: u32,
}

impl Agent {
    /// Agent that consults `model` before calling its tool.
    pub fn new(model: Box<dyn ChatModel>, tool: FetchTopCoinsTool, max_steps: u32) -> Self {
        Self {
            model: Some(model),
            tool,
            max_steps: max_steps.max(1),
        }
    }

    /// Agent that calls its tool without a model.
    pub fn direct(tool: FetchTopCoinsTool) -> Self {
        Self {
            model: None,
            tool,
            max_steps: 1,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.model_name())
    }

    /// Coin count the tool requests per poll.
    pub fn requested_count(&self) -> u32 {
        self.tool.count()
    }

    /// Run the agent for one prompt and return the tool's records.
    pub async fn run(&self, prompt: &str) -> Result<AgentRun> {
        let Some(model) = self.model.as_deref() else {
            let records = self.tool.invoke(&serde_json::Value::Null).await?;
            return Ok(AgentRun {
                records,
                steps: 0,
                tokens_used: 0,
            });
        };

        info!(model = model.model_name(), prompt, "Sending prompt to agent");

        let specs = [self.tool.spec()];
        let mut messages = vec![
            ChatMessage::System(SYSTEM_PROMPT.to_string()),
            ChatMessage::User(prompt.to_string()),
        ];
        let mut tokens_used = 0u32;

        for step in 1..=self.max_steps {
            let turn = model.complete(&messages, &specs).await?;
            tokens_used += turn.tokens_used;

            if !turn.wants_tools() {
                debug!(step, reply = ?turn.content, "Model replied without a tool call");
                messages.push(ChatMessage::Assistant {
                    content: turn.content,
                    tool_calls: Vec::new(),
                });
                messages.push(ChatMessage::User(format!(
                    "Call the `{}` tool to answer.",
                    self.tool.name()
                )));
                continue;
            }

            messages.push(ChatMessage::Assistant {
                content: turn.content.clone(),
                tool_calls: turn.tool_calls.clone(),
            });

            for call in &turn.tool_calls {
                if call.name != self.tool.name() {
                    warn!(tool = %call.name, "Model requested an unknown tool");
                    messages.push(ChatMessage::Tool {
                        tool_call_id: call.id.clone(),
                        content: format!("error: unknown tool `{}`", call.name),
                    });
                    continue;
                }

                let records = self.tool.invoke(&call.arguments).await?;
                debug!(step, result = %FetchTopCoinsTool::summarize(&records), "Tool returned");
                return Ok(AgentRun {
                    records,
                    steps: step,
                    tokens_used,
                });
            }
        }

        Err(CoinwatchError::Agent(format!(
            "model did not call `{}` within {} steps",
            self.tool.name(),
            self.max_steps
        ))
        .into())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

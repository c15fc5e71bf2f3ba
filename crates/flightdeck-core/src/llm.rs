//! Chat-model seam for structured tool calls.
//!
//! The pipeline never reads free-form model text. It describes the exact
//! argument shape it wants as a [`ToolSpec`] and asks a [`ChatModel`] to
//! answer with one call to that tool.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A function-calling tool definition.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the tool arguments.
    pub parameters: Value,
}

impl ToolSpec {
    /// Convert to the OpenAI `tools[]` entry format.
    pub fn to_openai_format(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

/// A language model that can be constrained to a single tool call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send one system + user exchange and return the arguments of the
    /// model's call to `tool`.
    ///
    /// Returns `Ok(None)` when the model answered without calling the tool,
    /// and `Err` for transport, API or decoding failures.
    async fn call_tool(&self, system: &str, user: &str, tool: &ToolSpec) -> Result<Option<Value>>;
}

//! OpenAI-compatible chat client for forced tool calls.
//!
//! [`OpenAiChat`] implements [`ChatModel`] by posting one
//! `chat/completions` request with a single tool and a `tool_choice` that
//! forces it. Requests run at temperature 0 with a per-request timeout and
//! are never retried: callers have deterministic fallbacks.
//!
//! Some compatible servers answer with the arguments as message content
//! (often fenced in markdown) instead of a tool call. A JSON object found
//! there is accepted as the arguments.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use flightdeck_core::llm::{ChatModel, ToolSpec};

#[derive(Debug, Error)]
pub enum ModelError {
    /// Client could not be constructed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection failed or timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response.
    #[error("API error: {0}")]
    Api(String),

    /// Response body or tool arguments were not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Chat model reached over HTTP.
pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.models.timeout_secs))
            .build()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url: format!(
                "{}/chat/completions",
                config.models.base_url.trim_end_matches('/')
            ),
            model: config.models.chat_model.clone(),
            api_key: config.models.api_key.clone(),
        })
    }

    fn request_body(&self, system: &str, user: &str, tool: &ToolSpec) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "tools": [tool.to_openai_format()],
            "tool_choice": {"type": "function", "function": {"name": tool.name}}
        })
    }

    async fn send(&self, body: &Value) -> Result<Value, ModelError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn call_tool(&self, system: &str, user: &str, tool: &ToolSpec) -> Result<Option<Value>> {
        debug!(model = %self.model, tool = %tool.name, "Sending tool request");
        let body = self.request_body(system, user, tool);
        let response = self.send(&body).await?;
        Ok(parse_tool_response(&response, &tool.name)?)
    }
}

/// Pull the arguments of the first call to `tool_name` out of a
/// `chat/completions` response.
///
/// Falls back to a JSON object in the message content. Returns `Ok(None)`
/// when neither is present.
pub fn parse_tool_response(response: &Value, tool_name: &str) -> Result<Option<Value>, ModelError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| ModelError::Parse("response has no choices[0].message".to_string()))?;

    let calls = message
        .get("tool_calls")
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for call in calls {
        let function = match call.get("function") {
            Some(f) => f,
            None => continue,
        };
        if function.get("name").and_then(|n| n.as_str()) != Some(tool_name) {
            continue;
        }
        return match function.get("arguments") {
            Some(Value::String(raw)) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| ModelError::Parse(format!("{} arguments: {}", tool_name, e))),
            Some(obj @ Value::Object(_)) => Ok(Some(obj.clone())),
            _ => Ok(None),
        };
    }

    if let Some(content) = message.get("content").and_then(|c| c.as_str()) {
        if let Ok(obj @ Value::Object(_)) = serde_json::from_str::<Value>(strip_code_blocks(content)) {
            debug!(tool = %tool_name, "Using JSON message content as tool arguments");
            return Ok(Some(obj));
        }
    }

    Ok(None)
}

/// Strip markdown code fences from a response.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call_response(name: &str, args: &str) -> Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": name, "arguments": args}
                    }]
                }
            }]
        })
    }

    #[test]
    fn test_parses_tool_call_arguments() {
        let resp = tool_call_response("parse_filters", r#"{"airline": "AirTransat"}"#);
        let args = parse_tool_response(&resp, "parse_filters").unwrap().unwrap();
        assert_eq!(args["airline"], "AirTransat");
    }

    #[test]
    fn test_other_tool_is_ignored() {
        let resp = tool_call_response("something_else", "{}");
        assert!(parse_tool_response(&resp, "parse_filters").unwrap().is_none());
    }

    #[test]
    fn test_invalid_arguments_are_parse_error() {
        let resp = tool_call_response("extract_fields", "{not json");
        let err = parse_tool_response(&resp, "extract_fields").unwrap_err();
        assert!(matches!(err, ModelError::Parse(_)));
    }

    #[test]
    fn test_fenced_content_is_accepted() {
        let resp = json!({
            "choices": [{"message": {"content": "```json\n{\"Who\": \"Jane\"}\n```"}}]
        });
        let args = parse_tool_response(&resp, "extract_fields").unwrap().unwrap();
        assert_eq!(args["Who"], "Jane");
    }

    #[test]
    fn test_plain_text_content_is_none() {
        let resp = json!({"choices": [{"message": {"content": "I cannot help with that."}}]});
        assert!(parse_tool_response(&resp, "extract_fields").unwrap().is_none());
    }

    #[test]
    fn test_missing_choices_is_error() {
        assert!(parse_tool_response(&json!({}), "x").is_err());
    }

    #[test]
    fn test_request_forces_tool() {
        let chat = OpenAiChat::new(&Config::default()).unwrap();
        let tool = ToolSpec {
            name: "parse_filters".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        };
        let body = chat.request_body("sys", "usr", &tool);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["tool_choice"]["function"]["name"], "parse_filters");
        assert_eq!(body["tools"][0]["function"]["name"], "parse_filters");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_error() {
        let mut cfg = Config::default();
        cfg.models.base_url = "http://127.0.0.1:9".into();
        cfg.models.timeout_secs = 2;
        let chat = OpenAiChat::new(&cfg).unwrap();
        let tool = ToolSpec {
            name: "t".into(),
            description: "d".into(),
            parameters: json!({"type": "object"}),
        };
        assert!(chat.call_tool("s", "u", &tool).await.is_err());
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {\"a\":1} "), "{\"a\":1}");
    }
}

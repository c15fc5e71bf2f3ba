//! Natural-language request → retrieval filters.
//!
//! The primary path asks the chat model for one `parse_filters` tool call
//! and accepts its arguments as-is. Any failure (transport error, timeout,
//! missing call, arguments that do not fit [`Filters`]) switches to a
//! keyword heuristic that cannot fail.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{ChatModel, ToolSpec};

pub const PARSE_FILTERS_TOOL: &str = "parse_filters";

const FILTERS_SYSTEM_PROMPT: &str = "You parse the user's request into structured filters by calling \
the 'parse_filters' tool. Return the tool call only.";

/// Structured retrieval hints for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Filters {
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub training_type: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub export_parquet: bool,
}

fn null_as_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(d)?.unwrap_or(false))
}

/// Where a [`Filters`] value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The model produced valid tool arguments.
    Parsed(Filters),
    /// The model path failed and the keyword heuristic was applied.
    Fallback { filters: Filters, reason: String },
}

impl FilterOutcome {
    pub fn filters(&self) -> &Filters {
        match self {
            Self::Parsed(f) => f,
            Self::Fallback { filters, .. } => filters,
        }
    }

    pub fn into_filters(self) -> Filters {
        match self {
            Self::Parsed(f) => f,
            Self::Fallback { filters, .. } => filters,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Deterministic keyword heuristic used when the model path fails.
pub fn fallback_filters(prompt: &str) -> Filters {
    let p = prompt.to_lowercase();
    let airline = if p.contains("virgin") {
        Some("VirginAir Australia".to_string())
    } else if p.contains("airtransat") {
        Some("AirTransat".to_string())
    } else {
        None
    };
    let training_type = p
        .contains("training")
        .then(|| "Flight Training".to_string());

    Filters {
        airline,
        training_type,
        limit: None,
        export_parquet: p.contains("parquet"),
    }
}

/// Tool definition offered to the model.
pub fn parse_filters_tool() -> ToolSpec {
    ToolSpec {
        name: PARSE_FILTERS_TOOL.to_string(),
        description: "Parse a natural language request for pilot training records into structured filters."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "airline": {
                    "type": ["string", "null"],
                    "description": "Airline name if specified."
                },
                "training_type": {
                    "type": ["string", "null"],
                    "description": "Training type (e.g., 'Flight Training') if specified."
                },
                "limit": {
                    "type": ["integer", "null"],
                    "description": "Limit the number of records."
                },
                "export_parquet": {
                    "type": "boolean",
                    "description": "Whether to export the result as a Parquet file."
                }
            },
            "additionalProperties": false
        }),
    }
}

/// Turns a prompt into [`Filters`] via the chat model.
pub struct FilterParser<'a> {
    model: &'a dyn ChatModel,
}

impl<'a> FilterParser<'a> {
    pub fn new(model: &'a dyn ChatModel) -> Self {
        Self { model }
    }

    /// Parse filters, never failing.
    pub async fn parse(&self, prompt: &str) -> FilterOutcome {
        let tool = parse_filters_tool();
        let reason = match self.model.call_tool(FILTERS_SYSTEM_PROMPT, prompt, &tool).await {
            Ok(Some(args)) => match filters_from_args(args) {
                Ok(filters) => {
                    debug!(?filters, "Parsed filters from model");
                    return FilterOutcome::Parsed(filters);
                }
                Err(e) => format!("invalid {} arguments: {}", PARSE_FILTERS_TOOL, e),
            },
            Ok(None) => format!("model did not call {}", PARSE_FILTERS_TOOL),
            Err(e) => format!("model call failed: {:#}", e),
        };

        warn!(%reason, "Falling back to keyword filters");
        FilterOutcome::Fallback {
            filters: fallback_filters(prompt),
            reason,
        }
    }
}

/// Parse raw tool arguments, for callers that already hold them.
pub fn filters_from_args(args: Value) -> Result<Filters, serde_json::Error> {
    if !args.is_object() {
        return Err(serde::de::Error::custom(format!(
            "expected an object of arguments, got {}",
            json_kind(&args)
        )));
    }
    serde_json::from_value(args)
}

/// Name of a JSON value's type, for argument errors.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

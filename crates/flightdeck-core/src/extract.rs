//! Per-document field extraction.
//!
//! Each candidate's verbatim source text is handed to the chat model, which
//! must answer with one `extract_fields` call carrying exactly the seven
//! requested keys. Arguments are validated into [`RawExtraction`] and then
//! normalized: `Role` and `Autoland` through their vocabularies, everything
//! else through [`normalize_missing`]. A failed or malformed call yields a
//! row of `"not found"` values instead of an error; only a manifest miss
//! aborts.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::filters::json_kind;
use crate::llm::{ChatModel, ToolSpec};
use crate::manifest::{Manifest, ManifestError};
use crate::models::{value_text, ChunkMetadata, ExtractedRow, NOT_FOUND};
use crate::normalize::{normalize_boolish, normalize_missing, normalize_role};

pub const EXTRACT_FIELDS_TOOL: &str = "extract_fields";

/// Wire names of the extracted keys, in output order.
pub const REQUESTED_FIELDS: [&str; 7] = ["Who", "Role", "Aircraft", "From", "To", "Duration", "Autoland"];

const EXTRACT_SYSTEM_PROMPT: &str = "You extract seven fields from an arbitrary JSON document by calling \
the 'extract_fields' tool. If any field is missing or ambiguous, set its value to 'not found'. \
Requested keys: Who, Role, Aircraft, From, To, Duration, Autoland. \
For the route, From is the departure location or airport code and To is the arrival location \
or airport code.";

/// Tool arguments as the model sent them, before normalization.
///
/// Values may be any JSON scalar; they are stringified before
/// normalization. Unknown keys make the whole call invalid.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawExtraction {
    #[serde(rename = "Who", default)]
    pub who: Option<Value>,
    #[serde(rename = "Role", default)]
    pub role: Option<Value>,
    #[serde(rename = "Aircraft", default)]
    pub aircraft: Option<Value>,
    #[serde(rename = "From", alias = "From_", default)]
    pub from: Option<Value>,
    #[serde(rename = "To", default)]
    pub to: Option<Value>,
    #[serde(rename = "Duration", default)]
    pub duration: Option<Value>,
    #[serde(rename = "Autoland", default)]
    pub autoland: Option<Value>,
}

fn arg_text(v: &Option<Value>) -> Option<String> {
    match v {
        None | Some(Value::Null) => None,
        Some(v) => Some(value_text(v)),
    }
}

/// The seven normalized output fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    #[serde(rename = "Who")]
    pub who: String,
    #[serde(rename = "Role")]
    pub role: String,
    #[serde(rename = "Aircraft")]
    pub aircraft: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Duration")]
    pub duration: String,
    #[serde(rename = "Autoland")]
    pub autoland: String,
}

impl ExtractedFields {
    pub fn not_found() -> Self {
        let nf = || NOT_FOUND.to_string();
        Self {
            who: nf(),
            role: nf(),
            aircraft: nf(),
            from: nf(),
            to: nf(),
            duration: nf(),
            autoland: nf(),
        }
    }

    pub fn normalized(raw: &RawExtraction) -> Self {
        let missing = |v: &Option<Value>| normalize_missing(arg_text(v).as_deref());
        Self {
            who: missing(&raw.who),
            role: normalize_role(arg_text(&raw.role).as_deref()),
            aircraft: missing(&raw.aircraft),
            from: missing(&raw.from),
            to: missing(&raw.to),
            duration: missing(&raw.duration),
            autoland: normalize_boolish(arg_text(&raw.autoland).as_deref()),
        }
    }

    /// Validate and normalize raw tool arguments.
    ///
    /// Only a JSON object is accepted; derived deserializers would otherwise
    /// fill fields positionally from an array.
    pub fn from_tool_args(args: Value) -> Result<Self, serde_json::Error> {
        if !args.is_object() {
            return Err(serde::de::Error::custom(format!(
                "expected an object of arguments, got {}",
                json_kind(&args)
            )));
        }
        let raw: RawExtraction = serde_json::from_value(args)?;
        Ok(Self::normalized(&raw))
    }

    /// Complete the row with the candidate's classification metadata.
    pub fn into_row(self, candidate: &ChunkMetadata) -> ExtractedRow {
        ExtractedRow {
            who: self.who,
            role: self.role,
            aircraft: self.aircraft,
            from: self.from,
            to: self.to,
            duration: self.duration,
            autoland: self.autoland,
            airline: candidate.airline.clone(),
            training_type: candidate.training_type.clone(),
            document_type: candidate.document_type.clone(),
            timestamp: candidate.timestamp.clone(),
            doc_id: candidate.doc_id.clone(),
        }
    }
}

/// Result of one model extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Extracted(ExtractedFields),
    /// The model path failed; every field is `"not found"`.
    Defaulted { reason: String },
}

impl ExtractionOutcome {
    pub fn into_fields(self) -> ExtractedFields {
        match self {
            Self::Extracted(f) => f,
            Self::Defaulted { .. } => ExtractedFields::not_found(),
        }
    }
}

/// Tool definition offered to the model.
pub fn extract_fields_tool() -> ToolSpec {
    let field = |description: &str| json!({"type": ["string", "null"], "description": description});
    ToolSpec {
        name: EXTRACT_FIELDS_TOOL.to_string(),
        description: "Return a JSON object with the requested keys extracted from the provided raw JSON \
(seen in the chat). If a field is missing or ambiguous, set it to 'not found'."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "Who": field("Pilot/person name or 'not found'"),
                "Role": field("PF/PM/other or 'not found'"),
                "Aircraft": field("Aircraft type or 'not found'"),
                "From": field("Departure airport code or 'not found'"),
                "To": field("Arrival airport code or 'not found'"),
                "Duration": field("Duration or 'not found'"),
                "Autoland": field("'true'/'false'/'not found'")
            },
            "required": REQUESTED_FIELDS,
            "additionalProperties": false
        }),
    }
}

/// User message carrying the raw document.
pub fn extraction_user_prompt(raw_text: &str) -> String {
    format!("JSON:\n```json\n{}\n```", raw_text)
}

/// Populates [`ExtractedRow`]s for retrieved candidates.
pub struct Extractor<'a> {
    model: &'a dyn ChatModel,
    manifest: &'a Manifest,
    concurrency: usize,
}

impl<'a> Extractor<'a> {
    pub fn new(model: &'a dyn ChatModel, manifest: &'a Manifest, concurrency: usize) -> Self {
        Self {
            model,
            manifest,
            concurrency: concurrency.max(1),
        }
    }

    /// Ask the model for the seven fields of one document.
    pub async fn extract_fields(&self, raw_text: &str) -> ExtractionOutcome {
        let tool = extract_fields_tool();
        let user = extraction_user_prompt(raw_text);
        match self.model.call_tool(EXTRACT_SYSTEM_PROMPT, &user, &tool).await {
            Ok(Some(args)) => match ExtractedFields::from_tool_args(args) {
                Ok(fields) => ExtractionOutcome::Extracted(fields),
                Err(e) => ExtractionOutcome::Defaulted {
                    reason: format!("invalid {} arguments: {}", EXTRACT_FIELDS_TOOL, e),
                },
            },
            Ok(None) => ExtractionOutcome::Defaulted {
                reason: format!("model did not call {}", EXTRACT_FIELDS_TOOL),
            },
            Err(e) => ExtractionOutcome::Defaulted {
                reason: format!("model call failed: {:#}", e),
            },
        }
    }

    /// Extract one row. Fails only when the candidate is missing from the manifest.
    pub async fn extract(&self, candidate: &ChunkMetadata) -> Result<ExtractedRow, ManifestError> {
        let raw_text = self.manifest.raw_text(&candidate.doc_id)?;
        let outcome = self.extract_fields(raw_text).await;
        match &outcome {
            ExtractionOutcome::Extracted(_) => debug!(doc_id = %candidate.doc_id, "Extracted fields"),
            ExtractionOutcome::Defaulted { reason } => {
                warn!(doc_id = %candidate.doc_id, %reason, "Extraction defaulted to not found")
            }
        }
        Ok(outcome.into_fields().into_row(candidate))
    }

    /// Extract every candidate, at most `concurrency` model calls in
    /// flight. Output order matches `candidates`.
    pub async fn extract_all(&self, candidates: &[ChunkMetadata]) -> Result<Vec<ExtractedRow>, ManifestError> {
        stream::iter(candidates)
            .map(|c| self.extract(c))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classification, ManifestRow};
    use anyhow::Result;
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn candidate(doc: &str) -> ChunkMetadata {
        ChunkMetadata {
            doc_id: doc.into(),
            chunk_id: 0,
            airline: "AirTransat".into(),
            training_type: "Flight Training".into(),
            document_type: "col1".into(),
            timestamp: "2024-02-02".into(),
        }
    }

    fn manifest(docs: &[&str]) -> Manifest {
        let labels = Classification {
            airline: "AirTransat".into(),
            training_type: "Flight Training".into(),
            document_type: "col1".into(),
            timestamp: "2024-02-02".into(),
        };
        Manifest::from_rows(
            docs.iter()
                .map(|d| ManifestRow::new(d, d, &labels, format!("{{\"doc\": \"{}\"}}", d))),
        )
    }

    struct Fixed(Result<Option<Value>, String>);

    #[async_trait]
    impl ChatModel for Fixed {
        async fn call_tool(&self, _s: &str, user: &str, tool: &ToolSpec) -> Result<Option<Value>> {
            assert_eq!(tool.name, EXTRACT_FIELDS_TOOL);
            assert!(user.starts_with("JSON:\n```json\n"));
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    /// Returns `Pending` once after scheduling a wake-up.
    async fn yield_once() {
        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                std::task::Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                std::task::Poll::Pending
            }
        })
        .await
    }

    /// Echoes the document id back as `Who`, yielding to the executor a
    /// varying number of times so completions arrive out of order.
    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for Echo {
        async fn call_tool(&self, _s: &str, user: &str, _t: &ToolSpec) -> Result<Option<Value>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            for _ in 0..(10 - n % 10) {
                yield_once().await;
            }
            let doc: Value = serde_json::from_str(
                user.trim_start_matches("JSON:\n```json\n").trim_end_matches("\n```"),
            )?;
            Ok(Some(json!({"Who": doc["doc"]})))
        }
    }

    #[test]
    fn test_normalizes_model_values() {
        let fields = ExtractedFields::from_tool_args(json!({
            "Who": "  Jane Doe ",
            "Role": "Pilot Flying",
            "Aircraft": "A330",
            "From": "YUL",
            "To": "",
            "Duration": 2.5,
            "Autoland": "Yes"
        }))
        .unwrap();
        assert_eq!(fields.who, "Jane Doe");
        assert_eq!(fields.role, "PF");
        assert_eq!(fields.to, "not found");
        assert_eq!(fields.duration, "2.5");
        assert_eq!(fields.autoland, "true");
    }

    #[test]
    fn test_missing_keys_and_nulls_are_not_found() {
        let fields = ExtractedFields::from_tool_args(json!({"Who": null, "Role": "N/A"})).unwrap();
        assert_eq!(fields, ExtractedFields::not_found());
    }

    #[test]
    fn test_from_alias_accepted() {
        let fields = ExtractedFields::from_tool_args(json!({"From_": "CUN"})).unwrap();
        assert_eq!(fields.from, "CUN");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(ExtractedFields::from_tool_args(json!({"Who": "x", "Seat": "1A"})).is_err());
    }

    #[test]
    fn test_failed_call_yields_not_found_row() {
        let m = manifest(&["a.json"]);
        let model = Fixed(Err("timeout".into()));
        let row = block_on(Extractor::new(&model, &m, 1).extract(&candidate("a.json"))).unwrap();
        assert_eq!(row.who, "not found");
        assert_eq!(row.role, "not found");
        assert_eq!(row.aircraft, "not found");
        assert_eq!(row.from, "not found");
        assert_eq!(row.to, "not found");
        assert_eq!(row.duration, "not found");
        assert_eq!(row.autoland, "not found");
        assert_eq!(row.airline, "AirTransat");
        assert_eq!(row.training_type, "Flight Training");
        assert_eq!(row.document_type, "col1");
        assert_eq!(row.timestamp, "2024-02-02");
        assert_eq!(row.doc_id, "a.json");
    }

    #[test]
    fn test_no_tool_call_is_defaulted() {
        let m = manifest(&["a.json"]);
        let model = Fixed(Ok(None));
        let out = block_on(Extractor::new(&model, &m, 1).extract_fields("{}"));
        assert!(matches!(out, ExtractionOutcome::Defaulted { .. }));
    }

    #[test]
    fn test_malformed_args_are_defaulted() {
        let m = manifest(&["a.json"]);
        let model = Fixed(Ok(Some(json!(["not", "an", "object"]))));
        let row = block_on(Extractor::new(&model, &m, 1).extract(&candidate("a.json"))).unwrap();
        for value in [&row.who, &row.role, &row.aircraft, &row.from, &row.to, &row.duration, &row.autoland] {
            assert_eq!(value, "not found");
        }
    }

    #[test]
    fn test_non_object_args_rejected() {
        for args in [json!(["not", "an", "object"]), json!("Who: Ann"), json!(7), Value::Null] {
            let err = ExtractedFields::from_tool_args(args.clone()).unwrap_err();
            assert!(err.to_string().contains("expected an object"), "{}: {}", args, err);
        }
    }

    #[test]
    fn test_manifest_miss_is_fatal() {
        let m = manifest(&["a.json"]);
        let model = Fixed(Ok(Some(json!({"Who": "x"}))));
        let err = block_on(Extractor::new(&model, &m, 1).extract(&candidate("ghost.json"))).unwrap_err();
        assert_eq!(
            err,
            ManifestError::MissingDocument {
                doc_id: "ghost.json".into()
            }
        );
    }

    #[test]
    fn test_concurrent_extraction_preserves_order() {
        let docs: Vec<String> = (0..12).map(|i| format!("doc{}.json", i)).collect();
        let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
        let m = manifest(&refs);
        let model = Echo {
            calls: AtomicUsize::new(0),
        };
        let candidates: Vec<ChunkMetadata> = refs.iter().map(|d| candidate(d)).collect();
        let rows = block_on(Extractor::new(&model, &m, 4).extract_all(&candidates)).unwrap();
        let who: Vec<&str> = rows.iter().map(|r| r.who.as_str()).collect();
        assert_eq!(who, refs);
        assert!(rows.iter().all(|r| r.doc_id == r.who));
    }

    #[test]
    fn test_zero_candidates_zero_rows() {
        let m = manifest(&[]);
        let model = Fixed(Ok(None));
        assert!(block_on(Extractor::new(&model, &m, 3).extract_all(&[])).unwrap().is_empty());
    }
}

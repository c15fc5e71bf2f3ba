//! Core data models shared by ingestion and query.
//!
//! Every classification value is a plain string; anything absent or empty
//! is represented by the [`NOT_FOUND`] sentinel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel for absent or unresolvable values.
pub const NOT_FOUND: &str = "not found";

fn not_found() -> String {
    NOT_FOUND.to_string()
}

/// Render a JSON value as a plain string.
///
/// Strings are returned without quotes; every other value uses its
/// compact JSON form (`true`, `12.5`, `null`, `{"a":1}`).
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Classification labels read from a source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub airline: String,
    pub training_type: String,
    pub document_type: String,
    pub timestamp: String,
}

impl Classification {
    /// Read `Airline`, `TrainingType`, `Type` and `Date` from a document.
    ///
    /// When `Date` is missing the `fallback_timestamp` (the file's
    /// modification date) is used instead of the sentinel.
    pub fn from_document(doc: &Value, fallback_timestamp: &str) -> Self {
        let timestamp = match label_field(doc, "Date") {
            t if t == NOT_FOUND => fallback_timestamp.to_string(),
            t => t,
        };
        Self {
            airline: label_field(doc, "Airline"),
            training_type: label_field(doc, "TrainingType"),
            document_type: label_field(doc, "Type"),
            timestamp,
        }
    }
}

/// Look up a top-level key, mapping absent, null and empty values to the sentinel.
pub fn label_field(doc: &Value, key: &str) -> String {
    match doc.get(key) {
        None | Some(Value::Null) => not_found(),
        Some(Value::String(s)) if s.is_empty() => not_found(),
        Some(v) => value_text(v),
    }
}

/// Metadata attached to every indexed chunk.
///
/// `doc_id` joins back to [`ManifestRow::doc_id`]. An empty `doc_id` means
/// the entry carries no usable document reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub doc_id: String,
    #[serde(default)]
    pub chunk_id: usize,
    #[serde(default = "not_found")]
    pub airline: String,
    #[serde(default = "not_found")]
    pub training_type: String,
    #[serde(default = "not_found")]
    pub document_type: String,
    #[serde(default = "not_found")]
    pub timestamp: String,
}

impl ChunkMetadata {
    pub fn new(doc_id: &str, chunk_id: usize, labels: &Classification) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            chunk_id,
            airline: labels.airline.clone(),
            training_type: labels.training_type.clone(),
            document_type: labels.document_type.clone(),
            timestamp: labels.timestamp.clone(),
        }
    }
}

/// One persisted row per ingested document.
///
/// `raw_text` is the verbatim file content, never re-serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRow {
    pub doc_id: String,
    pub path: String,
    pub airline: String,
    pub training_type: String,
    pub document_type: String,
    pub timestamp: String,
    pub raw_text: String,
}

impl ManifestRow {
    /// Column order of the persisted manifest table.
    pub const COLUMNS: [&'static str; 7] = [
        "doc_id",
        "path",
        "airline",
        "training_type",
        "document_type",
        "timestamp",
        "raw_text",
    ];

    pub fn new(doc_id: &str, path: &str, labels: &Classification, raw_text: String) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            path: path.to_string(),
            airline: labels.airline.clone(),
            training_type: labels.training_type.clone(),
            document_type: labels.document_type.clone(),
            timestamp: labels.timestamp.clone(),
            raw_text,
        }
    }

    pub fn values(&self) -> [&str; 7] {
        [
            &self.doc_id,
            &self.path,
            &self.airline,
            &self.training_type,
            &self.document_type,
            &self.timestamp,
            &self.raw_text,
        ]
    }
}

/// A nearest-neighbour result from a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Squared L2 distance to the query vector.
    pub distance: f32,
}

/// One normalized output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedRow {
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
    pub airline: String,
    pub training_type: String,
    pub document_type: String,
    pub timestamp: String,
    pub doc_id: String,
}

impl ExtractedRow {
    /// Output column order, shared by the console table and the export file.
    pub const COLUMNS: [&'static str; 12] = [
        "Who",
        "Role",
        "Aircraft",
        "From",
        "To",
        "Duration",
        "Autoland",
        "airline",
        "training_type",
        "document_type",
        "timestamp",
        "doc_id",
    ];

    pub fn values(&self) -> [&str; 12] {
        [
            &self.who,
            &self.role,
            &self.aircraft,
            &self.from,
            &self.to,
            &self.duration,
            &self.autoland,
            &self.airline,
            &self.training_type,
            &self.document_type,
            &self.timestamp,
            &self.doc_id,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification_reads_labels() {
        let doc = json!({
            "Airline": "AirTransat",
            "TrainingType": "Flight Training",
            "Type": "col1",
            "Date": "2024-03-01"
        });
        let c = Classification::from_document(&doc, "2000-01-01");
        assert_eq!(c.airline, "AirTransat");
        assert_eq!(c.training_type, "Flight Training");
        assert_eq!(c.document_type, "col1");
        assert_eq!(c.timestamp, "2024-03-01");
    }

    #[test]
    fn test_classification_missing_date_uses_fallback() {
        let doc = json!({"Airline": "AirTransat"});
        let c = Classification::from_document(&doc, "2023-11-05");
        assert_eq!(c.timestamp, "2023-11-05");
        assert_eq!(c.training_type, NOT_FOUND);
        assert_eq!(c.document_type, NOT_FOUND);
    }

    #[test]
    fn test_label_field_null_empty_and_scalars() {
        let doc = json!({"a": null, "b": "", "c": 7, "d": true});
        assert_eq!(label_field(&doc, "a"), NOT_FOUND);
        assert_eq!(label_field(&doc, "b"), NOT_FOUND);
        assert_eq!(label_field(&doc, "c"), "7");
        assert_eq!(label_field(&doc, "d"), "true");
        assert_eq!(label_field(&json!([1, 2]), "a"), NOT_FOUND);
    }

    #[test]
    fn test_chunk_metadata_defaults_when_fields_missing() {
        let md: ChunkMetadata = serde_json::from_value(json!({"chunk_id": 2})).unwrap();
        assert_eq!(md.doc_id, "");
        assert_eq!(md.chunk_id, 2);
        assert_eq!(md.airline, NOT_FOUND);
        assert_eq!(md.timestamp, NOT_FOUND);
    }

    #[test]
    fn test_extracted_row_serializes_wire_names() {
        let row = ExtractedRow {
            who: "A".into(),
            role: "PF".into(),
            aircraft: "B737".into(),
            from: "YUL".into(),
            to: "CUN".into(),
            duration: "1h".into(),
            autoland: "true".into(),
            airline: "AirTransat".into(),
            training_type: "Flight Training".into(),
            document_type: "col1".into(),
            timestamp: "2024-01-01".into(),
            doc_id: "a.json".into(),
        };
        let v = serde_json::to_value(&row).unwrap();
        assert_eq!(v["From"], "YUL");
        assert_eq!(v["doc_id"], "a.json");
        assert_eq!(row.values()[3], "YUL");
        assert_eq!(ExtractedRow::COLUMNS[3], "From");
    }
}

//! In-memory view of the document manifest.
//!
//! The manifest maps each `doc_id` to its classification labels and the
//! verbatim source text. Persistence is handled by the app crate; this type
//! only provides lookup.

use std::collections::HashMap;

use thiserror::Error;

use crate::models::ManifestRow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    /// A `doc_id` reached through the index has no manifest row. The index
    /// and manifest were not written together.
    #[error("document '{doc_id}' is indexed but missing from the manifest")]
    MissingDocument { doc_id: String },
}

/// Manifest rows keyed by `doc_id`.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    rows: HashMap<String, ManifestRow>,
}

impl Manifest {
    /// Build from rows. A later row with a repeated `doc_id` replaces the earlier one.
    pub fn from_rows(rows: impl IntoIterator<Item = ManifestRow>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.doc_id.clone(), r)).collect(),
        }
    }

    pub fn get(&self, doc_id: &str) -> Option<&ManifestRow> {
        self.rows.get(doc_id)
    }

    /// Verbatim source text for `doc_id`.
    pub fn raw_text(&self, doc_id: &str) -> Result<&str, ManifestError> {
        self.rows
            .get(doc_id)
            .map(|r| r.raw_text.as_str())
            .ok_or_else(|| ManifestError::MissingDocument {
                doc_id: doc_id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;

    fn row(id: &str, raw: &str) -> ManifestRow {
        let labels = Classification {
            airline: "A".into(),
            training_type: "T".into(),
            document_type: "D".into(),
            timestamp: "2024-01-01".into(),
        };
        ManifestRow::new(id, id, &labels, raw.to_string())
    }

    #[test]
    fn test_lookup_raw_text() {
        let m = Manifest::from_rows(vec![row("a.json", "{\"x\": \"é\\\"\"}"), row("b.json", "{}")]);
        assert_eq!(m.len(), 2);
        assert_eq!(m.raw_text("a.json").unwrap(), "{\"x\": \"é\\\"\"}");
    }

    #[test]
    fn test_missing_document_is_error() {
        let m = Manifest::from_rows(vec![row("a.json", "{}")]);
        assert_eq!(
            m.raw_text("zzz.json"),
            Err(ManifestError::MissingDocument {
                doc_id: "zzz.json".into()
            })
        );
    }
}

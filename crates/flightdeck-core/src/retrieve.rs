//! Candidate retrieval: nearest chunks → one entry per document.
//!
//! # Algorithm
//!
//! 1. Query the index for the `top_k` nearest chunks to the prompt.
//! 2. Walk hits in similarity order, skipping any whose airline or training
//!    type disagrees (case-insensitively) with a set filter.
//! 3. Skip hits with no `doc_id` and documents already accepted.
//!
//! A document ranks by its closest chunk. Post-filtering can leave fewer
//! than `top_k` candidates; the index is not re-queried to make up the
//! difference.

use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

use crate::filters::Filters;
use crate::index::VectorIndex;
use crate::models::{ChunkMetadata, IndexHit};

/// Case-insensitive label match. An unset or empty filter matches everything.
fn label_matches(wanted: Option<&str>, actual: &str) -> bool {
    match wanted {
        Some(w) if !w.is_empty() => w.to_lowercase() == actual.to_lowercase(),
        _ => true,
    }
}

/// Filter and de-duplicate ordered hits into candidates.
pub fn select_candidates(
    hits: impl IntoIterator<Item = IndexHit>,
    filters: &Filters,
    cap: usize,
) -> Vec<ChunkMetadata> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    for hit in hits {
        if candidates.len() >= cap {
            break;
        }
        let md = hit.metadata;
        if !label_matches(filters.airline.as_deref(), &md.airline) {
            continue;
        }
        if !label_matches(filters.training_type.as_deref(), &md.training_type) {
            continue;
        }
        if md.doc_id.is_empty() || seen.contains(&md.doc_id) {
            continue;
        }
        seen.insert(md.doc_id.clone());
        candidates.push(md);
    }

    candidates
}

/// Queries a [`VectorIndex`] and selects candidate documents.
pub struct Retriever<'a> {
    index: &'a dyn VectorIndex,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a dyn VectorIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub async fn retrieve(&self, filters: &Filters, prompt: &str) -> Result<Vec<ChunkMetadata>> {
        let hits = self.index.query(prompt, self.top_k).await?;
        let hit_count = hits.len();
        let candidates = select_candidates(hits, filters, self.top_k);
        debug!(
            hits = hit_count,
            candidates = candidates.len(),
            "Selected retrieval candidates"
        );
        Ok(candidates)
    }
}

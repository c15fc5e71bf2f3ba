//! Vector index abstraction and an exact flat index.
//!
//! [`FlatIndex`] is a brute-force nearest-neighbour structure over dense
//! vectors: every query scans every entry and orders by squared L2
//! distance. [`MemoryIndex`] pairs it with an [`Embedder`] for tests and
//! ephemeral use; the app crate persists the same entries to SQLite.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{embed_one, l2_distance, Embedder};
use crate::models::{ChunkMetadata, IndexHit};

/// A text-queryable nearest-neighbour store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` entries ordered by ascending distance to `text`.
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>>;

    /// Number of indexed chunks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One stored chunk with its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector: Vec<f32>,
}

/// Exact nearest-neighbour search over all entries.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl FlatIndex {
    /// Build from entries. All vectors must share one dimensionality.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self> {
        let dims = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().position(|e| e.vector.len() != dims) {
            bail!(
                "Index entry {} has {} dimensions, expected {}",
                bad,
                entries[bad].vector.len(),
                dims
            );
        }
        Ok(Self { entries, dims })
    }

    /// Zip texts, metadata and vectors into a flat index.
    pub fn from_parts(
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if texts.len() != metadatas.len() || texts.len() != vectors.len() {
            bail!(
                "Index input length mismatch: {} texts, {} metadatas, {} vectors",
                texts.len(),
                metadatas.len(),
                vectors.len()
            );
        }
        let entries = texts
            .into_iter()
            .zip(metadatas)
            .zip(vectors)
            .map(|((text, metadata), vector)| IndexEntry {
                text,
                metadata,
                vector,
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` nearest entries to `query_vec`. Equal distances keep
    /// insertion order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<IndexHit> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, l2_distance(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| IndexHit {
                text: self.entries[i].text.clone(),
                metadata: self.entries[i].metadata.clone(),
                distance,
            })
            .collect()
    }
}

/// A [`FlatIndex`] that embeds query text with its own [`Embedder`].
pub struct MemoryIndex {
    flat: FlatIndex,
    embedder: Arc<dyn Embedder>,
}

impl MemoryIndex {
    pub fn new(flat: FlatIndex, embedder: Arc<dyn Embedder>) -> Self {
        Self { flat, embedder }
    }

    /// Embed `texts` and index them with their metadata.
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
    ) -> Result<Self> {
        let vectors = embedder.embed(&texts).await?;
        let flat = FlatIndex::from_parts(texts, metadatas, vectors)?;
        Ok(Self { flat, embedder })
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(&self, text: &str, k: usize) -> Result<Vec<IndexHit>> {
        if self.flat.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_one(self.embedder.as_ref(), text).await?;
        Ok(self.flat.search(&query_vec, k))
    }

    fn len(&self) -> usize {
        self.flat.len()
    }
}

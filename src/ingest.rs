//! Ingestion: source folders → index + manifest.
//!
//! Every run is a full rebuild. All files are read, parsed and digested
//! first; a single unreadable or malformed file aborts the run before
//! anything is written. The index is then built and the manifest saved,
//! so every indexed `doc_id` has a manifest row.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::SqliteIndex;
use crate::manifest::save_manifest;
use flightdeck_core::digest::{digest_for_embedding, DigestOptions};
use flightdeck_core::embedding::Embedder;
use flightdeck_core::models::{ChunkMetadata, Classification, ManifestRow};

/// Counts reported after a successful ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub files: usize,
    pub chunks: usize,
    pub index_dir: PathBuf,
}

/// One source file, ready to be indexed.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub row: ManifestRow,
    pub chunks: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
}

/// CLI entry point for `fdk ingest`.
pub async fn run_ingest(config: &Config, folders: &[PathBuf]) -> Result<()> {
    let embedder = create_embedder(config)?;
    match ingest_folders(config, embedder, folders).await? {
        Some(summary) => println!(
            "Ingested {} files; stored {} chunks into {}",
            summary.files,
            summary.chunks,
            summary.index_dir.display()
        ),
        None => println!("No JSON files found."),
    }
    Ok(())
}

/// Ingest every `*.json` file directly inside `folders`.
///
/// Returns `None`, leaving existing state untouched, when no files match.
pub async fn ingest_folders(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    folders: &[PathBuf],
) -> Result<Option<IngestSummary>> {
    let files = scan_json_files(folders)?;
    if files.is_empty() {
        return Ok(None);
    }
    info!(files = files.len(), "Ingesting JSON files");

    let opts = config.digest.options();
    let mut rows = Vec::with_capacity(files.len());
    let mut texts = Vec::new();
    let mut metadatas = Vec::new();
    for path in &files {
        let doc = prepare_document(path, &opts)?;
        debug!(doc_id = %doc.row.doc_id, chunks = doc.chunks.len(), "Digested document");
        texts.extend(doc.chunks);
        metadatas.extend(doc.metadatas);
        rows.push(doc.row);
    }

    let chunk_count = texts.len();
    let index_dir = config.storage.index_dir();
    SqliteIndex::build(
        &index_dir,
        embedder,
        texts,
        metadatas,
        config.embedding.batch_size,
    )
    .await?;
    save_manifest(&config.storage.manifest_path(), &rows)?;

    Ok(Some(IngestSummary {
        files: rows.len(),
        chunks: chunk_count,
        index_dir,
    }))
}

/// List `*.json` files directly inside each folder, de-duplicated and sorted.
pub fn scan_json_files(folders: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let include = build_globset(&["*.json"])?;
    let mut files = BTreeSet::new();

    for folder in folders {
        if !folder.is_dir() {
            bail!("Folder does not exist: {}", folder.display());
        }
        for entry in WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry =
                entry.with_context(|| format!("Failed to scan folder: {}", folder.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if include.is_match(entry.file_name()) {
                files.insert(entry.into_path());
            }
        }
    }

    Ok(files.into_iter().collect())
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Read, parse, classify and digest one file.
pub fn prepare_document(path: &Path, opts: &DigestOptions) -> Result<PreparedDocument> {
    let raw_text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&raw_text)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;

    let doc_id = path.to_string_lossy().to_string();
    let labels = Classification::from_document(&doc, &modified_date(path)?);

    let chunks = digest_for_embedding(&doc, &raw_text, &doc_id, opts);
    let metadatas = (0..chunks.len())
        .map(|i| ChunkMetadata::new(&doc_id, i, &labels))
        .collect();
    let row = ManifestRow::new(&doc_id, &doc_id, &labels, raw_text);

    Ok(PreparedDocument {
        row,
        chunks,
        metadatas,
    })
}

/// Last-modified date of `path` as UTC `YYYY-MM-DD`.
pub fn modified_date(path: &Path) -> Result<String> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(modified).format("%Y-%m-%d").to_string())
}

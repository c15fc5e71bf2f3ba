//! Parquet persistence for the document manifest.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::tabular::{read_parquet, write_parquet};
use flightdeck_core::manifest::Manifest;
use flightdeck_core::models::ManifestRow;

/// Replace the manifest at `path` with `rows`.
pub fn save_manifest(path: &Path, rows: &[ManifestRow]) -> Result<()> {
    let values: Vec<[&str; 7]> = rows.iter().map(ManifestRow::values).collect();
    write_parquet(path, &ManifestRow::COLUMNS, &values)
        .with_context(|| format!("Failed to save manifest: {}", path.display()))
}

/// Load the manifest at `path`, keyed by `doc_id`.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        bail!(
            "No manifest found at {}. Run `fdk ingest <folder>` first.",
            path.display()
        );
    }
    let table = read_parquet(path)
        .with_context(|| format!("Failed to load manifest: {}", path.display()))?;

    let position = |name: &str| {
        table
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow::anyhow!("Manifest is missing column '{}'", name))
    };
    let idx = [
        position("doc_id")?,
        position("path")?,
        position("airline")?,
        position("training_type")?,
        position("document_type")?,
        position("timestamp")?,
        position("raw_text")?,
    ];

    let rows = table.rows.into_iter().map(|mut r| ManifestRow {
        doc_id: std::mem::take(&mut r[idx[0]]),
        path: std::mem::take(&mut r[idx[1]]),
        airline: std::mem::take(&mut r[idx[2]]),
        training_type: std::mem::take(&mut r[idx[3]]),
        document_type: std::mem::take(&mut r[idx[4]]),
        timestamp: std::mem::take(&mut r[idx[5]]),
        raw_text: std::mem::take(&mut r[idx[6]]),
    });

    Ok(Manifest::from_rows(rows))
}

//! `query` and `export` commands.
//!
//! Both load the index and manifest, run the pipeline once, and emit the
//! extracted rows. `query` prints a table unless `--out` names a
//! `.parquet` file; `export` always writes one.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::SqliteIndex;
use crate::llm::OpenAiChat;
use crate::manifest::load_manifest;
use crate::tabular::{render_text_table, write_parquet};
use flightdeck_core::embedding::Embedder;
use flightdeck_core::llm::ChatModel;
use flightdeck_core::models::ExtractedRow;
use flightdeck_core::pipeline::{Pipeline, PipelineOutput};

pub const EXPORT_EXTENSION: &str = "parquet";

/// Prompt used by `fdk export`.
pub fn export_prompt(airline: &str, training_type: &str) -> String {
    format!(
        "Return all pilot training records for airline '{}' and training type '{}'. Export parquet.",
        airline, training_type
    )
}

fn is_export_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(EXPORT_EXTENSION))
}

/// CLI entry point for `fdk query`.
pub async fn run_query(config: &Config, prompt: &str, out: Option<PathBuf>) -> Result<()> {
    let output = execute(config, prompt).await?;
    match out {
        Some(path) if is_export_path(&path) => {
            write_rows(&path, &output.rows)?;
            println!("Exported {} rows to {}", output.rows.len(), path.display());
        }
        _ => print!("{}", render_rows(&output.rows)),
    }
    Ok(())
}

/// CLI entry point for `fdk export`.
pub async fn run_export(
    config: &Config,
    airline: &str,
    training_type: &str,
    out: &Path,
) -> Result<()> {
    let prompt = export_prompt(airline, training_type);
    let output = execute(config, &prompt).await?;
    write_rows(out, &output.rows)?;
    println!("Exported {} rows to {}", output.rows.len(), out.display());
    Ok(())
}

async fn execute(config: &Config, prompt: &str) -> Result<PipelineOutput> {
    let embedder = create_embedder(config)?;
    let model = OpenAiChat::new(config).context("Failed to create chat client")?;
    execute_with(config, embedder, &model, prompt).await
}

/// Load persisted state and run the pipeline with the given backends.
pub async fn execute_with(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    model: &dyn ChatModel,
    prompt: &str,
) -> Result<PipelineOutput> {
    let index = SqliteIndex::load(&config.storage.index_dir(), embedder).await?;
    let manifest = load_manifest(&config.storage.manifest_path())?;

    let pipeline = Pipeline::new(model, &index, &manifest, config.retrieval.settings());
    let output = pipeline.run(prompt).await?;
    info!(
        fallback = output.filters.is_fallback(),
        candidates = output.candidates.len(),
        rows = output.rows.len(),
        "Query complete"
    );
    Ok(output)
}

pub fn write_rows(path: &Path, rows: &[ExtractedRow]) -> Result<()> {
    let values: Vec<[&str; 12]> = rows.iter().map(ExtractedRow::values).collect();
    write_parquet(path, &ExtractedRow::COLUMNS, &values)
        .with_context(|| format!("Failed to write export: {}", path.display()))
}

pub fn render_rows(rows: &[ExtractedRow]) -> String {
    let values: Vec<[&str; 12]> = rows.iter().map(ExtractedRow::values).collect();
    render_text_table(&ExtractedRow::COLUMNS, &values)
}

//! String tables: Parquet files and console rendering.
//!
//! Both the manifest and query exports are tables of non-null Utf8
//! columns. Arrow `Utf8` stores the exact bytes of each value, so JSON
//! text with quotes or non-ASCII characters reads back unchanged.

use anyhow::{bail, Context, Result};
use arrow_array::{Array, ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Column names plus rows of cell values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn string_schema(columns: &[&str]) -> Arc<Schema> {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ))
}

/// Write `rows` under `columns` as a Parquet file, creating parent
/// directories. Zero rows still produce a file with the schema.
pub fn write_parquet<R: AsRef<[S]>, S: AsRef<str>>(
    path: &Path,
    columns: &[&str],
    rows: &[R],
) -> Result<()> {
    if columns.is_empty() {
        bail!("Cannot write a table without columns");
    }
    if let Some((i, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, r)| r.as_ref().len() != columns.len())
    {
        bail!(
            "Row {} has {} values, expected {}",
            i,
            row.as_ref().len(),
            columns.len()
        );
    }

    let schema = string_schema(columns);
    let arrays: Vec<ArrayRef> = (0..columns.len())
        .map(|c| {
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.as_ref()[c].as_ref()),
            )) as ArrayRef
        })
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .context("Failed to assemble record batch")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }

    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

/// Read a Parquet file whose columns are all Utf8.
pub fn read_parquet(path: &Path) -> Result<StringTable> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read Parquet metadata: {}", path.display()))?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let mut string_columns = Vec::with_capacity(batch.num_columns());
        for (i, col) in batch.columns().iter().enumerate() {
            let strings = col
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| anyhow::anyhow!("Column '{}' is not a string column", columns[i]))?;
            string_columns.push(strings);
        }
        for r in 0..batch.num_rows() {
            rows.push(
                string_columns
                    .iter()
                    .map(|c| {
                        if c.is_null(r) {
                            String::new()
                        } else {
                            c.value(r).to_string()
                        }
                    })
                    .collect(),
            );
        }
    }

    Ok(StringTable { columns, rows })
}

/// Render an aligned plain-text table. An empty row set renders the
/// header alone.
pub fn render_text_table<R: AsRef<[S]>, S: AsRef<str>>(columns: &[&str], rows: &[R]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.as_ref()) {
            *w = (*w).max(cell.as_ref().chars().count());
        }
    }

    let line = |cells: Vec<&str>| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = String::new();
    out.push_str(&line(columns.to_vec()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.as_ref().iter().map(|c| c.as_ref()).collect()));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parquet_preserves_exact_strings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/out.parquet");
        let raw = "{\n  \"Pilot\": \"Zoë \\\"Z\\\" Ångström\",\n  \"Note\": \"✈️\"\n}";
        let rows = vec![vec!["a.json", raw], vec!["b.json", ""]];
        write_parquet(&path, &["doc_id", "raw_text"], &rows).unwrap();

        let table = read_parquet(&path).unwrap();
        assert_eq!(table.columns, vec!["doc_id", "raw_text"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][1], raw);
        assert_eq!(table.rows[1][1], "");
    }

    #[test]
    fn test_empty_table_keeps_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.parquet");
        let rows: Vec<Vec<&str>> = Vec::new();
        write_parquet(&path, &["Who", "Role"], &rows).unwrap();
        let table = read_parquet(&path).unwrap();
        assert_eq!(table.columns, vec!["Who", "Role"]);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let tmp = TempDir::new().unwrap();
        let rows = vec![vec!["only-one"]];
        assert!(write_parquet(&tmp.path().join("x.parquet"), &["a", "b"], &rows).is_err());
    }

    #[test]
    fn test_render_text_table_alignment() {
        let rows = vec![["Jane", "PF"], ["not found", "PM"]];
        let out = render_text_table(&["Who", "Role"], &rows);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "Who        Role");
        assert_eq!(lines[1], "---------  ----");
        assert_eq!(lines[2], "Jane       PF");
        assert_eq!(lines[3], "not found  PM");
    }

    #[test]
    fn test_render_empty_table_is_header_only() {
        let rows: Vec<[&str; 2]> = Vec::new();
        let out = render_text_table(&["Who", "Role"], &rows);
        assert_eq!(out.lines().count(), 2);
        assert!(out.starts_with("Who  Role"));
    }
}

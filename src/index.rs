//! SQLite-backed vector index.
//!
//! An index directory holds one `index.sqlite` database:
//!
//! ```text
//! chunks(position INTEGER PRIMARY KEY, text TEXT, metadata_json TEXT, vector BLOB)
//! index_meta(key TEXT PRIMARY KEY, value TEXT)
//! ```
//!
//! Vectors are stored as little-endian f32 BLOBs. On load every row is read
//! back into an exact [`FlatIndex`], so a reloaded index answers queries
//! exactly as the freshly built one did.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use flightdeck_core::embedding::{blob_to_vec, embed_one, vec_to_blob, Embedder};
use flightdeck_core::index::{FlatIndex, VectorIndex};
use flightdeck_core::models::{ChunkMetadata, IndexHit};

pub const INDEX_FILE: &str = "index.sqlite";

async fn connect(db_path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(create);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open index database: {}", db_path.display()))?;

    Ok(pool)
}

/// A persisted index loaded fully into memory.
pub struct SqliteIndex {
    flat: FlatIndex,
    embedder: Arc<dyn Embedder>,
}

impl SqliteIndex {
    /// Embed `texts` and write a fresh index to `dir`, replacing any
    /// previous one.
    ///
    /// Embedding finishes before anything on disk is touched.
    pub async fn build(
        dir: &Path,
        embedder: Arc<dyn Embedder>,
        texts: Vec<String>,
        metadatas: Vec<ChunkMetadata>,
        batch_size: usize,
    ) -> Result<Self> {
        if texts.len() != metadatas.len() {
            bail!(
                "Index input length mismatch: {} texts, {} metadatas",
                texts.len(),
                metadatas.len()
            );
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(batch_size.max(1)).enumerate() {
            debug!(batch = i, size = batch.len(), "Embedding chunk batch");
            vectors.extend(embedder.embed(batch).await?);
        }
        let flat = FlatIndex::from_parts(texts, metadatas, vectors)?;

        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to remove old index: {}", dir.display()))?;
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let pool = connect(&dir.join(INDEX_FILE), true).await?;
        write_index(&pool, &flat, embedder.model_name()).await?;
        pool.close().await;

        Ok(Self {
            flat,
            embedder,
        })
    }

    /// Read the index stored in `dir`.
    pub async fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db_path = dir.join(INDEX_FILE);
        if !db_path.exists() {
            bail!(
                "No index found at {}. Run `fdk ingest <folder>` first.",
                dir.display()
            );
        }

        let pool = connect(&db_path, false).await?;

        let stored_model: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'model'")
                .fetch_optional(&pool)
                .await?;
        if let Some(model) = stored_model.as_deref() {
            if model != embedder.model_name() {
                warn!(
                    stored = model,
                    current = embedder.model_name(),
                    "Index was built with a different embedding model"
                );
            }
        }

        let rows = sqlx::query(
            "SELECT position, text, metadata_json, vector FROM chunks ORDER BY position ASC",
        )
        .fetch_all(&pool)
        .await?;
        pool.close().await;

        let mut texts = Vec::with_capacity(rows.len());
        let mut metadatas = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let position: i64 = row.get("position");
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for chunk {}", position))?;
            let blob: Vec<u8> = row.get("vector");
            texts.push(row.get::<String, _>("text"));
            metadatas.push(metadata);
            vectors.push(blob_to_vec(&blob));
        }

        let flat = FlatIndex::from_parts(texts, metadatas, vectors)?;
        debug!(chunks = flat.len(), dims = flat.dims(), "Loaded index");

        Ok(Self {
            flat,
            embedder,
        })
    }

    pub fn flat(&self) -> &FlatIndex {
        &self.flat
    }
}

async fn write_index(pool: &SqlitePool, flat: &FlatIndex, model: &str) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE chunks (
            position INTEGER PRIMARY KEY,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE TABLE index_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
        .execute(pool)
        .await?;

    let mut tx = pool.begin().await?;

    for (position, entry) in flat.entries().iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (position, text, metadata_json, vector) VALUES (?, ?, ?, ?)",
        )
        .bind(position as i64)
        .bind(&entry.text)
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }

    for (key, value) in [
        ("model", model.to_string()),
        ("dims", flat.dims().to_string()),
        ("chunks", flat.len().to_string()),
    ] {
        sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
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

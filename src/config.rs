//! Configuration loading.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file (`--config`, default `./config/fdk.toml`),
//! 3. environment variables (after `.env` is loaded by `main`).
//!
//! ```toml
//! [models]
//! chat_model = "gpt-4o-mini"
//! base_url = "https://api.openai.com/v1"
//!
//! [embedding]
//! provider = "openai"        # or "hash" for offline runs
//! model = "text-embedding-3-small"
//!
//! [storage]
//! data_dir = "data"
//!
//! [digest]
//! mode = "pathlines"
//! chunk_size = 2000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 50
//! extract_concurrency = 4
//! ```

use anyhow::{bail, Context, Result};
use flightdeck_core::digest::{DigestMode, DigestOptions, DEFAULT_MAX_FLATTEN_ITEMS};
use flightdeck_core::pipeline::PipelineSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./config/fdk.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Chat model used for filter parsing and extraction.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            base_url: default_base_url(),
            api_key: None,
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` or `hash`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Falls back to `models.api_key` when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Vector width of the `hash` provider.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embed_model(),
            api_key: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl StorageConfig {
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("faiss_index")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest.parquet")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DigestConfig {
    #[serde(default)]
    pub mode: DigestMode,
    /// Non-positive keeps each document as a single chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: i64,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: i64,
    #[serde(default = "default_max_flatten_items")]
    pub max_flatten_items: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            mode: DigestMode::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_flatten_items: default_max_flatten_items(),
        }
    }
}

fn default_chunk_size() -> i64 {
    2000
}
fn default_chunk_overlap() -> i64 {
    200
}
fn default_max_flatten_items() -> usize {
    DEFAULT_MAX_FLATTEN_ITEMS
}

impl DigestConfig {
    pub fn options(&self) -> DigestOptions {
        DigestOptions {
            mode: self.mode,
            chunk_size: self.chunk_size.max(0) as usize,
            chunk_overlap: self.chunk_overlap.max(0) as usize,
            max_flatten_items: self.max_flatten_items,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_extract_concurrency")]
    pub extract_concurrency: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            extract_concurrency: default_extract_concurrency(),
        }
    }
}

fn default_top_k() -> usize {
    50
}
fn default_extract_concurrency() -> usize {
    4
}

impl RetrievalConfig {
    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            top_k: self.top_k,
            extract_concurrency: self.extract_concurrency,
        }
    }
}

impl Config {
    /// Key for embedding requests: `embedding.api_key`, else `models.api_key`.
    pub fn embedding_api_key(&self) -> Option<&str> {
        self.embedding
            .api_key
            .as_deref()
            .or(self.models.api_key.as_deref())
    }
}

/// Load configuration from `path` (or the default location) and the
/// process environment.
///
/// An explicitly given file must exist. A missing default file is treated
/// as empty.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_config_file(default)?
            } else {
                Config::default()
            }
        }
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Override settings from environment variables read through `lookup`.
///
/// Empty values are ignored.
pub fn apply_env(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("CHAT_MODEL") {
        config.models.chat_model = v;
    }
    if let Some(v) = var("BASE_URL") {
        config.models.base_url = v;
    }
    if let Some(v) = var("OPENAI_API_KEY") {
        config.models.api_key = Some(v);
    }
    if let Some(v) = var("EMBED_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = var("EMBED_MODEL_API_KEY") {
        config.embedding.api_key = Some(v);
    }
    if let Some(v) = var("EMBED_PROVIDER") {
        config.embedding.provider = v.trim().to_lowercase();
    }
    if let Some(v) = var("DATA_DIR") {
        config.storage.data_dir = PathBuf::from(v);
    }
    if let Some(v) = var("DIGEST_MODE") {
        config.digest.mode = v.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(v) = var("CHUNK_SIZE") {
        config.digest.chunk_size = parse_number("CHUNK_SIZE", &v)?;
    }
    if let Some(v) = var("CHUNK_OVERLAP") {
        config.digest.chunk_overlap = parse_number("CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = var("TOP_K") {
        config.retrieval.top_k = parse_number("TOP_K", &v)?;
    }
    if let Some(v) = var("EXTRACT_CONCURRENCY") {
        config.retrieval.extract_concurrency = parse_number("EXTRACT_CONCURRENCY", &v)?;
    }
    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} must be an integer, got '{}': {}", key, value, e))
}

pub fn validate(config: &Config) -> Result<()> {
    let digest = &config.digest;
    if digest.chunk_overlap < 0 {
        bail!("digest.chunk_overlap must be >= 0");
    }
    if digest.chunk_size > 0 && digest.chunk_overlap >= digest.chunk_size {
        bail!(
            "digest.chunk_overlap ({}) must be smaller than digest.chunk_size ({})",
            digest.chunk_overlap,
            digest.chunk_size
        );
    }
    if digest.max_flatten_items == 0 {
        bail!("digest.max_flatten_items must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.extract_concurrency < 1 {
        bail!("retrieval.extract_concurrency must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" => {}
        "hash" => {
            if config.embedding.dims == 0 {
                bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be openai or hash.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.models.chat_model, "gpt-4o-mini");
        assert_eq!(cfg.embedding.model, "text-embedding-3-small");
        assert_eq!(cfg.models.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.digest.options(), DigestOptions::default());
        assert_eq!(cfg.retrieval.top_k, 50);
        assert_eq!(cfg.storage.index_dir(), PathBuf::from("data/faiss_index"));
        assert_eq!(cfg.storage.manifest_path(), PathBuf::from("data/manifest.parquet"));
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_toml_partial_sections() {
        let cfg: Config = toml::from_str(
            r#"
[digest]
mode = "canonical"
chunk_size = 500

[embedding]
provider = "hash"
"#,
        )
        .unwrap();
        assert_eq!(cfg.digest.mode, DigestMode::Canonical);
        assert_eq!(cfg.digest.chunk_size, 500);
        assert_eq!(cfg.digest.chunk_overlap, 200);
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.embedding.batch_size, 64);
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            env(&[
                ("CHAT_MODEL", "gpt-4.1"),
                ("DATA_DIR", "/tmp/fdk"),
                ("DIGEST_MODE", "Verbatim"),
                ("CHUNK_SIZE", "0"),
                ("TOP_K", "7"),
                ("EMBED_PROVIDER", "HASH"),
                ("OPENAI_API_KEY", "sk-main"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.models.chat_model, "gpt-4.1");
        assert_eq!(cfg.storage.manifest_path(), PathBuf::from("/tmp/fdk/manifest.parquet"));
        assert_eq!(cfg.digest.mode, DigestMode::Verbatim);
        assert_eq!(cfg.digest.options().chunk_size, 0);
        assert_eq!(cfg.retrieval.top_k, 7);
        assert_eq!(cfg.embedding.provider, "hash");
        assert_eq!(cfg.embedding_api_key(), Some("sk-main"));
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_embed_key_preferred_over_openai_key() {
        let mut cfg = Config::default();
        apply_env(
            &mut cfg,
            env(&[("OPENAI_API_KEY", "sk-main"), ("EMBED_MODEL_API_KEY", "sk-embed")]),
        )
        .unwrap();
        assert_eq!(cfg.embedding_api_key(), Some("sk-embed"));
        assert_eq!(cfg.models.api_key.as_deref(), Some("sk-main"));
    }

    #[test]
    fn test_negative_chunk_size_is_single_chunk() {
        let mut cfg = Config::default();
        apply_env(&mut cfg, env(&[("CHUNK_SIZE", "-5")])).unwrap();
        assert_eq!(cfg.digest.options().chunk_size, 0);
        validate(&cfg).unwrap();
    }

    #[test]
    fn test_invalid_env_values() {
        let mut cfg = Config::default();
        assert!(apply_env(&mut cfg, env(&[("TOP_K", "many")])).is_err());
        assert!(apply_env(&mut cfg, env(&[("DIGEST_MODE", "yaml")])).is_err());
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let mut cfg = Config::default();
        cfg.digest.chunk_size = 100;
        cfg.digest.chunk_overlap = 100;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_zero_top_k_and_unknown_provider() {
        let mut cfg = Config::default();
        cfg.retrieval.top_k = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.embedding.provider = "local".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = load_config(Some(Path::new("/nonexistent/fdk.toml"))).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}

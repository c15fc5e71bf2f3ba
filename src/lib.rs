//! # Flightdeck
//!
//! Semantic retrieval and normalized field extraction over heterogeneous
//! pilot training JSON records.
//!
//! Source documents are digested into text chunks and embedded into a
//! vector index; a manifest keeps each document's verbatim text. A
//! natural-language query is turned into filters, matched against the
//! index, and every candidate document is handed to a chat model that
//! fills a fixed seven-field schema.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │ JSON files │──▶│ Digest+Embed │──▶│ index.sqlite        │
//! └────────────┘   └──────────────┘   │ manifest.parquet    │
//!                                     └──────────┬──────────┘
//!                                                │
//!   prompt ─▶ parse filters ─▶ retrieve ─▶ extract ─▶ table / parquet
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fdk ingest ./records
//! fdk query "Show me AirTransat training records"
//! fdk export --airline "VirginAir Australia" --training-type "Flight Training" --out result.parquet
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`embedding`] | OpenAI and offline hash embedders |
//! | [`llm`] | OpenAI-compatible tool-call client |
//! | [`index`] | SQLite-backed vector index |
//! | [`manifest`] | Parquet manifest store |
//! | [`tabular`] | Parquet tables and console rendering |
//! | [`ingest`] | Folder ingestion |
//! | [`query`] | `query` and `export` commands |
//!
//! Models, digesting, normalization and the query pipeline live in
//! [`flightdeck_core`].

pub mod config;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod manifest;
pub mod query;
pub mod tabular;

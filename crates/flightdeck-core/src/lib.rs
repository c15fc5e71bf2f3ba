//! # Flightdeck Core
//!
//! Shared, I/O-free logic for Flightdeck: data models, the digester, value
//! normalization, filter parsing, candidate retrieval, field extraction and
//! the pipeline that sequences them.
//!
//! This crate contains no tokio, sqlx, filesystem or network dependencies.
//! Embedding backends, chat models and vector indexes are reached through
//! the [`embedding::Embedder`], [`llm::ChatModel`] and
//! [`index::VectorIndex`] traits, implemented by the application crate.

pub mod digest;
pub mod embedding;
pub mod extract;
pub mod filters;
pub mod index;
pub mod llm;
pub mod manifest;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod retrieve;

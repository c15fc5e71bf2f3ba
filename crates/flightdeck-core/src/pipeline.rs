//! Query pipeline: parse filters, retrieve candidates, extract rows.
//!
//! Each stage is a [`PipelineState`] variant holding everything the next
//! stage needs. [`Pipeline::step`] consumes one state and returns its
//! successor, so the sequence is always
//! `ParseFilters → Retrieve → Extract → Done`.

use anyhow::Result;
use tracing::info;

use crate::extract::Extractor;
use crate::filters::{FilterOutcome, FilterParser};
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::manifest::Manifest;
use crate::models::{ChunkMetadata, ExtractedRow};
use crate::retrieve::Retriever;

/// Settings the pipeline needs from the application configuration.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub extract_concurrency: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 50,
            extract_concurrency: 4,
        }
    }
}

/// Everything one query produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub prompt: String,
    pub filters: FilterOutcome,
    pub candidates: Vec<ChunkMetadata>,
    pub rows: Vec<ExtractedRow>,
}

#[derive(Debug, Clone)]
pub enum PipelineState {
    ParseFilters {
        prompt: String,
    },
    Retrieve {
        prompt: String,
        filters: FilterOutcome,
    },
    Extract {
        prompt: String,
        filters: FilterOutcome,
        candidates: Vec<ChunkMetadata>,
    },
    Done(PipelineOutput),
}

impl PipelineState {
    pub fn start(prompt: impl Into<String>) -> Self {
        Self::ParseFilters {
            prompt: prompt.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ParseFilters { .. } => "parse_filters",
            Self::Retrieve { .. } => "retrieve",
            Self::Extract { .. } => "extract",
            Self::Done(_) => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Runs queries against one index and manifest.
pub struct Pipeline<'a> {
    model: &'a dyn ChatModel,
    index: &'a dyn VectorIndex,
    manifest: &'a Manifest,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        index: &'a dyn VectorIndex,
        manifest: &'a Manifest,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            model,
            index,
            manifest,
            settings,
        }
    }

    /// Advance one stage. `Done` is returned unchanged.
    pub async fn step(&self, state: PipelineState) -> Result<PipelineState> {
        let next = match state {
            PipelineState::ParseFilters { prompt } => {
                let filters = FilterParser::new(self.model).parse(&prompt).await;
                if let Some(limit) = filters.filters().limit {
                    info!(limit, "Filter limit parsed but not applied");
                }
                PipelineState::Retrieve { prompt, filters }
            }
            PipelineState::Retrieve { prompt, filters } => {
                let candidates = Retriever::new(self.index, self.settings.top_k)
                    .retrieve(filters.filters(), &prompt)
                    .await?;
                PipelineState::Extract {
                    prompt,
                    filters,
                    candidates,
                }
            }
            PipelineState::Extract {
                prompt,
                filters,
                candidates,
            } => {
                let rows = Extractor::new(self.model, self.manifest, self.settings.extract_concurrency)
                    .extract_all(&candidates)
                    .await?;
                PipelineState::Done(PipelineOutput {
                    prompt,
                    filters,
                    candidates,
                    rows,
                })
            }
            done @ PipelineState::Done(_) => return Ok(done),
        };
        info!(stage = next.name(), "Pipeline stage reached");
        Ok(next)
    }

    /// Run every stage for `prompt`.
    pub async fn run(&self, prompt: &str) -> Result<PipelineOutput> {
        let mut state = PipelineState::start(prompt);
        loop {
            state = match self.step(state).await? {
                PipelineState::Done(output) => return Ok(output),
                next => next,
            };
        }
    }
}

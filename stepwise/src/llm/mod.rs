//! Model backend abstraction.
//!
//! Every model interaction of a run goes through [`ModelBackend`]: step proposals,
//! reflections, summaries and judge calls use [`ModelBackend::propose`]; value
//! estimation uses [`ModelBackend::score`]. Implementations: [`MockBackend`] (scripted)
//! and [`OpenAiBackend`] (OpenAI-compatible chat completions).
//!
//! Call sites treat a [`BackendError`] like an empty response: it is logged and the
//! bounded retry / deterministic fallback of the caller takes over.

mod mock;
mod openai;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use async_trait::async_trait;

use crate::config::{GenerationConfig, ValueRange};
use crate::error::BackendError;

/// Raw response of a scoring call: either a number or text that still needs unwrapping.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreResponse {
    Value(f64),
    Text(String),
}

/// Generative model backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generates text for `prompt`; returns the ordered output fragments (may be empty).
    async fn propose(
        &self,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<Vec<String>, BackendError>;

    /// Scores `prompt` against the configured value range.
    async fn score(&self, prompt: &str, range: ValueRange) -> Result<ScoreResponse, BackendError>;
}

/// Calls `propose` and maps a backend error to an empty response, logging it.
pub(crate) async fn propose_or_empty(
    backend: &dyn ModelBackend,
    prompt: &str,
    generation: &GenerationConfig,
) -> Vec<String> {
    match backend.propose(prompt, generation).await {
        Ok(fragments) => fragments,
        Err(error) => {
            tracing::warn!(%error, "proposal call failed");
            Vec::new()
        }
    }
}

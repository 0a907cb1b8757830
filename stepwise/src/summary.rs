//! Final-answer summaries: model call with bounded retry, then a syntactic fallback.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::answer::last_boxed;
use crate::config::{GenerationConfig, VerifyMethod, SHORT_OUTPUT_TOKENS};
use crate::llm::{propose_or_empty, ModelBackend};
use crate::prompts::PromptBuilder;
use crate::retry::RetryPolicy;

static STEP_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Step\s*\d+\s*:\s*").expect("valid regex"));

/// Used when the trajectory holds no text at all.
pub const NO_ANSWER: &str = "No final answer was produced.";

/// Builds a summary from trajectory text alone. Must not call a backend.
pub trait DeterministicSummaryFallback: Send + Sync {
    fn extract(&self, trajectory: &str) -> String;
}

/// Boxed answer, else the sentence with the last "answer is", else the last step body.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntacticSummary;

fn strip_step_prefix(line: &str) -> &str {
    match STEP_PREFIX.find(line) {
        Some(m) => line[m.end()..].trim(),
        None => line.trim(),
    }
}

impl DeterministicSummaryFallback for SyntacticSummary {
    fn extract(&self, trajectory: &str) -> String {
        if let Some(boxed) = last_boxed(trajectory) {
            return format!("The final answer is \\boxed{{{}}}", boxed.trim());
        }
        if let Some(pos) = trajectory.rfind("answer is") {
            let start = trajectory[..pos]
                .rfind(|c: char| c == '\n' || c == '.')
                .map(|i| i + 1)
                .unwrap_or(0);
            let end = trajectory[pos..]
                .find('\n')
                .map(|i| pos + i)
                .unwrap_or(trajectory.len());
            let sentence = strip_step_prefix(&trajectory[start..end]);
            if !sentence.is_empty() {
                return sentence.to_string();
            }
        }
        trajectory
            .lines()
            .rev()
            .map(strip_step_prefix)
            .find(|l| !l.is_empty())
            .unwrap_or(NO_ANSWER)
            .to_string()
    }
}

/// Resolves a non-empty summary for a trajectory.
pub struct SummaryResolver {
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<dyn PromptBuilder>,
    fallback: Arc<dyn DeterministicSummaryFallback>,
    generation: GenerationConfig,
    retry: RetryPolicy,
    verify_method: VerifyMethod,
}

impl SummaryResolver {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        prompts: Arc<dyn PromptBuilder>,
        fallback: Arc<dyn DeterministicSummaryFallback>,
        generation: &GenerationConfig,
        retry: RetryPolicy,
        verify_method: VerifyMethod,
    ) -> Self {
        Self {
            backend,
            prompts,
            fallback,
            generation: generation.with_max_new_tokens(SHORT_OUTPUT_TOKENS),
            retry,
            verify_method,
        }
    }

    /// Never fails: model summary if any attempt is non-empty, syntactic fallback otherwise.
    pub async fn resolve(&self, question: &str, y: &str) -> String {
        let prompt = self.prompts.summary(question, y);
        let prompt = prompt.as_str();
        let backend = self.backend.as_ref();
        let generation = &self.generation;
        let separator = match self.verify_method {
            VerifyMethod::StringMatch => " ",
            VerifyMethod::ModelJudge => "",
        };
        // a blank reply counts as an empty attempt
        let response = self
            .retry
            .until_nonempty("summary", move || async move {
                let fragments = propose_or_empty(backend, prompt, generation).await;
                if fragments.join(separator).trim().is_empty() {
                    Vec::new()
                } else {
                    fragments
                }
            })
            .await;

        if let Some(fragments) = response {
            let summary = fragments.join(separator).trim().to_string();
            if !summary.is_empty() {
                debug!(summary = %summary, "got summary");
                return summary;
            }
        }
        warn!(
            attempts = self.retry.max_attempts(),
            "failed to get summary, using syntactic fallback"
        );
        self.fallback.extract(y)
    }
}

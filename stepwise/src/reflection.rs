//! Reflection: decides whether a partial solution should continue.
//!
//! The short form ([`ReflectionMode::Simple`]) only answers continue/end. The long form
//! ([`ReflectionMode::Full`]) either ends or returns a critique that the next proposal
//! is conditioned on.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{BackendFamily, GenerationConfig, Language, ReflectionMode, SHORT_OUTPUT_TOKENS};
use crate::llm::{propose_or_empty, ModelBackend};
use crate::prompts::{PromptBuilder, PromptContext};
use crate::retry::RetryPolicy;

const ANALYSIS_MARKER: &str = "Analysis:";

/// Outcome of one reflection call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reflection {
    Continue,
    End,
    /// Long-form critique for the next proposal.
    Critique(String),
}

/// Asks the backend whether a trajectory is complete.
pub struct ReflectionPolicy {
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<dyn PromptBuilder>,
    family: BackendFamily,
    language: Language,
    generation: GenerationConfig,
    retry: RetryPolicy,
}

impl ReflectionPolicy {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        prompts: Arc<dyn PromptBuilder>,
        family: BackendFamily,
        language: Language,
        generation: GenerationConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            prompts,
            family,
            language,
            generation,
            retry,
        }
    }

    /// Whether the trajectory already carries a final-answer phrase the family emits.
    fn has_terminal_phrase(&self, y: &str) -> bool {
        self.family.detects_terminal_phrase()
            && self.language == Language::En
            && (y.contains("answer is") || y.contains("\\boxed"))
    }

    /// Decides for `y` at `step_index`.
    ///
    /// `None` is a long-form failure (no response after retries, or no `Analysis:` marker);
    /// the caller proposes without a critique.
    pub async fn decide(
        &self,
        question: &str,
        y: &str,
        step_index: usize,
        mode: ReflectionMode,
    ) -> Option<Reflection> {
        if step_index == 1 {
            return Some(Reflection::Continue);
        }
        if self.has_terminal_phrase(y) {
            debug!(step_index, "terminal phrase found, ending without reflection call");
            return Some(Reflection::End);
        }

        let ctx = PromptContext {
            question,
            trajectory: y,
            step_index,
            language: self.language,
            family: self.family,
        };
        let (prompt, generation) = match mode {
            ReflectionMode::Simple => (
                self.prompts.reflection_short(&ctx),
                self.generation.with_max_new_tokens(SHORT_OUTPUT_TOKENS),
            ),
            ReflectionMode::Full => (self.prompts.reflection_long(&ctx), self.generation.clone()),
        };

        let backend = self.backend.as_ref();
        let response = self
            .retry
            .until_nonempty("reflection", || propose_or_empty(backend, &prompt, &generation))
            .await;

        let Some(fragments) = response else {
            warn!(step_index, "failed to get reflection");
            return match mode {
                ReflectionMode::Simple => Some(Reflection::End),
                ReflectionMode::Full => None,
            };
        };
        let text = fragments.join(" ");
        debug!(step_index, reflection = %text, "got reflection");

        match mode {
            ReflectionMode::Simple => Some(classify_short(&text, step_index)),
            ReflectionMode::Full => classify_long(&text),
        }
    }
}

fn classify_short(text: &str, step_index: usize) -> Reflection {
    if text.contains("unsolved") || step_index <= 1 {
        Reflection::Continue
    } else if text.contains("solved") {
        Reflection::End
    } else {
        Reflection::Continue
    }
}

fn classify_long(text: &str) -> Option<Reflection> {
    if text.contains("Problem solved") {
        return Some(Reflection::End);
    }
    match text.split(ANALYSIS_MARKER).nth(1) {
        Some(critique) => Some(Reflection::Critique(critique.trim().to_string())),
        None => {
            warn!(reason = "missing analysis marker", "reflection format error");
            None
        }
    }
}

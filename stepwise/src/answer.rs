//! Answer extraction and equivalence checks.
//!
//! [`AnswerExtractor`] turns a summary into a normalized answer key (used for vote
//! grouping and exact matching). [`AnswerEquivalence`] decides whether a summary matches
//! the ground truth: [`ExactMatch`] compares keys, [`ModelJudge`] asks the backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{GenerationConfig, SHORT_OUTPUT_TOKENS};
use crate::llm::{propose_or_empty, ModelBackend};
use crate::prompts::PromptBuilder;

const BOXED: &str = "\\boxed{";
const ANSWER_IS: &str = "answer is";

/// Extracts a normalized answer key from a summary.
pub trait AnswerExtractor: Send + Sync {
    fn extract(&self, summary: &str) -> String;
}

/// Content of the last balanced `\boxed{..}` in `text`.
pub fn last_boxed(text: &str) -> Option<String> {
    let start = text.rfind(BOXED)? + BOXED.len();
    let mut depth = 1usize;
    for (i, c) in text[start..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Canonical form of an answer string for comparison.
pub fn normalize_answer(answer: &str) -> String {
    let mut s: String = answer.split_whitespace().collect::<Vec<_>>().join("");
    for (from, to) in [
        ("\\left", ""),
        ("\\right", ""),
        ("\\!", ""),
        ("dfrac", "frac"),
        ("tfrac", "frac"),
        ("^{\\circ}", ""),
        ("^\\circ", ""),
        ("\\%", ""),
        ("%", ""),
        ("$", ""),
    ] {
        s = s.replace(from, to);
    }
    s.trim_end_matches('.').to_string()
}

/// Default extractor: last `\boxed{}`, else text after the last "answer is", else the last line.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxedAnswerExtractor;

impl AnswerExtractor for BoxedAnswerExtractor {
    fn extract(&self, summary: &str) -> String {
        let raw = if let Some(boxed) = last_boxed(summary) {
            boxed
        } else if let Some(pos) = summary.rfind(ANSWER_IS) {
            summary[pos + ANSWER_IS.len()..]
                .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
                .to_string()
        } else {
            summary
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("")
                .to_string()
        };
        normalize_answer(&raw)
    }
}

/// Decides whether a candidate summary matches the ground truth.
#[async_trait]
pub trait AnswerEquivalence: Send + Sync {
    async fn matches(&self, summary: &str, ground_truth: &str) -> bool;
}

/// Compares extracted, normalized answers.
pub struct ExactMatch {
    extractor: Arc<dyn AnswerExtractor>,
}

impl ExactMatch {
    pub fn new(extractor: Arc<dyn AnswerExtractor>) -> Self {
        Self { extractor }
    }
}

impl Default for ExactMatch {
    fn default() -> Self {
        Self::new(Arc::new(BoxedAnswerExtractor))
    }
}

#[async_trait]
impl AnswerEquivalence for ExactMatch {
    async fn matches(&self, summary: &str, ground_truth: &str) -> bool {
        let candidate = self.extractor.extract(summary);
        let truth = match last_boxed(ground_truth) {
            Some(boxed) => normalize_answer(&boxed),
            None => normalize_answer(ground_truth),
        };
        !candidate.is_empty() && candidate == truth
    }
}

/// Asks the backend whether the summary and ground truth agree.
pub struct ModelJudge {
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<dyn PromptBuilder>,
    generation: GenerationConfig,
}

impl ModelJudge {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        prompts: Arc<dyn PromptBuilder>,
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            backend,
            prompts,
            generation: generation.with_max_new_tokens(SHORT_OUTPUT_TOKENS),
        }
    }
}

#[async_trait]
impl AnswerEquivalence for ModelJudge {
    async fn matches(&self, summary: &str, ground_truth: &str) -> bool {
        let prompt = self.prompts.judge(summary, ground_truth);
        let reply = propose_or_empty(self.backend.as_ref(), &prompt, &self.generation)
            .await
            .join(" ");
        let verdict = reply.trim().to_lowercase();
        let accepted = ["yes", "true", "correct"]
            .iter()
            .any(|w| verdict.starts_with(w));
        debug!(verdict = %verdict, accepted, "judge reply");
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockBackend;
    use crate::prompts::DefaultPrompts;

    #[test]
    fn last_boxed_handles_nesting() {
        assert_eq!(
            last_boxed("first \\boxed{1} then \\boxed{\\frac{1}{2}}").as_deref(),
            Some("\\frac{1}{2}")
        );
        assert_eq!(last_boxed("\\boxed{unclosed"), None);
        assert_eq!(last_boxed("no box"), None);
    }

    #[test]
    fn extractor_prefers_boxed_then_answer_is_then_last_line() {
        let e = BoxedAnswerExtractor;
        assert_eq!(e.extract("The final answer is \\boxed{ 4 }."), "4");
        assert_eq!(e.extract("So the answer is: $12$."), "12");
        assert_eq!(e.extract("Step 1: a\n\n7\n"), "7");
    }

    #[test]
    fn normalize_strips_latex_noise() {
        assert_eq!(normalize_answer("\\left( \\dfrac{1}{2} \\right)"), "(\\frac{1}{2})");
        assert_eq!(normalize_answer("90^\\circ"), "90");
        assert_eq!(normalize_answer("50\\%"), "50");
        assert_eq!(normalize_answer("1,\\!000."), "1,000");
    }

    #[tokio::test]
    async fn exact_match_compares_normalized_keys() {
        let m = ExactMatch::default();
        assert!(m.matches("The final answer is \\boxed{\\tfrac{3}{4}}", "\\frac{3}{4}").await);
        assert!(m.matches("the answer is 4.", "\\boxed{4}").await);
        assert!(!m.matches("the answer is 5", "4").await);
        assert!(!m.matches("", "").await);
    }

    #[tokio::test]
    async fn model_judge_accepts_affirmative_reply() {
        let yes = Arc::new(MockBackend::new().with_default_proposal(["Yes, they agree."]));
        let judge = ModelJudge::new(yes, Arc::new(DefaultPrompts::new()), &GenerationConfig::default());
        assert!(judge.matches("x = 2", "2").await);

        let no = Arc::new(MockBackend::new().with_default_proposal(["No."]));
        let judge = ModelJudge::new(no, Arc::new(DefaultPrompts::new()), &GenerationConfig::default());
        assert!(!judge.matches("x = 3", "2").await);

        let silent = Arc::new(MockBackend::new());
        let judge = ModelJudge::new(silent, Arc::new(DefaultPrompts::new()), &GenerationConfig::default());
        assert!(!judge.matches("x = 2", "2").await);
    }
}

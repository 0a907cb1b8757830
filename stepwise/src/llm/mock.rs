//! Scripted backend for tests and demos.
//!
//! Proposal responses are resolved in order: (1) first contains-pattern match on the
//! prompt, (2) next queued response, (3) default response. Score responses use
//! contains-patterns then a default. All calls are counted and prompts are recorded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::{GenerationConfig, ValueRange};
use crate::error::BackendError;
use crate::llm::{ModelBackend, ScoreResponse};

/// Mock backend returning canned fragments and scores.
pub struct MockBackend {
    queued: Mutex<VecDeque<Vec<String>>>,
    contains_proposals: Vec<(String, Vec<String>)>,
    default_proposal: Vec<String>,
    contains_scores: Vec<(String, ScoreResponse)>,
    default_score: ScoreResponse,
    propose_calls: AtomicUsize,
    score_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn fragments<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl MockBackend {
    /// Empty proposals and a score of 0.0 for everything.
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            contains_proposals: Vec::new(),
            default_proposal: Vec::new(),
            contains_scores: Vec::new(),
            default_score: ScoreResponse::Value(0.0),
            propose_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queues one proposal response; queued responses are consumed in order.
    pub fn with_proposal<I, S>(self, response: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(fragments(response));
        self
    }

    /// Response for any prompt containing `pattern`. Checked before the queue.
    pub fn with_proposal_for<I, S>(mut self, pattern: &str, response: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contains_proposals
            .push((pattern.to_string(), fragments(response)));
        self
    }

    /// Response once the queue is exhausted and no pattern matched.
    pub fn with_default_proposal<I, S>(mut self, response: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_proposal = fragments(response);
        self
    }

    /// Score for any prompt containing `pattern`.
    pub fn with_score_for(mut self, pattern: &str, score: ScoreResponse) -> Self {
        self.contains_scores.push((pattern.to_string(), score));
        self
    }

    pub fn with_default_score(mut self, score: ScoreResponse) -> Self {
        self.default_score = score;
        self
    }

    pub fn propose_calls(&self) -> usize {
        self.propose_calls.load(Ordering::SeqCst)
    }

    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    /// Every prompt seen so far (proposal and score calls), in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, prompt: &str) {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn propose(
        &self,
        prompt: &str,
        _generation: &GenerationConfig,
    ) -> Result<Vec<String>, BackendError> {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        self.record(prompt);
        if let Some((_, response)) = self
            .contains_proposals
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
        {
            return Ok(response.clone());
        }
        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        Ok(queued.unwrap_or_else(|| self.default_proposal.clone()))
    }

    async fn score(&self, prompt: &str, _range: ValueRange) -> Result<ScoreResponse, BackendError> {
        self.score_calls.fetch_add(1, Ordering::SeqCst);
        self.record(prompt);
        let score = self
            .contains_scores
            .iter()
            .find(|(pattern, _)| prompt.contains(pattern.as_str()))
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| self.default_score.clone());
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> ValueRange {
        ValueRange::new(0.0, 1.0).unwrap()
    }

    #[tokio::test]
    async fn queued_then_default_proposals() {
        let backend = MockBackend::new()
            .with_proposal(["first"])
            .with_default_proposal(["fallback"]);
        let g = GenerationConfig::default();
        assert_eq!(backend.propose("a", &g).await.unwrap(), vec!["first"]);
        assert_eq!(backend.propose("b", &g).await.unwrap(), vec!["fallback"]);
        assert_eq!(backend.propose_calls(), 2);
        assert_eq!(backend.prompts(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn contains_pattern_wins_over_queue() {
        let backend = MockBackend::new()
            .with_proposal(["queued"])
            .with_proposal_for("summarize", ["The answer is 4"]);
        let g = GenerationConfig::default();
        assert_eq!(
            backend.propose("please summarize", &g).await.unwrap(),
            vec!["The answer is 4"]
        );
        assert_eq!(backend.propose("next", &g).await.unwrap(), vec!["queued"]);
    }

    #[tokio::test]
    async fn scores_by_pattern_then_default() {
        let backend = MockBackend::new()
            .with_score_for("good", ScoreResponse::Value(0.9))
            .with_default_score(ScoreResponse::Text("Score: 0.1".into()));
        assert_eq!(
            backend.score("a good step", range()).await.unwrap(),
            ScoreResponse::Value(0.9)
        );
        assert_eq!(
            backend.score("other", range()).await.unwrap(),
            ScoreResponse::Text("Score: 0.1".into())
        );
        assert_eq!(backend.score_calls(), 2);
    }
}

//! Value estimation with a per-run cache keyed by trajectory text.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::cache::{Cache, ValueCache};
use crate::config::{BackendFamily, ValueRange};
use crate::llm::{ModelBackend, ScoreResponse};
use crate::prompts::PromptBuilder;

static MARKED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:score|value)\s*[:：]\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
});

static ANY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex"));

/// Turns a raw score response into a value inside `range`.
///
/// Text is read as the number after the last `Score:`/`Value:` marker, else the last
/// number anywhere. Unparseable text yields `range.low`.
pub fn unwrap_value(response: &ScoreResponse, range: ValueRange) -> f64 {
    match response {
        ScoreResponse::Value(v) => range.clamp(*v),
        ScoreResponse::Text(text) => {
            let marked = MARKED_NUMBER
                .captures_iter(text)
                .last()
                .and_then(|c| c.get(1))
                .map(|m| m.as_str());
            let raw = marked.or_else(|| ANY_NUMBER.find_iter(text).last().map(|m| m.as_str()));
            match raw.and_then(|s| s.parse::<f64>().ok()) {
                Some(v) => range.clamp(v),
                None => range.low,
            }
        }
    }
}

/// Scores trajectories through the backend, memoized per run.
pub struct ValueEstimator {
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<dyn PromptBuilder>,
    cache: Arc<ValueCache>,
    family: BackendFamily,
    range: ValueRange,
}

impl ValueEstimator {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        prompts: Arc<dyn PromptBuilder>,
        cache: Arc<ValueCache>,
        family: BackendFamily,
        range: ValueRange,
    ) -> Self {
        Self {
            backend,
            prompts,
            cache,
            family,
            range,
        }
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    fn prompt(&self, question: &str, y: &str) -> String {
        match self.family {
            BackendFamily::Local => format!("Problem: {}\nSolution:\n{}", question, y),
            BackendFamily::Gpt
            | BackendFamily::Glm
            | BackendFamily::Mistral
            | BackendFamily::Llama => self.prompts.value(question, y),
        }
    }

    /// Value of `y` in `[low, high)`. Identical trajectories hit the backend once.
    pub async fn score(&self, question: &str, y: &str) -> f64 {
        let key = y.to_string();
        if let Some(v) = self.cache.get(&key).await {
            debug!(value = v, "value cache hit");
            return v;
        }
        let prompt = self.prompt(question, y);
        match self.backend.score(&prompt, self.range).await {
            Ok(response) => {
                let fresh = unwrap_value(&response, self.range);
                // a concurrent miss may have stored first
                let value = self.cache.get_or_insert(key, fresh).await;
                debug!(value, fresh, "got value");
                value
            }
            Err(error) => {
                warn!(%error, "value call failed");
                self.range.low
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::llm::MockBackend;
    use crate::prompts::DefaultPrompts;
    use crate::config::GenerationConfig;

    fn range() -> ValueRange {
        ValueRange::new(0.0, 1.0).unwrap()
    }

    fn estimator(backend: Arc<dyn ModelBackend>, family: BackendFamily) -> ValueEstimator {
        ValueEstimator::new(
            backend,
            Arc::new(DefaultPrompts::new()),
            Arc::new(ValueCache::new()),
            family,
            range(),
        )
    }

    #[test]
    fn unwrap_value_reads_marked_or_last_number() {
        let r = range();
        assert_eq!(unwrap_value(&ScoreResponse::Text("Score: 0.8".into()), r), 0.8);
        assert_eq!(
            unwrap_value(&ScoreResponse::Text("Step 2 looks fine. Value: 0.35 overall".into()), r),
            0.35
        );
        assert_eq!(unwrap_value(&ScoreResponse::Text("about 0.6".into()), r), 0.6);
        assert_eq!(unwrap_value(&ScoreResponse::Text("no idea".into()), r), 0.0);
        assert_eq!(unwrap_value(&ScoreResponse::Value(-2.0), r), 0.0);
        assert!(unwrap_value(&ScoreResponse::Value(3.0), r) < 1.0);
    }

    #[tokio::test]
    async fn identical_trajectory_hits_backend_once() {
        let backend = Arc::new(MockBackend::new().with_default_score(ScoreResponse::Value(0.42)));
        let est = estimator(backend.clone(), BackendFamily::Glm);
        let y = "Step 1: add\n";
        let first = est.score("q", y).await;
        let second = est.score("q", y).await;
        assert_eq!(first, 0.42);
        assert_eq!(first, second);
        assert_eq!(backend.score_calls(), 1);
        assert_eq!(est.cache().counters(), (1, 1));
    }

    #[tokio::test]
    async fn local_family_uses_raw_framing() {
        let backend = Arc::new(MockBackend::new());
        let est = estimator(backend.clone(), BackendFamily::Local);
        est.score("What is 1 + 1?", "Step 1: 2\n").await;
        assert_eq!(
            backend.prompts(),
            vec!["Problem: What is 1 + 1?\nSolution:\nStep 1: 2\n".to_string()]
        );
    }

    struct FailingScorer;

    #[async_trait::async_trait]
    impl ModelBackend for FailingScorer {
        async fn propose(
            &self,
            _prompt: &str,
            _generation: &GenerationConfig,
        ) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn score(
            &self,
            _prompt: &str,
            _range: ValueRange,
        ) -> Result<ScoreResponse, BackendError> {
            Err(BackendError::InvalidResponse("bad payload".into()))
        }
    }

    /// Yields once per call and returns 0.1, 0.2, ... in call order.
    struct CountingScorer {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ModelBackend for CountingScorer {
        async fn propose(
            &self,
            _prompt: &str,
            _generation: &GenerationConfig,
        ) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }

        async fn score(
            &self,
            _prompt: &str,
            _range: ValueRange,
        ) -> Result<ScoreResponse, BackendError> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            tokio::task::yield_now().await;
            Ok(ScoreResponse::Value(n as f64 / 10.0))
        }
    }

    #[tokio::test]
    async fn concurrent_misses_agree_on_one_value() {
        let est = estimator(
            Arc::new(CountingScorer {
                calls: std::sync::atomic::AtomicUsize::new(0),
            }),
            BackendFamily::Glm,
        );
        let y = "Step 1: add\n";
        let (a, b) = tokio::join!(est.score("q", y), est.score("q", y));
        assert_eq!(a, b);
        assert_eq!(est.cache().get(&y.to_string()).await, Some(a));
        assert_eq!(est.score("q", y).await, a);
    }

    #[tokio::test]
    async fn backend_error_yields_low_and_is_not_cached() {
        let est = estimator(Arc::new(FailingScorer), BackendFamily::Glm);
        assert_eq!(est.score("q", "Step 1: x\n").await, 0.0);
        assert_eq!(est.cache().len().await, 0);
    }
}

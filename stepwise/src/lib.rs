//! # Stepwise
//!
//! Orchestration layer for step-by-step reasoning search over a generative model. An
//! external [`SearchEngine`] owns the tree and calls back into a [`ReasoningTask`] to
//! propose steps, reflect and score; the task then verifies terminal leaves, selects a
//! solution and emits one of the [`RunOutput`] shapes.
//!
//! ## Design principles
//!
//! - **Explicit rejections**: malformed or repeated steps come back as [`StepRejection`]
//!   values; the engine decides whether to re-request.
//! - **Bounded retry, then fallback**: reflection and summary calls retry a fixed number of
//!   times ([`RetrySettings`]) and then fall back deterministically, so a run always
//!   completes once configured correctly.
//! - **Closed enums for dispatch**: backend families, reward regimes and output modes are
//!   matched exhaustively.
//! - **Arena tree**: the engine's tree is a `Vec` of [`Node`]s addressed by [`NodeId`].
//!
//! ## Main modules
//!
//! - [`step`]: [`StepNormalizer`], the ordered rule table for raw model output.
//! - [`reflection`]: [`ReflectionPolicy`], short and long reflection forms.
//! - [`value`]: [`ValueEstimator`] over the per-run [`ValueCache`]; [`unwrap_value`].
//! - [`summary`]: [`SummaryResolver`], [`SyntacticSummary`] fallback.
//! - [`verify`] / [`select`]: [`LeafVerifier`], [`SolutionSelector`] with weighted voting.
//! - [`task`]: [`ReasoningTask`], the run state machine.
//! - [`engine`]: [`SearchEngine`], [`ExpansionCallbacks`], [`ReplayEngine`], [`GreedyEngine`].
//! - [`llm`]: [`ModelBackend`], [`MockBackend`], [`OpenAiBackend`].
//! - [`config`]: [`TaskConfig`] (TOML `[task]` table, `.env` and XDG via `env_config`).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stepwise::{GreedyEngine, MockBackend, ReasoningTask, ScoreResponse, TaskConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(
//!     MockBackend::new()
//!         .with_default_proposal(["Next step: 2 + 2 = 4, so the answer is \\boxed{4}"])
//!         .with_default_score(ScoreResponse::Value(0.95)),
//! );
//! let config = TaskConfig::new("What is 2 + 2?")
//!     .with_answer("4")
//!     .with_iteration_limit(4);
//! let task = ReasoningTask::new(config, backend)?;
//! let outcome = task.run(&GreedyEngine::new()).await?;
//! println!("{}", serde_json::to_string(&outcome.output)?);
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod prompts;
pub mod reflection;
pub mod retry;
pub mod select;
pub mod step;
pub mod summary;
pub mod task;
pub mod tree;
pub mod value;
pub mod verify;

pub use answer::{
    AnswerEquivalence, AnswerExtractor, BoxedAnswerExtractor, ExactMatch, ModelJudge,
};
pub use cache::{Cache, InMemoryCache, ValueCache};
pub use config::{
    BackendFamily, EvaluationMode, GenerationConfig, Language, ReflectionMode, RewardModel,
    RollPolicy, SamplingMode, SearchBudget, TaskConfig, ValueRange, VerifyMethod,
};
pub use engine::{
    ExpansionCallbacks, GreedyEngine, ReplayEngine, SearchEngine, SearchLimits, SearchOutcome,
};
pub use error::{BackendError, ConfigError, StepRejection, TaskError};
pub use llm::{MockBackend, ModelBackend, OpenAiBackend, ScoreResponse};
pub use prompts::{DefaultPrompts, PromptBuilder, PromptContext};
pub use reflection::{Reflection, ReflectionPolicy};
pub use retry::{RetryPolicy, RetrySettings, REFLECTION_ATTEMPTS, SUMMARY_ATTEMPTS};
pub use select::{AnswerGroup, Selection, SolutionSelector};
pub use step::{StepNormalizer, StepRule};
pub use summary::{DeterministicSummaryFallback, SummaryResolver, SyntacticSummary};
pub use task::{
    FinalizeMode, PolicySample, ReasoningTask, ReasoningTaskBuilder, RunOutcome, RunOutput,
    RunPhase,
};
pub use tree::{Node, NodeId, Tree, ValueSample};
pub use value::{unwrap_value, ValueEstimator};
pub use verify::{LeafVerifier, Verification};

#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}

//! Run orchestration: [`ReasoningTask`] drives one search and turns the explored tree
//! into a [`RunOutput`].
//!
//! Phases: `Init → LimitConfigured → Searched → Finalizing(mode) → Done`. The output
//! mode, and the preconditions it carries, are resolved during `Init` so a
//! misconfigured run fails before any model call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::answer::{AnswerEquivalence, AnswerExtractor, BoxedAnswerExtractor, ExactMatch, ModelJudge};
use crate::cache::{Cache, ValueCache};
use crate::config::{RewardModel, SamplingMode, TaskConfig, VerifyMethod};
use crate::engine::{ExpansionCallbacks, SearchEngine, SearchLimits, SearchOutcome};
use crate::error::{ConfigError, StepRejection, TaskError};
use crate::llm::{propose_or_empty, ModelBackend};
use crate::logging;
use crate::prompts::{DefaultPrompts, PromptBuilder, PromptContext};
use crate::reflection::{Reflection, ReflectionPolicy};
use crate::retry::RetrySettings;
use crate::select::SolutionSelector;
use crate::step::StepNormalizer;
use crate::summary::{DeterministicSummaryFallback, SummaryResolver, SyntacticSummary};
use crate::tree::{NodeId, Tree, ValueSample};
use crate::value::ValueEstimator;
use crate::verify::{ensure_summary, LeafVerifier};

/// How the explored tree becomes output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Value model, named benchmark: answer for the chosen node, no ground truth.
    Benchmark,
    /// Value model, evaluation off: chosen node checked against the ground truth.
    Evaluate,
    /// Value model, full sampling: policy and value samples over verified leaves.
    ExportSamples,
    /// Value model, full sampling with a benchmark: selected solution checked.
    SelectAndEvaluate,
    /// Process reward model: policy and value samples over verified leaves.
    ProcessRewardSamples,
}

/// Run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    LimitConfigured,
    Searched,
    Finalizing(FinalizeMode),
    Done,
}

/// One exported leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySample {
    pub solution: String,
    pub summary: String,
    pub correct: bool,
}

/// Structured result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutput {
    Answer {
        #[serde(rename = "content")]
        question: String,
        solution: String,
        summary: String,
        #[serde(rename = "finish")]
        finished: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value_samples: Option<Vec<ValueSample>>,
    },
    Evaluated {
        #[serde(rename = "content")]
        question: String,
        solution: String,
        summary: String,
        #[serde(rename = "finish")]
        finished: bool,
        #[serde(rename = "accurate")]
        correct: bool,
        #[serde(rename = "real_answer")]
        ground_truth: Option<String>,
    },
    Samples {
        #[serde(rename = "content")]
        question: String,
        policy_samples: Vec<PolicySample>,
        value_samples: Vec<ValueSample>,
        #[serde(rename = "real_answer")]
        ground_truth: String,
    },
}

/// Output plus the explored tree.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub output: RunOutput,
    pub chosen: NodeId,
    pub tree: Tree,
}

/// Builder for [`ReasoningTask`]. Every collaborator has a default.
pub struct ReasoningTaskBuilder {
    config: TaskConfig,
    backend: Arc<dyn ModelBackend>,
    prompts: Option<Arc<dyn PromptBuilder>>,
    retry: RetrySettings,
    extractor: Arc<dyn AnswerExtractor>,
    equivalence: Option<Arc<dyn AnswerEquivalence>>,
    fallback: Arc<dyn DeterministicSummaryFallback>,
}

impl ReasoningTaskBuilder {
    pub fn prompts(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn answer_extractor(mut self, extractor: Arc<dyn AnswerExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Overrides the equivalence check otherwise chosen by `verify_method`.
    pub fn equivalence(mut self, equivalence: Arc<dyn AnswerEquivalence>) -> Self {
        self.equivalence = Some(equivalence);
        self
    }

    pub fn summary_fallback(mut self, fallback: Arc<dyn DeterministicSummaryFallback>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn build(self) -> Result<ReasoningTask, ConfigError> {
        self.config.validate()?;
        let config = self.config;
        let range = config.value_range()?;
        let backend = self.backend;
        let prompts: Arc<dyn PromptBuilder> = match self.prompts {
            Some(prompts) => prompts,
            None => Arc::new(DefaultPrompts::new().with_case_prompt(config.use_case_prompt)),
        };
        let cache = Arc::new(ValueCache::new());

        let reflection = ReflectionPolicy::new(
            backend.clone(),
            prompts.clone(),
            config.propose_method,
            config.lang,
            config.generation.clone(),
            self.retry.reflection.clone(),
        );
        let estimator = ValueEstimator::new(
            backend.clone(),
            prompts.clone(),
            cache.clone(),
            config.value_method,
            range,
        );
        let resolver = Arc::new(SummaryResolver::new(
            backend.clone(),
            prompts.clone(),
            self.fallback,
            &config.generation,
            self.retry.summary.clone(),
            config.verify_method,
        ));
        let equivalence: Arc<dyn AnswerEquivalence> = match self.equivalence {
            Some(equivalence) => equivalence,
            None => match config.verify_method {
                VerifyMethod::StringMatch => Arc::new(ExactMatch::new(self.extractor.clone())),
                VerifyMethod::ModelJudge => Arc::new(ModelJudge::new(
                    backend.clone(),
                    prompts.clone(),
                    &config.generation,
                )),
            },
        };
        let verifier = LeafVerifier::new(
            resolver.clone(),
            equivalence.clone(),
            config.reward_model,
            config.end_gate,
        );
        let selector = SolutionSelector::new(
            resolver.clone(),
            self.extractor,
            config.reward_model,
            config.end_gate,
        );

        Ok(ReasoningTask {
            config,
            backend,
            prompts,
            normalizer: StepNormalizer::new(),
            reflection,
            estimator,
            resolver,
            equivalence,
            verifier,
            selector,
            cache,
            node_count: AtomicUsize::new(1),
        })
    }
}

/// One reasoning run over a question. Implements [`ExpansionCallbacks`] for the engine.
pub struct ReasoningTask {
    config: TaskConfig,
    backend: Arc<dyn ModelBackend>,
    prompts: Arc<dyn PromptBuilder>,
    normalizer: StepNormalizer,
    reflection: ReflectionPolicy,
    estimator: ValueEstimator,
    resolver: Arc<SummaryResolver>,
    equivalence: Arc<dyn AnswerEquivalence>,
    verifier: LeafVerifier,
    selector: SolutionSelector,
    cache: Arc<ValueCache>,
    node_count: AtomicUsize,
}

impl ReasoningTask {
    pub fn builder(config: TaskConfig, backend: Arc<dyn ModelBackend>) -> ReasoningTaskBuilder {
        ReasoningTaskBuilder {
            config,
            backend,
            prompts: None,
            retry: RetrySettings::default(),
            extractor: Arc::new(BoxedAnswerExtractor),
            equivalence: None,
            fallback: Arc::new(SyntacticSummary),
        }
    }

    /// Task with default prompts, retries, extraction and equivalence.
    pub fn new(config: TaskConfig, backend: Arc<dyn ModelBackend>) -> Result<Self, ConfigError> {
        Self::builder(config, backend).build()
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn cache(&self) -> &ValueCache {
        &self.cache
    }

    /// Nodes created so far, root included.
    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::SeqCst)
    }

    fn prompt_context<'a>(&'a self, y: &'a str, step_index: usize) -> PromptContext<'a> {
        PromptContext {
            question: &self.config.question,
            trajectory: y,
            step_index,
            language: self.config.lang,
            family: self.config.propose_method,
        }
    }

    fn require_answer(&self, mode: &'static str) -> Result<(), ConfigError> {
        match self.config.answer {
            Some(_) => Ok(()),
            None => Err(ConfigError::MissingGroundTruth { mode }),
        }
    }

    /// Output mode for the configured reward model, sampling and evaluation.
    pub fn finalize_mode(&self) -> Result<FinalizeMode, ConfigError> {
        let c = &self.config;
        match (c.reward_model, c.sample_value, c.evaluate.is_on()) {
            (RewardModel::ProcessReward, SamplingMode::None, _) => {
                Err(ConfigError::SamplingRequired)
            }
            (RewardModel::ProcessReward, SamplingMode::Simple | SamplingMode::Full, _) => {
                self.require_answer("process reward sampling")?;
                Ok(FinalizeMode::ProcessRewardSamples)
            }
            (RewardModel::ValueModel, SamplingMode::None | SamplingMode::Simple, true) => {
                Ok(FinalizeMode::Benchmark)
            }
            (RewardModel::ValueModel, SamplingMode::None | SamplingMode::Simple, false) => {
                Ok(FinalizeMode::Evaluate)
            }
            (RewardModel::ValueModel, SamplingMode::Full, false) => {
                self.require_answer("full sampling")?;
                Ok(FinalizeMode::ExportSamples)
            }
            (RewardModel::ValueModel, SamplingMode::Full, true) => {
                self.require_answer("full sampling evaluation")?;
                Ok(FinalizeMode::SelectAndEvaluate)
            }
        }
    }

    fn advance(phase: &mut RunPhase, to: RunPhase) {
        logging::log_phase(*phase, to);
        *phase = to;
    }

    /// Validates the budget, resets per-run state, runs `engine` and finalizes.
    pub async fn run(&self, engine: &dyn SearchEngine) -> Result<RunOutcome, TaskError> {
        let result = self.run_phases(engine).await;
        if let Err(ref e) = result {
            logging::log_run_error(e);
        }
        result
    }

    async fn run_phases(&self, engine: &dyn SearchEngine) -> Result<RunOutcome, TaskError> {
        let mut phase = RunPhase::Init;
        let budget = self.config.search_budget()?;
        let mode = self.finalize_mode()?;
        let limits = SearchLimits::new(&self.config, budget);
        self.cache.clear().await;
        self.node_count.store(1, Ordering::SeqCst);
        Self::advance(&mut phase, RunPhase::LimitConfigured);

        let SearchOutcome {
            chosen,
            finished,
            mut tree,
        } = engine.search(self, &limits).await?;
        if tree.get(chosen).is_none() {
            return Err(TaskError::Engine(format!(
                "engine chose node {} outside its tree",
                chosen.0
            )));
        }
        logging::log_search_complete(tree.len(), finished);
        Self::advance(&mut phase, RunPhase::Searched);

        Self::advance(&mut phase, RunPhase::Finalizing(mode));
        let output = self.finalize(mode, &mut tree, chosen, finished).await;
        Self::advance(&mut phase, RunPhase::Done);

        Ok(RunOutcome {
            output,
            chosen,
            tree,
        })
    }

    async fn finalize(
        &self,
        mode: FinalizeMode,
        tree: &mut Tree,
        chosen: NodeId,
        finished: bool,
    ) -> RunOutput {
        let question = self.config.question.clone();
        let answer = self.config.answer.clone();
        match mode {
            FinalizeMode::Benchmark => {
                let summary = ensure_summary(&self.resolver, &question, tree, chosen).await;
                let value_samples = match self.config.sample_value {
                    SamplingMode::Simple => Some(tree.value_samples_along_path(chosen)),
                    SamplingMode::None | SamplingMode::Full => None,
                };
                RunOutput::Answer {
                    question,
                    solution: tree.node(chosen).trajectory.clone(),
                    summary,
                    finished,
                    value_samples,
                }
            }
            FinalizeMode::Evaluate => {
                let summary = ensure_summary(&self.resolver, &question, tree, chosen).await;
                let correct = match &answer {
                    Some(truth) => self.equivalence.matches(&summary, truth).await,
                    None => false,
                };
                RunOutput::Evaluated {
                    question,
                    solution: tree.node(chosen).trajectory.clone(),
                    summary,
                    finished,
                    correct,
                    ground_truth: answer,
                }
            }
            FinalizeMode::SelectAndEvaluate => {
                let selection = self
                    .selector
                    .select(&question, tree, self.config.weighted_verify)
                    .await;
                let correct = match &answer {
                    Some(truth) if !selection.summary.is_empty() => {
                        self.equivalence.matches(&selection.summary, truth).await
                    }
                    _ => false,
                };
                RunOutput::Evaluated {
                    question,
                    solution: selection.solution,
                    summary: selection.summary,
                    finished,
                    correct,
                    ground_truth: answer,
                }
            }
            FinalizeMode::ExportSamples | FinalizeMode::ProcessRewardSamples => {
                let truth = answer.unwrap_or_default();
                let verification = self.verifier.verify(&question, tree, &truth).await;
                let prm = mode == FinalizeMode::ProcessRewardSamples;
                let policy_samples = verification
                    .leaves
                    .iter()
                    .map(|&leaf| {
                        let node = tree.node(leaf);
                        PolicySample {
                            solution: node.trajectory.clone(),
                            summary: node.summary.clone(),
                            correct: if prm {
                                node.he
                            } else {
                                node.min_steps_to_correct == Some(1)
                            },
                        }
                    })
                    .collect();
                let value_samples = match (verification.any_correct, prm) {
                    (false, _) => Vec::new(),
                    (true, false) => tree.full_value_samples_vm(&verification.leaves),
                    (true, true) => tree.full_value_samples_prm(&verification.leaves),
                };
                RunOutput::Samples {
                    question,
                    policy_samples,
                    value_samples,
                    ground_truth: truth,
                }
            }
        }
    }

    async fn proposal(&self, prompt: &str) -> Vec<String> {
        propose_or_empty(self.backend.as_ref(), prompt, &self.config.generation).await
    }

    fn accept(
        step_index: usize,
        result: Result<String, StepRejection>,
    ) -> Result<String, StepRejection> {
        match &result {
            Ok(step) => logging::log_step_accepted(step_index, step),
            Err(reason) => logging::log_step_rejected(step_index, *reason),
        }
        result
    }
}

#[async_trait]
impl ExpansionCallbacks for ReasoningTask {
    async fn propose_step(&self, y: &str, step_index: usize) -> Result<String, StepRejection> {
        let prompt = self.prompts.propose(&self.prompt_context(y, step_index));
        let fragments = self.proposal(&prompt).await;
        Self::accept(
            step_index,
            self.normalizer.normalize(&fragments, y, step_index),
        )
    }

    async fn propose_step_with_reflection(
        &self,
        y: &str,
        step_index: usize,
        reflection: &str,
    ) -> Result<String, StepRejection> {
        let prompt = self
            .prompts
            .propose_with_reflection(&self.prompt_context(y, step_index), reflection);
        let fragments = self.proposal(&prompt).await;
        Self::accept(
            step_index,
            self.normalizer
                .normalize_with_reflection(&fragments, y, step_index),
        )
    }

    async fn reflect(&self, y: &str, step_index: usize) -> Option<Reflection> {
        self.reflection
            .decide(&self.config.question, y, step_index, self.config.use_reflection)
            .await
    }

    async fn score(&self, y: &str) -> f64 {
        self.estimator.score(&self.config.question, y).await
    }

    fn record_node(&self) -> usize {
        self.node_count.fetch_add(1, Ordering::SeqCst) + 1
    }
}

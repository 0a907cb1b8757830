//! Task configuration: one immutable [`TaskConfig`] per run.
//!
//! Deserializes from a TOML `[task]` table (see [`TaskConfig::load`]) or is built in code
//! with the `with_*` builders. Backend families, reward regimes and output modes are closed
//! enums so every consumer matches them exhaustively.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output-token budget for short calls (short-form reflection, summaries).
pub const SHORT_OUTPUT_TOKENS: u32 = 128;

/// Model backend family. Selects prompt variants and backend-specific heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    Gpt,
    #[default]
    Glm,
    Local,
    Mistral,
    Llama,
}

impl BackendFamily {
    /// Families whose English output reliably ends with a terminal phrase, so reflection
    /// can stop without a model call once one appears.
    pub fn detects_terminal_phrase(self) -> bool {
        match self {
            BackendFamily::Local | BackendFamily::Mistral | BackendFamily::Llama => true,
            BackendFamily::Gpt | BackendFamily::Glm => false,
        }
    }
}

/// Working language for prompts and heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

/// Reward-model regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RewardModel {
    /// Continuous value model; terminality by end-gate threshold.
    #[default]
    #[serde(rename = "vm")]
    ValueModel,
    /// Process reward model; engine-defined terminal nodes, binary correctness.
    #[serde(rename = "prm")]
    ProcessReward,
}

/// How much training data a run exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    #[serde(alias = "")]
    None,
    #[default]
    Simple,
    Full,
}

/// Evaluation mode: off, or a named external benchmark.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EvaluationMode {
    #[default]
    Off,
    Benchmark(String),
}

impl EvaluationMode {
    pub fn is_on(&self) -> bool {
        matches!(self, EvaluationMode::Benchmark(_))
    }
}

impl From<String> for EvaluationMode {
    fn from(s: String) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("off") {
            EvaluationMode::Off
        } else {
            EvaluationMode::Benchmark(s.to_string())
        }
    }
}

impl From<EvaluationMode> for String {
    fn from(m: EvaluationMode) -> Self {
        match m {
            EvaluationMode::Off => String::new(),
            EvaluationMode::Benchmark(name) => name,
        }
    }
}

/// How a candidate summary is compared with the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerifyMethod {
    #[default]
    #[serde(rename = "string")]
    StringMatch,
    #[serde(rename = "llm")]
    ModelJudge,
}

/// Reflection form used during expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReflectionMode {
    /// Short form: continue/end only.
    #[default]
    Simple,
    /// Long form: end, or a critique handed back to the step proposer.
    Full,
}

/// Rollout policy passed through to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollPolicy {
    #[default]
    Greedy,
    Random,
}

/// Generation parameters forwarded to the backend on every proposal call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub seed: i64,
    pub max_length: u32,
    pub truncation: bool,
    pub do_sample: bool,
    pub max_new_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            seed: 170,
            max_length: 2048,
            truncation: true,
            do_sample: true,
            max_new_tokens: 256,
        }
    }
}

impl GenerationConfig {
    /// Same parameters with a different output-token budget.
    pub fn with_max_new_tokens(&self, max_new_tokens: u32) -> Self {
        Self {
            max_new_tokens,
            ..self.clone()
        }
    }
}

/// Half-open value range `[low, high)` for value estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigError> {
        if !(low.is_finite() && high.is_finite() && 0.0 <= low && low < high) {
            return Err(ConfigError::InvalidValueRange { low, high });
        }
        Ok(Self { low, high })
    }

    /// Clamps into `[low, high)`. NaN maps to `low`.
    pub fn clamp(&self, v: f64) -> f64 {
        if v.is_nan() || v < self.low {
            self.low
        } else if v >= self.high {
            // high > 0, so stepping the bit pattern down gives the next smaller float
            f64::from_bits(self.high.to_bits() - 1)
        } else {
            v
        }
    }
}

/// Validated search budget: exactly one of time or iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    Time(Duration),
    Iterations(u32),
}

/// Task configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub question: String,
    /// Ground-truth answer; required for sample export and evaluation.
    pub answer: Option<String>,
    pub propose_method: BackendFamily,
    pub value_method: BackendFamily,
    pub reward_model: RewardModel,
    pub sample_value: SamplingMode,
    pub evaluate: EvaluationMode,
    pub verify_method: VerifyMethod,
    pub weighted_verify: bool,
    pub use_reflection: ReflectionMode,
    pub use_case_prompt: bool,
    pub lang: Language,
    pub branch: usize,
    pub end_gate: f64,
    /// Wall-clock budget in milliseconds.
    pub time_limit_ms: Option<u64>,
    pub iteration_limit: Option<u32>,
    pub exploration_constant: f64,
    pub alpha: f64,
    pub inf: f64,
    pub roll_policy: RollPolicy,
    pub roll_branch: usize,
    pub roll_forward_steps: usize,
    pub low: f64,
    pub high: f64,
    #[serde(flatten)]
    pub generation: GenerationConfig,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            question: String::new(),
            answer: None,
            propose_method: BackendFamily::default(),
            value_method: BackendFamily::default(),
            reward_model: RewardModel::default(),
            sample_value: SamplingMode::default(),
            evaluate: EvaluationMode::default(),
            verify_method: VerifyMethod::default(),
            weighted_verify: false,
            use_reflection: ReflectionMode::default(),
            use_case_prompt: false,
            lang: Language::default(),
            branch: 3,
            end_gate: 0.9,
            time_limit_ms: None,
            iteration_limit: None,
            exploration_constant: 0.7,
            alpha: 0.5,
            inf: 1.0,
            roll_policy: RollPolicy::default(),
            roll_branch: 1,
            roll_forward_steps: 3,
            low: 0.0,
            high: 1.0,
            generation: GenerationConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Config with defaults for the given question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    /// Parses a TOML document whose top level is the task table.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: TaskConfig = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `.env` / XDG env, then reads the `[task]` table of
    /// `$XDG_CONFIG_HOME/<app_name>/config.toml`. Missing table yields defaults.
    pub fn load(app_name: &str, override_dir: Option<&Path>) -> Result<Self, ConfigError> {
        env_config::load_and_apply(app_name, override_dir)?;
        let config = match env_config::load_section(app_name, "task")? {
            Some(table) => table
                .try_into::<TaskConfig>()
                .map_err(|e| ConfigError::Parse(e.to_string()))?,
            None => TaskConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks value range and end gate. The search budget is checked at run setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ValueRange::new(self.low, self.high)?;
        if !(self.end_gate > 0.0 && self.end_gate <= 1.0) {
            return Err(ConfigError::InvalidEndGate(self.end_gate));
        }
        Ok(())
    }

    pub fn value_range(&self) -> Result<ValueRange, ConfigError> {
        ValueRange::new(self.low, self.high)
    }

    /// Resolves the search budget: exactly one of time limit or iteration limit.
    pub fn search_budget(&self) -> Result<SearchBudget, ConfigError> {
        match (self.time_limit_ms, self.iteration_limit) {
            (Some(_), Some(_)) => Err(ConfigError::BothLimits),
            (Some(ms), None) => Ok(SearchBudget::Time(Duration::from_millis(ms))),
            (None, Some(n)) if n < 1 => Err(ConfigError::IterationLimitTooSmall(n)),
            (None, Some(n)) => Ok(SearchBudget::Iterations(n)),
            (None, None) => Err(ConfigError::NoLimit),
        }
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    /// Sets both the proposal and the value backend family.
    pub fn with_backend(mut self, family: BackendFamily) -> Self {
        self.propose_method = family;
        self.value_method = family;
        self
    }

    pub fn with_reward_model(mut self, reward_model: RewardModel) -> Self {
        self.reward_model = reward_model;
        self
    }

    pub fn with_sampling(mut self, mode: SamplingMode) -> Self {
        self.sample_value = mode;
        self
    }

    pub fn with_evaluation(mut self, mode: EvaluationMode) -> Self {
        self.evaluate = mode;
        self
    }

    pub fn with_verify_method(mut self, method: VerifyMethod) -> Self {
        self.verify_method = method;
        self
    }

    pub fn with_weighted_verify(mut self, weighted: bool) -> Self {
        self.weighted_verify = weighted;
        self
    }

    pub fn with_reflection_mode(mut self, mode: ReflectionMode) -> Self {
        self.use_reflection = mode;
        self
    }

    pub fn with_language(mut self, lang: Language) -> Self {
        self.lang = lang;
        self
    }

    pub fn with_iteration_limit(mut self, n: u32) -> Self {
        self.iteration_limit = Some(n);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_ms = Some(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_end_gate(mut self, end_gate: f64) -> Self {
        self.end_gate = end_gate;
        self
    }

    pub fn with_value_range(mut self, low: f64, high: f64) -> Self {
        self.low = low;
        self.high = high;
        self
    }
}

//! Error types for a reasoning run.
//!
//! Configuration errors are fatal and abort the run before any model call.
//! Backend errors are transient: call sites turn them into empty responses so the
//! bounded retry and deterministic fallback apply. Step rejections are plain values.

use thiserror::Error;

/// Caller misconfiguration. Never retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Both a time limit and an iteration limit were configured.
    #[error("cannot have both a time limit and an iteration limit")]
    BothLimits,

    /// Neither a time limit nor an iteration limit was configured.
    #[error("must have either a time limit or an iteration limit")]
    NoLimit,

    /// Iteration limit below one.
    #[error("iteration limit must be at least 1, got {0}")]
    IterationLimitTooSmall(u32),

    /// Value range must satisfy `0 <= low < high`.
    #[error("inappropriate value range: low={low}, high={high}")]
    InvalidValueRange { low: f64, high: f64 },

    /// End gate must lie in (0, 1].
    #[error("end gate must be in (0, 1], got {0}")]
    InvalidEndGate(f64),

    /// The selected output mode needs a ground-truth answer.
    #[error("ground-truth answer is required for {mode}")]
    MissingGroundTruth { mode: &'static str },

    /// The process reward model only supports sample export.
    #[error("only sampling is supported for the process reward model")]
    SamplingRequired,

    /// Loading `.env` / XDG config failed.
    #[error("load config: {0}")]
    Load(String),

    /// Task table could not be parsed.
    #[error("parse task config: {0}")]
    Parse(String),
}

impl From<env_config::LoadError> for ConfigError {
    fn from(e: env_config::LoadError) -> Self {
        ConfigError::Load(e.to_string())
    }
}

/// Failure talking to the model backend (network, API, malformed payload).
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request could not be built or sent, or the API returned an error.
    #[error("backend request failed: {0}")]
    Request(String),

    /// API answered without any choice.
    #[error("backend returned no choices")]
    NoChoices,

    /// Response payload could not be interpreted.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Why a proposed step was not accepted. Signaled to the engine as "no result".
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StepRejection {
    /// Backend produced no fragments.
    #[error("failed to get next step")]
    NoResponse,

    /// Extracted body is below the rule's minimum length.
    #[error("step output too short")]
    TooShort,

    /// Extracted body already occurs in the prior trajectory.
    #[error("step output repeated")]
    Repeated,

    /// Strict mode found neither `Next step:` nor a `Step ...:` pattern.
    #[error("output format error")]
    FormatError,
}

/// Top-level run error.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The external search engine failed.
    #[error("search engine failed: {0}")]
    Engine(String),
}

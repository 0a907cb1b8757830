//! Bounded retry for backend calls that may come back empty.
//!
//! Reflection and summary calls treat an empty response as a transient failure and
//! re-ask the backend a fixed number of times before the caller's deterministic
//! fallback kicks in. Counts live in [`RetrySettings`] so tests can override them.

use std::future::Future;
use std::time::Duration;

/// Attempts for a reflection call before defaulting.
pub const REFLECTION_ATTEMPTS: usize = 3;

/// Attempts for a summary call before the syntactic fallback.
pub const SUMMARY_ATTEMPTS: usize = 5;

/// Retry policy for empty backend responses.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// Single attempt.
    None,
    /// Up to `max_attempts` attempts with a constant delay between them.
    Fixed {
        max_attempts: usize,
        interval: Duration,
    },
    /// Up to `max_attempts` attempts with exponentially growing delays.
    Exponential {
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy::None
    }

    pub fn fixed(max_attempts: usize, interval: Duration) -> Self {
        RetryPolicy::Fixed {
            max_attempts,
            interval,
        }
    }

    /// Fixed policy without delay between attempts.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub fn exponential(
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial_interval,
            max_interval,
            multiplier,
        }
    }

    /// Total attempts, never less than one.
    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 1,
            RetryPolicy::Fixed { max_attempts, .. } => (*max_attempts).max(1),
            RetryPolicy::Exponential { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    /// Whether attempt number `attempt` (0-based) may run.
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts()
    }

    /// Delay after failed attempt `attempt` (0-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Fixed { interval, .. } => *interval,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let delay_secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                Duration::from_secs_f64(delay_secs).min(*max_interval)
            }
        }
    }

    /// Runs `call` until it yields a non-empty fragment list or attempts run out.
    ///
    /// Returns `None` when every attempt was empty; `what` names the call in logs.
    pub async fn until_nonempty<F, Fut>(&self, what: &str, mut call: F) -> Option<Vec<String>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Vec<String>>,
    {
        let mut attempt = 0;
        while self.should_retry(attempt) {
            let fragments = call().await;
            if !fragments.is_empty() {
                return Some(fragments);
            }
            tracing::debug!(what = what, attempt = attempt, "empty backend response");
            attempt += 1;
            if self.should_retry(attempt) {
                let delay = self.delay(attempt - 1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
        None
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::None
    }
}

/// Retry policies per call site.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub reflection: RetryPolicy,
    pub summary: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            reflection: RetryPolicy::immediate(REFLECTION_ATTEMPTS),
            summary: RetryPolicy::immediate(SUMMARY_ATTEMPTS),
        }
    }
}

//! Logging helpers for a reasoning run.
//!
//! Structured events for phase transitions, step normalization and leaf verification.

use crate::error::{StepRejection, TaskError};
use crate::task::RunPhase;

/// Log a run phase transition.
pub fn log_phase(from: RunPhase, to: RunPhase) {
    tracing::info!(from = ?from, phase = ?to, "Run phase transition");
}

/// Log an accepted step.
pub fn log_step_accepted(step_index: usize, step: &str) {
    tracing::debug!(step_index, step = %step.trim_end(), "Normalized new step");
}

/// Log a rejected proposal. The engine decides whether to re-request.
pub fn log_step_rejected(step_index: usize, reason: StepRejection) {
    tracing::warn!(step_index, reason = %reason, "Step rejected");
}

/// Log the end of the external search.
pub fn log_search_complete(nodes: usize, finished: bool) {
    tracing::info!(nodes, finished, "Search complete");
}

/// Log the result of verifying one terminal leaf.
pub fn log_leaf_verified(step_index: usize, correct: bool) {
    tracing::debug!(step_index, correct, "Leaf verified");
}

/// Log a fatal run error.
pub fn log_run_error(error: &TaskError) {
    tracing::error!(?error, "Run failed");
}

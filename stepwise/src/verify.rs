//! Terminal-leaf classification and verification against the ground truth.

use std::sync::Arc;

use crate::answer::AnswerEquivalence;
use crate::config::RewardModel;
use crate::logging;
use crate::summary::SummaryResolver;
use crate::tree::{NodeId, Tree};

/// Terminal leaves under the given regime: end-gate threshold for the value model,
/// engine-flagged terminal nodes for the process reward model.
pub fn terminal_leaves(tree: &Tree, reward_model: RewardModel, end_gate: f64) -> Vec<NodeId> {
    match reward_model {
        RewardModel::ValueModel => tree.terminal_leaves_by_value(end_gate),
        RewardModel::ProcessReward => tree.terminal_leaves_prm(),
    }
}

/// Returns the node's summary, resolving and storing it first if it is still empty.
pub async fn ensure_summary(
    resolver: &SummaryResolver,
    question: &str,
    tree: &mut Tree,
    id: NodeId,
) -> String {
    let existing = &tree.node(id).summary;
    if !existing.is_empty() {
        return existing.clone();
    }
    let y = tree.node(id).trajectory.clone();
    let summary = resolver.resolve(question, &y).await;
    tree.node_mut(id).summary = summary.clone();
    summary
}

/// Result of [`LeafVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// At least one leaf matched the ground truth.
    pub any_correct: bool,
    /// Every terminal leaf, matched or not, in engine order.
    pub leaves: Vec<NodeId>,
}

/// Marks, summarizes and checks every terminal leaf.
pub struct LeafVerifier {
    resolver: Arc<SummaryResolver>,
    equivalence: Arc<dyn AnswerEquivalence>,
    reward_model: RewardModel,
    end_gate: f64,
}

impl LeafVerifier {
    pub fn new(
        resolver: Arc<SummaryResolver>,
        equivalence: Arc<dyn AnswerEquivalence>,
        reward_model: RewardModel,
        end_gate: f64,
    ) -> Self {
        Self {
            resolver,
            equivalence,
            reward_model,
            end_gate,
        }
    }

    /// Sets `on_final_route` and a summary on every leaf; a match sets
    /// `min_steps_to_correct = Some(1)` (value model) or `he = true` (process reward).
    pub async fn verify(&self, question: &str, tree: &mut Tree, ground_truth: &str) -> Verification {
        let leaves = terminal_leaves(tree, self.reward_model, self.end_gate);
        let mut any_correct = false;
        for &leaf in &leaves {
            tree.node_mut(leaf).on_final_route = true;
            let summary = ensure_summary(&self.resolver, question, tree, leaf).await;
            let correct = self.equivalence.matches(&summary, ground_truth).await;
            if correct {
                let node = tree.node_mut(leaf);
                match self.reward_model {
                    RewardModel::ValueModel => node.min_steps_to_correct = Some(1),
                    RewardModel::ProcessReward => node.he = true,
                }
                any_correct = true;
            }
            logging::log_leaf_verified(tree.node(leaf).step_index, correct);
        }
        Verification {
            any_correct,
            leaves,
        }
    }
}

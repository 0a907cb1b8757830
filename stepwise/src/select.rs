//! Final solution selection: greedy best value, or value-weighted voting over answers.
//!
//! Weighted voting sums `V` per extracted answer, so values of different leaves must
//! be on one comparable scale. That holds when every leaf was scored by the same
//! [`ValueEstimator`](crate::value::ValueEstimator) in one run; mixing trees scored
//! by different estimators makes the sums meaningless.

use std::sync::Arc;

use tracing::debug;

use crate::answer::AnswerExtractor;
use crate::config::RewardModel;
use crate::summary::SummaryResolver;
use crate::tree::{NodeId, Tree};
use crate::verify::{ensure_summary, terminal_leaves};

/// Leaves sharing one extracted answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerGroup {
    pub key: String,
    /// First leaf seen with this answer.
    pub representative: NodeId,
    pub solution: String,
    pub summary: String,
    /// Sum of `V` over every leaf in the group.
    pub value_sum: f64,
    pub members: usize,
}

/// The emitted solution.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub node: NodeId,
    pub solution: String,
    pub summary: String,
}

/// Groups leaves by extracted answer, keeping first-seen order.
pub fn group_answers(
    tree: &Tree,
    leaves: &[NodeId],
    extractor: &dyn AnswerExtractor,
) -> Vec<AnswerGroup> {
    let mut groups: Vec<AnswerGroup> = Vec::new();
    for &leaf in leaves {
        let node = tree.node(leaf);
        let key = extractor.extract(&node.summary);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => {
                group.value_sum += node.value;
                group.members += 1;
            }
            None => groups.push(AnswerGroup {
                key,
                representative: leaf,
                solution: node.trajectory.clone(),
                summary: node.summary.clone(),
                value_sum: node.value,
                members: 1,
            }),
        }
    }
    groups
}

/// First group with the largest value sum.
pub fn heaviest_group(groups: &[AnswerGroup]) -> Option<&AnswerGroup> {
    let mut best: Option<&AnswerGroup> = None;
    for group in groups {
        match best {
            Some(b) if group.value_sum <= b.value_sum => {}
            _ => best = Some(group),
        }
    }
    best
}

fn first_max_by_value(tree: &Tree, ids: &[NodeId]) -> Option<NodeId> {
    let mut best: Option<NodeId> = None;
    for &id in ids {
        match best {
            Some(b) if tree.node(id).value <= tree.node(b).value => {}
            _ => best = Some(id),
        }
    }
    best
}

/// Chooses the solution to emit from an explored tree.
pub struct SolutionSelector {
    resolver: Arc<SummaryResolver>,
    extractor: Arc<dyn AnswerExtractor>,
    reward_model: RewardModel,
    end_gate: f64,
}

impl SolutionSelector {
    pub fn new(
        resolver: Arc<SummaryResolver>,
        extractor: Arc<dyn AnswerExtractor>,
        reward_model: RewardModel,
        end_gate: f64,
    ) -> Self {
        Self {
            resolver,
            extractor,
            reward_model,
            end_gate,
        }
    }

    /// Greedy: best terminal leaf, or the tree's best node when there are no leaves.
    /// Weighted (with leaves): the representative of the heaviest answer group.
    pub async fn select(&self, question: &str, tree: &mut Tree, weighted: bool) -> Selection {
        let leaves = terminal_leaves(tree, self.reward_model, self.end_gate);

        if weighted && !leaves.is_empty() {
            for &leaf in &leaves {
                ensure_summary(&self.resolver, question, tree, leaf).await;
            }
            let groups = group_answers(tree, &leaves, self.extractor.as_ref());
            if let Some(group) = heaviest_group(&groups) {
                debug!(
                    answer = %group.key,
                    value_sum = group.value_sum,
                    groups = groups.len(),
                    "weighted vote"
                );
                return Selection {
                    node: group.representative,
                    solution: group.solution.clone(),
                    summary: group.summary.clone(),
                };
            }
        }

        let node = first_max_by_value(tree, &leaves).unwrap_or_else(|| tree.best_by_value());
        let summary = ensure_summary(&self.resolver, question, tree, node).await;
        Selection {
            node,
            solution: tree.node(node).trajectory.clone(),
            summary,
        }
    }
}

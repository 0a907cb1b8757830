//! Search engine seam.
//!
//! A [`SearchEngine`] owns the tree and drives expansion; it calls back into the run
//! through [`ExpansionCallbacks`] to propose steps, reflect and score. Two engines ship
//! with the crate:
//!
//! - [`ReplayEngine`]: returns a pre-built tree, optionally re-scoring every node.
//! - [`GreedyEngine`]: expands the best child at each depth until a terminal signal or
//!   the budget runs out.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{ReflectionMode, RollPolicy, SearchBudget, TaskConfig};
use crate::error::{StepRejection, TaskError};
use crate::reflection::Reflection;
use crate::tree::{NodeId, Tree};

/// Callbacks a run exposes to the engine during expansion.
#[async_trait]
pub trait ExpansionCallbacks: Send + Sync {
    /// Proposes the step after `y`, as `Step {step_index}: ...\n`.
    async fn propose_step(&self, y: &str, step_index: usize) -> Result<String, StepRejection>;

    /// Proposes the step after `y`, conditioned on a long-form critique.
    async fn propose_step_with_reflection(
        &self,
        y: &str,
        step_index: usize,
        reflection: &str,
    ) -> Result<String, StepRejection>;

    /// Reflects on `y`; `None` is a long-form failure.
    async fn reflect(&self, y: &str, step_index: usize) -> Option<Reflection>;

    /// Value estimate for `y`.
    async fn score(&self, y: &str) -> f64;

    /// Counts a newly created node; returns the new total.
    fn record_node(&self) -> usize;
}

/// Budget and engine knobs for one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchLimits {
    pub budget: SearchBudget,
    pub branch: usize,
    pub end_gate: f64,
    pub exploration_constant: f64,
    pub alpha: f64,
    pub inf: f64,
    pub roll_policy: RollPolicy,
    pub roll_branch: usize,
    pub roll_forward_steps: usize,
    pub reflection: ReflectionMode,
}

impl SearchLimits {
    pub fn new(config: &TaskConfig, budget: SearchBudget) -> Self {
        Self {
            budget,
            branch: config.branch,
            end_gate: config.end_gate,
            exploration_constant: config.exploration_constant,
            alpha: config.alpha,
            inf: config.inf,
            roll_policy: config.roll_policy,
            roll_branch: config.roll_branch,
            roll_forward_steps: config.roll_forward_steps,
            reflection: config.use_reflection,
        }
    }

    fn deadline(&self, start: Instant) -> Option<Instant> {
        match self.budget {
            SearchBudget::Time(d) => Some(start + d),
            SearchBudget::Iterations(_) => None,
        }
    }

    fn iterations(&self) -> u32 {
        match self.budget {
            SearchBudget::Iterations(n) => n,
            SearchBudget::Time(_) => u32::MAX,
        }
    }
}

/// What the engine hands back: chosen node, whether it finished, and the explored tree.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub chosen: NodeId,
    pub finished: bool,
    pub tree: Tree,
}

/// External tree search.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(
        &self,
        callbacks: &dyn ExpansionCallbacks,
        limits: &SearchLimits,
    ) -> Result<SearchOutcome, TaskError>;
}

/// Replays a recorded tree.
///
/// With re-scoring on, every non-root node (arena order, within budget) gets a fresh value
/// from [`ExpansionCallbacks::score`].
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    tree: Tree,
    chosen: Option<NodeId>,
    finished: Option<bool>,
    rescore: bool,
}

impl ReplayEngine {
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            chosen: None,
            finished: None,
            rescore: false,
        }
    }

    /// Node reported as chosen. Defaults to the best-by-value node.
    pub fn with_chosen(mut self, id: NodeId) -> Self {
        self.chosen = Some(id);
        self
    }

    /// Finished flag. Defaults to whether the chosen node is terminal or above the end gate.
    pub fn with_finished(mut self, finished: bool) -> Self {
        self.finished = Some(finished);
        self
    }

    pub fn with_rescore(mut self, rescore: bool) -> Self {
        self.rescore = rescore;
        self
    }
}

#[async_trait]
impl SearchEngine for ReplayEngine {
    async fn search(
        &self,
        callbacks: &dyn ExpansionCallbacks,
        limits: &SearchLimits,
    ) -> Result<SearchOutcome, TaskError> {
        let mut tree = self.tree.clone();
        if tree.is_empty() {
            return Err(TaskError::Engine("replayed tree has no root".into()));
        }
        let root = tree.root();
        for _ in tree.ids().skip(1) {
            callbacks.record_node();
        }
        if self.rescore {
            let start = Instant::now();
            let deadline = limits.deadline(start);
            let ids: Vec<NodeId> = tree
                .ids()
                .filter(|id| *id != root)
                .take(limits.iterations() as usize)
                .collect();
            for id in ids {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                let y = tree.node(id).trajectory.clone();
                tree.node_mut(id).value = callbacks.score(&y).await;
            }
        }
        let chosen = match self.chosen {
            Some(id) if tree.get(id).is_some() => id,
            Some(id) => {
                return Err(TaskError::Engine(format!("chosen node {} not in tree", id.0)))
            }
            None => tree.best_by_value(),
        };
        let finished = self.finished.unwrap_or_else(|| {
            let node = tree.node(chosen);
            node.terminal || node.value > limits.end_gate
        });
        Ok(SearchOutcome {
            chosen,
            finished,
            tree,
        })
    }
}

/// Greedy expansion: `branch` proposals per depth, continue from the best-valued child.
///
/// Stops when reflection ends the path (the node is marked terminal), when a child
/// exceeds the end gate, when every proposal at a depth is rejected, or when the budget
/// is spent (one iteration per depth).
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyEngine;

impl GreedyEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SearchEngine for GreedyEngine {
    async fn search(
        &self,
        callbacks: &dyn ExpansionCallbacks,
        limits: &SearchLimits,
    ) -> Result<SearchOutcome, TaskError> {
        let mut tree = Tree::new();
        let mut current = tree.root();
        let mut finished = false;
        let start = Instant::now();
        let deadline = limits.deadline(start);

        for iteration in 0..limits.iterations() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                debug!(iteration, "time budget spent");
                break;
            }
            let (y, step_index) = {
                let node = tree.node(current);
                (node.trajectory.clone(), node.step_index + 1)
            };

            let critique = match callbacks.reflect(&y, step_index).await {
                Some(Reflection::End) => {
                    tree.node_mut(current).terminal = true;
                    finished = true;
                    break;
                }
                Some(Reflection::Critique(c)) => Some(c),
                Some(Reflection::Continue) | None => None,
            };

            let mut best: Option<NodeId> = None;
            for _ in 0..limits.branch.max(1) {
                let proposal = match &critique {
                    Some(c) => callbacks.propose_step_with_reflection(&y, step_index, c).await,
                    None => callbacks.propose_step(&y, step_index).await,
                };
                let Ok(step) = proposal else {
                    continue;
                };
                let child = tree.add_child(current, &step);
                callbacks.record_node();
                let child_y = tree.node(child).trajectory.clone();
                let value = callbacks.score(&child_y).await;
                tree.node_mut(child).value = value;
                match best {
                    Some(b) if value <= tree.node(b).value => {}
                    _ => best = Some(child),
                }
            }

            let Some(next) = best else {
                debug!(step_index, "no accepted proposal, stopping");
                break;
            };
            current = next;
            if tree.node(current).value > limits.end_gate {
                finished = true;
                break;
            }
        }

        Ok(SearchOutcome {
            chosen: current,
            finished,
            tree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Proposes `Step N: s{N}-{k}` and scores by a fixed table keyed on the last step.
    struct Scripted {
        proposals: AtomicUsize,
        nodes: AtomicUsize,
        end_at: usize,
        scored: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(end_at: usize) -> Self {
            Self {
                proposals: AtomicUsize::new(0),
                nodes: AtomicUsize::new(0),
                end_at,
                scored: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ExpansionCallbacks for Scripted {
        async fn propose_step(&self, _y: &str, step_index: usize) -> Result<String, StepRejection> {
            let k = self.proposals.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Step {}: s{}-{}\n", step_index, step_index, k))
        }

        async fn propose_step_with_reflection(
            &self,
            y: &str,
            step_index: usize,
            _reflection: &str,
        ) -> Result<String, StepRejection> {
            self.propose_step(y, step_index).await
        }

        async fn reflect(&self, _y: &str, step_index: usize) -> Option<Reflection> {
            if step_index >= self.end_at {
                Some(Reflection::End)
            } else {
                Some(Reflection::Continue)
            }
        }

        async fn score(&self, y: &str) -> f64 {
            self.scored.lock().unwrap().push(y.to_string());
            // later proposals at a depth score higher
            let k: f64 = y
                .trim_end()
                .rsplit('-')
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            (k % 3.0) / 10.0
        }

        fn record_node(&self) -> usize {
            self.nodes.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    fn limits(budget: SearchBudget) -> SearchLimits {
        SearchLimits::new(&TaskConfig::new("q"), budget)
    }

    #[tokio::test]
    async fn greedy_expands_until_reflection_ends() {
        let cb = Scripted::new(3);
        let out = GreedyEngine::new()
            .search(&cb, &limits(SearchBudget::Iterations(10)))
            .await
            .unwrap();
        assert!(out.finished);
        let chosen = out.tree.node(out.chosen);
        assert!(chosen.terminal);
        assert_eq!(chosen.step_index, 2);
        // 3 children per depth, two depths
        assert_eq!(out.tree.len(), 7);
        assert_eq!(cb.nodes.load(Ordering::SeqCst), 6);
        assert!(chosen.trajectory.starts_with("Step 1: s1-2\n"));
    }

    #[tokio::test]
    async fn greedy_respects_iteration_budget() {
        let cb = Scripted::new(100);
        let out = GreedyEngine::new()
            .search(&cb, &limits(SearchBudget::Iterations(1)))
            .await
            .unwrap();
        assert!(!out.finished);
        assert_eq!(out.tree.len(), 4);
        assert_eq!(out.tree.node(out.chosen).step_index, 1);
    }

    #[tokio::test]
    async fn replay_rescores_within_budget_and_picks_best() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.add_child(root, "Step 1: x-1\n");
        let b = tree.add_child(root, "Step 1: x-2\n");
        let _c = tree.add_child(b, "Step 2: x-0\n");
        let cb = Scripted::new(100);

        let out = ReplayEngine::new(tree.clone())
            .with_rescore(true)
            .search(&cb, &limits(SearchBudget::Iterations(2)))
            .await
            .unwrap();
        assert_eq!(cb.scored.lock().unwrap().len(), 2);
        assert_eq!(out.tree.node(a).value, 0.1);
        assert_eq!(out.chosen, b);
        assert!(!out.finished);
        assert_eq!(cb.nodes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn replay_rejects_unknown_chosen_node() {
        let cb = Scripted::new(100);
        let err = ReplayEngine::new(Tree::new())
            .with_chosen(NodeId(9))
            .search(&cb, &limits(SearchBudget::Iterations(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Engine(_)));
    }
}

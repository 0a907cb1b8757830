//! Search tree: an arena of [`Node`]s addressed by [`NodeId`].
//!
//! The engine owns the tree and builds it with [`Tree::add_child`]. A run reads it through
//! the query methods and writes only the bookkeeping fields of a node (`terminal`,
//! `on_final_route`, `min_steps_to_correct`, `he`, `summary`).

use serde::Serialize;

/// Index of a node in its [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// One search node.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Concatenated canonical steps from the root to this node.
    pub trajectory: String,
    /// Number of steps in `trajectory` (root is 0).
    pub step_index: usize,
    /// Value estimate `V`.
    pub value: f64,
    /// Engine-defined terminal node (used under the process reward model).
    pub terminal: bool,
    /// Set when leaf verification selected this node as a candidate.
    pub on_final_route: bool,
    /// Value-model bookkeeping: `Some(1)` once verified correct.
    pub min_steps_to_correct: Option<u32>,
    /// Process-reward bookkeeping: verified correct.
    pub he: bool,
    /// Final-answer summary; empty until resolved.
    pub summary: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(trajectory: String, step_index: usize, parent: Option<NodeId>) -> Self {
        Self {
            trajectory,
            step_index,
            value: 0.0,
            terminal: false,
            on_final_route: false,
            min_steps_to_correct: None,
            he: false,
            summary: String::new(),
            parent,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A `(steps, value)` training sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSample {
    pub steps: String,
    pub value: f64,
}

/// Arena of nodes; index 0 is the root with an empty trajectory.
#[derive(Debug, Clone, Serialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), 0, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// # Panics
    ///
    /// If `id` was not issued by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// # Panics
    ///
    /// If `id` was not issued by this tree.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Appends a child whose trajectory is the parent's plus `step`.
    pub fn add_child(&mut self, parent: NodeId, step: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        let (trajectory, step_index) = {
            let p = self.node(parent);
            (format!("{}{}", p.trajectory, step), p.step_index + 1)
        };
        self.nodes.push(Node::new(trajectory, step_index, Some(parent)));
        self.node_mut(parent).children.push(id);
        id
    }

    /// All ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    fn non_root(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids().skip(1)
    }

    /// Value-model leaves: non-root nodes with `V > gate`, in arena order.
    pub fn terminal_leaves_by_value(&self, gate: f64) -> Vec<NodeId> {
        self.non_root()
            .filter(|id| self.node(*id).value > gate)
            .collect()
    }

    /// Process-reward leaves: engine-flagged terminal nodes, in arena order.
    pub fn terminal_leaves_prm(&self) -> Vec<NodeId> {
        self.ids().filter(|id| self.node(*id).terminal).collect()
    }

    /// First node with maximal `V` among non-root nodes; the root if there are none.
    pub fn best_by_value(&self) -> NodeId {
        let mut best: Option<NodeId> = None;
        for id in self.non_root() {
            let v = self.node(id).value;
            match best {
                Some(b) if v <= self.node(b).value => {}
                _ => best = Some(id),
            }
        }
        best.unwrap_or_else(|| self.root())
    }

    /// Node ids from the root down to `id`, inclusive.
    pub fn trace_path(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut cur = id;
        while let Some(parent) = self.node(cur).parent {
            path.push(parent);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// `(trajectory, V)` for every non-root node on the path to `id`.
    pub fn value_samples_along_path(&self, id: NodeId) -> Vec<ValueSample> {
        self.trace_path(id)
            .into_iter()
            .filter(|n| *n != self.root())
            .map(|n| {
                let node = self.node(n);
                ValueSample {
                    steps: node.trajectory.clone(),
                    value: node.value,
                }
            })
            .collect()
    }

    /// Value-model export: correctness is `min_steps_to_correct == Some(1)`.
    pub fn full_value_samples_vm(&self, leaves: &[NodeId]) -> Vec<ValueSample> {
        self.full_value_samples(leaves, |n| n.min_steps_to_correct == Some(1))
    }

    /// Process-reward export: correctness is `he`.
    pub fn full_value_samples_prm(&self, leaves: &[NodeId]) -> Vec<ValueSample> {
        self.full_value_samples(leaves, |n| n.he)
    }

    /// For every non-root node on a path to one of `leaves`, the fraction of those leaves
    /// beneath it (itself included) that are correct. Arena order.
    fn full_value_samples<F>(&self, leaves: &[NodeId], correct: F) -> Vec<ValueSample>
    where
        F: Fn(&Node) -> bool,
    {
        let mut totals = vec![(0u32, 0u32); self.nodes.len()];
        for leaf in leaves {
            let ok = correct(self.node(*leaf));
            for n in self.trace_path(*leaf) {
                let entry = &mut totals[n.0];
                entry.0 += 1;
                if ok {
                    entry.1 += 1;
                }
            }
        }
        self.non_root()
            .filter(|id| totals[id.0].0 > 0)
            .map(|id| {
                let (seen, good) = totals[id.0];
                ValueSample {
                    steps: self.node(id).trajectory.clone(),
                    value: f64::from(good) / f64::from(seen),
                }
            })
            .collect()
    }
}

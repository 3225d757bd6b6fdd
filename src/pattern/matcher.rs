//! Structural pattern matcher
//!
//! Matches a [`Pattern`] rooted at one pattern node against a concrete
//! candidate node. The solver keeps a stack of `(pattern node, concrete node)`
//! goals and backtracks over every choice point (Skip absorption depth and the
//! argument order of commutative operations), rolling the binding back to the
//! state before the choice.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId};

use super::builder::{LabelId, Pattern, PatternId};
use super::label::PatternNode;

/// Labels bound by one match, in binding order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternMap {
    bindings: IndexMap<LabelId, NodeId>,
}

impl PatternMap {
    /// Node bound to a label
    pub fn get(&self, label: LabelId) -> Option<NodeId> {
        self.bindings.get(&label).copied()
    }

    /// Node bound to a label, or [`GraphError::UnboundLabel`]
    pub fn require(&self, label: LabelId) -> GraphResult<NodeId> {
        self.get(label).ok_or(GraphError::UnboundLabel(label))
    }

    /// Check if a label is bound
    pub fn contains(&self, label: LabelId) -> bool {
        self.bindings.contains_key(&label)
    }

    /// Number of bound labels
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in binding order
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, NodeId)> + '_ {
        self.bindings.iter().map(|(&l, &n)| (l, n))
    }

    fn bind(&mut self, label: LabelId, node: NodeId) {
        self.bindings.insert(label, node);
    }

    fn truncate(&mut self, len: usize) {
        self.bindings.truncate(len);
    }
}

/// Successful match
#[derive(Debug, Clone)]
pub struct PatternMatch {
    root: NodeId,
    bindings: PatternMap,
}

impl PatternMatch {
    /// Concrete node the pattern root matched
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Label bindings
    pub fn bindings(&self) -> &PatternMap {
        &self.bindings
    }

    /// Node bound to a label
    pub fn get(&self, label: LabelId) -> Option<NodeId> {
        self.bindings.get(label)
    }

    /// Node bound to a label, or [`GraphError::UnboundLabel`]
    pub fn require(&self, label: LabelId) -> GraphResult<NodeId> {
        self.bindings.require(label)
    }

    /// Consume into the binding
    pub fn into_bindings(self) -> PatternMap {
        self.bindings
    }
}

/// Pattern plus root, ready to match
///
/// The pattern is shared, so rule objects can hand out cheap clones.
#[derive(Debug, Clone)]
pub struct Matcher {
    pattern: Arc<Pattern>,
    root: PatternId,
}

impl Matcher {
    /// Create a matcher for `pattern` rooted at `root`
    pub fn new(pattern: Pattern, root: PatternId) -> GraphResult<Self> {
        pattern.validate(root)?;
        Ok(Self {
            pattern: Arc::new(pattern),
            root,
        })
    }

    /// The pattern
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The pattern root
    pub fn root(&self) -> PatternId {
        self.root
    }

    /// Try to match the pattern with its root at `candidate`
    pub fn match_node(&self, graph: &Graph, candidate: NodeId) -> Option<PatternMatch> {
        let mut state = MatchState {
            graph,
            pattern: &self.pattern,
            bindings: PatternMap::default(),
        };
        if state.solve(vec![(self.root, candidate)]) {
            trace!(
                root = %graph.node_name(candidate),
                labels = state.bindings.len(),
                "pattern matched"
            );
            Some(PatternMatch {
                root: candidate,
                bindings: state.bindings,
            })
        } else {
            None
        }
    }
}

type Goal = (PatternId, NodeId);

struct MatchState<'a> {
    graph: &'a Graph,
    pattern: &'a Pattern,
    bindings: PatternMap,
}

impl<'a> MatchState<'a> {
    /// Solve every goal; on failure the binding is left as it was on entry
    fn solve(&mut self, mut goals: Vec<Goal>) -> bool {
        let Some((pat, id)) = goals.pop() else {
            return true;
        };
        let graph = self.graph;
        let pattern = self.pattern;
        let Some(node) = graph.node(id) else {
            return false;
        };
        if node.is_released() {
            return false;
        }

        match pattern.get(pat) {
            None => false,
            Some(PatternNode::Label(label)) => {
                if !label.accepts(node) {
                    return false;
                }
                if let Some(bound) = self.bindings.get(pat) {
                    return bound == id && self.solve(goals);
                }
                let mark = self.bindings.len();
                self.bindings.bind(pat, id);
                if let Some(wrapped) = label.wrapped {
                    goals.push((wrapped, id));
                }
                if self.solve(goals) {
                    return true;
                }
                self.bindings.truncate(mark);
                false
            }
            Some(PatternNode::Skip(skip)) => {
                let mut current = id;
                loop {
                    let mut branch = goals.clone();
                    branch.push((skip.sub, current));
                    if self.solve(branch) {
                        return true;
                    }
                    match graph.node(current) {
                        Some(n) if skip.absorbs(n) => current = n.args()[0],
                        _ => return false,
                    }
                }
            }
            Some(PatternNode::Op(op)) => {
                if !op.accepts(node) {
                    return false;
                }
                let args = node.args();
                let mut branch = goals.clone();
                push_args(&mut branch, op.args(), args.iter().copied());
                if self.solve(branch) {
                    return true;
                }
                if op.kind().is_commutative() && args.len() == 2 && args[0] != args[1] {
                    push_args(&mut goals, op.args(), args.iter().rev().copied());
                    return self.solve(goals);
                }
                false
            }
        }
    }
}

/// Push argument goals so the first argument is solved first
fn push_args(goals: &mut Vec<Goal>, pats: &[PatternId], nodes: impl Iterator<Item = NodeId>) {
    let pairs: Vec<Goal> = pats.iter().copied().zip(nodes).collect();
    goals.extend(pairs.into_iter().rev());
}

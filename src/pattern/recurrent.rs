//! Recurrent matcher
//!
//! Matches a chain of structurally identical sub-graphs linked through a
//! recurrence label: after each successful match, the node bound to that label
//! becomes the root of the next attempt. Bindings accumulate per label in
//! repetition order, so repetition 0 is the match at the given root.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId, NodeSet};

use super::builder::{LabelId, Pattern, PatternId};
use super::matcher::Matcher;

/// Result of a recurrent match
#[derive(Debug, Clone)]
pub struct RecurrentMatch {
    root: NodeId,
    count: usize,
    sequences: IndexMap<LabelId, Vec<NodeId>>,
}

impl RecurrentMatch {
    /// Concrete node the first repetition matched at
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of successful repetitions
    pub fn count(&self) -> usize {
        self.count
    }

    /// Nodes a label bound, one per repetition in which it was bound
    pub fn bound_nodes(&self, label: LabelId) -> &[NodeId] {
        self.sequences
            .get(&label)
            .map(|s| s.as_slice())
            .unwrap_or(&[])
    }

    /// Like [`RecurrentMatch::bound_nodes`], failing if the label never bound
    pub fn require_sequence(&self, label: LabelId) -> GraphResult<&[NodeId]> {
        match self.bound_nodes(label) {
            [] => Err(GraphError::UnboundLabel(label)),
            seq => Ok(seq),
        }
    }

    /// Node a correlated label bound (identical in every repetition)
    pub fn shared(&self, label: LabelId) -> GraphResult<NodeId> {
        self.require_sequence(label).map(|seq| seq[0])
    }

    /// Every label with its sequence, in first-binding order
    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &[NodeId])> + '_ {
        self.sequences.iter().map(|(&l, s)| (l, s.as_slice()))
    }
}

/// Matcher for unrolled recurrences
#[derive(Debug, Clone)]
pub struct RecurrentMatcher {
    matcher: Matcher,
    recurrence: LabelId,
    correlated: Vec<LabelId>,
}

impl RecurrentMatcher {
    /// Create a recurrent matcher
    ///
    /// `recurrence` must be a label of `pattern`; the node it binds is the
    /// root of the next repetition. Every label in `correlated` must bind the
    /// identical node in every repetition, or the whole match fails.
    pub fn new(
        pattern: Pattern,
        root: PatternId,
        recurrence: LabelId,
        correlated: impl IntoIterator<Item = LabelId>,
    ) -> GraphResult<Self> {
        let correlated: Vec<LabelId> = correlated.into_iter().collect();
        if let Some(bad) = std::iter::once(recurrence)
            .chain(correlated.iter().copied())
            .find(|&l| !pattern.is_label(l))
        {
            return Err(GraphError::InvalidPattern(format!("{} is not a label", bad)));
        }
        Ok(Self {
            matcher: Matcher::new(pattern, root)?,
            recurrence,
            correlated,
        })
    }

    /// Single-repetition matcher
    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Label linking one repetition to the next
    pub fn recurrence_label(&self) -> LabelId {
        self.recurrence
    }

    /// Labels that must bind the same node in every repetition
    pub fn correlated_labels(&self) -> &[LabelId] {
        &self.correlated
    }

    /// Match as many repetitions as possible starting at `candidate`
    ///
    /// Returns `None` if the first repetition fails or a correlated label
    /// disagrees between repetitions.
    pub fn match_node(&self, graph: &Graph, candidate: NodeId) -> Option<RecurrentMatch> {
        let mut sequences: IndexMap<LabelId, Vec<NodeId>> = IndexMap::new();
        let mut visited = NodeSet::default();
        let mut current = candidate;
        let mut count = 0;

        while visited.insert(current) {
            let Some(m) = self.matcher.match_node(graph, current) else {
                break;
            };

            for &label in &self.correlated {
                let previous = sequences.get(&label).and_then(|s| s.first().copied());
                if let (Some(bound), Some(previous)) = (m.get(label), previous) {
                    if bound != previous {
                        debug!(
                            root = %graph.node_name(candidate),
                            repetition = count,
                            label = %label,
                            "correlated label diverged"
                        );
                        return None;
                    }
                }
            }

            for (label, node) in m.bindings().iter() {
                sequences.entry(label).or_default().push(node);
            }
            count += 1;
            trace!(repetition = count, at = %graph.node_name(current), "repetition matched");

            match m.get(self.recurrence) {
                Some(next) => current = next,
                None => break,
            }
        }

        if count == 0 {
            return None;
        }
        debug!(root = %graph.node_name(candidate), count, "recurrent pattern matched");
        Some(RecurrentMatch {
            root: candidate,
            count,
            sequences,
        })
    }
}

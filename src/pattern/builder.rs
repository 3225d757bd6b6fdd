//! Pattern construction
//!
//! A [`Pattern`] is an arena of pattern nodes addressed by [`PatternId`].
//! Nodes may only refer to nodes created before them, so every pattern is a
//! DAG. The same id used twice is the same Label: both occurrences must bind
//! the same concrete node.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{GraphError, GraphResult};
use crate::graph::Node;
use crate::op::{Op, OpKind};

use super::label::{Label, LabelType, OpPattern, PatternNode, Skip};

/// Identity of a node within one [`Pattern`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternId(u32);

/// Labels are pattern nodes; their ids double as binding keys
pub type LabelId = PatternId;

impl PatternId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Pattern arena and builder
///
/// # Example
///
/// ```
/// use fusion_ir::op::OpKind;
/// use fusion_ir::pattern::{LabelType, Pattern};
/// use fusion_ir::tensor::ElementType;
///
/// // Divide(Broadcast(c), Add(Exp(Negative(x)), Broadcast(c)))
/// let mut p = Pattern::new();
/// let x = p.label(LabelType::Element(ElementType::F32));
/// let c = p.label(LabelType::Element(ElementType::F32));
/// let bc = p.op(OpKind::Broadcast, &[c]);
/// let neg = p.op(OpKind::Negative, &[x]);
/// let exp = p.op(OpKind::Exp, &[neg]);
/// let add = p.op(OpKind::Add, &[exp, bc]);
/// let root = p.op(OpKind::Divide, &[bc, add]);
/// assert_eq!(p.labels().count(), 2);
/// assert!(p.validate(root).is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    nodes: Vec<PatternNode>,
}

impl Pattern {
    /// Create an empty pattern
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: PatternNode) -> PatternId {
        let id = PatternId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    // ========================================================================
    // Labels
    // ========================================================================

    /// Label constrained by type only
    pub fn label(&mut self, constraint: LabelType) -> LabelId {
        self.push(PatternNode::Label(Label {
            constraint,
            predicate: None,
            wrapped: None,
        }))
    }

    /// Label matching any node
    pub fn any(&mut self) -> LabelId {
        self.label(LabelType::Any)
    }

    /// Label constrained by type and a node predicate
    pub fn label_where<F>(&mut self, constraint: LabelType, predicate: F) -> LabelId
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.push(PatternNode::Label(Label {
            constraint,
            predicate: Some(Arc::new(predicate)),
            wrapped: None,
        }))
    }

    /// Label that binds whatever node `sub` matches
    ///
    /// This names an inner or root node of a pattern so a rewrite can reach it.
    pub fn capture(&mut self, sub: PatternId) -> LabelId {
        self.push(PatternNode::Label(Label {
            constraint: LabelType::Any,
            predicate: None,
            wrapped: Some(sub),
        }))
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Match `sub`, absorbing single-argument nodes that satisfy `predicate`
    pub fn skip<F>(&mut self, sub: PatternId, predicate: F) -> PatternId
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.push(PatternNode::Skip(Skip {
            predicate: Arc::new(predicate),
            sub,
        }))
    }

    /// Node of operation `kind` whose arguments match `args` in order
    pub fn op(&mut self, kind: OpKind, args: &[PatternId]) -> PatternId {
        self.push(PatternNode::Op(OpPattern {
            kind,
            args: SmallVec::from_slice(args),
            attrs: None,
        }))
    }

    /// Like [`Pattern::op`], additionally checking the operation's attributes
    pub fn op_where<F>(&mut self, kind: OpKind, args: &[PatternId], attrs: F) -> PatternId
    where
        F: Fn(&Op) -> bool + Send + Sync + 'static,
    {
        self.push(PatternNode::Op(OpPattern {
            kind,
            args: SmallVec::from_slice(args),
            attrs: Some(Arc::new(attrs)),
        }))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a pattern node
    pub fn get(&self, id: PatternId) -> Option<&PatternNode> {
        self.nodes.get(id.index())
    }

    /// Number of pattern nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if a pattern node is a Label (plain or capture)
    pub fn is_label(&self, id: PatternId) -> bool {
        matches!(self.get(id), Some(PatternNode::Label(_)))
    }

    /// All Label ids in creation order
    pub fn labels(&self) -> impl Iterator<Item = LabelId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, PatternNode::Label(_)))
            .map(|(i, _)| PatternId(i as u32))
    }

    /// Check that `root` exists and every reference points at an earlier node
    pub fn validate(&self, root: PatternId) -> GraphResult<()> {
        if self.get(root).is_none() {
            return Err(GraphError::InvalidPattern(format!(
                "root {} is not part of a {}-node pattern",
                root,
                self.len()
            )));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            let refs: SmallVec<[PatternId; 4]> = match node {
                PatternNode::Label(label) => label.wrapped.into_iter().collect(),
                PatternNode::Skip(skip) => SmallVec::from_elem(skip.sub, 1),
                PatternNode::Op(op) => op.args.clone(),
            };
            if let Some(bad) = refs.iter().find(|r| r.index() >= index) {
                return Err(GraphError::InvalidPattern(format!(
                    "p{} refers to {} which is not an earlier node",
                    index, bad
                )));
            }
        }
        Ok(())
    }
}

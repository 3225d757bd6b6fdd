//! Pattern nodes
//!
//! The three kinds of node a pattern is built from: Labels (bindable
//! wildcards), Skips (optionally absorbed nodes) and concrete-shaped op nodes.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::graph::Node;
use crate::op::{Op, OpKind};
use crate::tensor::{ElementType, ValueType};

use super::builder::PatternId;

/// Predicate over a concrete node
pub type NodePredicate = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// Predicate over an operation's tag and attributes
pub type OpPredicate = Arc<dyn Fn(&Op) -> bool + Send + Sync>;

/// Type constraint of a Label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelType {
    /// Any node, including multi-output nodes
    Any,
    /// Single-output node of this element type, any shape
    Element(ElementType),
    /// Single-output node of a compatible value type
    Exact(ValueType),
}

impl LabelType {
    /// Check if a concrete node satisfies this constraint
    pub fn accepts(&self, node: &Node) -> bool {
        match self {
            LabelType::Any => true,
            LabelType::Element(et) => node.element_type() == Some(*et),
            LabelType::Exact(vt) => node.output_type().map(|t| t.is_compatible(vt)).unwrap_or(false),
        }
    }
}

/// Bindable wildcard
#[derive(Clone)]
pub struct Label {
    pub(crate) constraint: LabelType,
    pub(crate) predicate: Option<NodePredicate>,
    pub(crate) wrapped: Option<PatternId>,
}

impl Label {
    /// Type constraint
    pub fn constraint(&self) -> &LabelType {
        &self.constraint
    }

    /// Sub-pattern the bound node must also match, for captures
    pub fn wrapped(&self) -> Option<PatternId> {
        self.wrapped
    }

    /// Check the type constraint and predicate against a concrete node
    pub fn accepts(&self, node: &Node) -> bool {
        self.constraint.accepts(node) && self.predicate.as_ref().map(|p| p(node)).unwrap_or(true)
    }
}

/// Optionally absorbed single-argument node
#[derive(Clone)]
pub struct Skip {
    pub(crate) predicate: NodePredicate,
    pub(crate) sub: PatternId,
}

impl Skip {
    /// Sub-pattern matched after any absorption
    pub fn sub(&self) -> PatternId {
        self.sub
    }

    /// Check if a concrete node may be absorbed
    pub fn absorbs(&self, node: &Node) -> bool {
        node.args().len() == 1 && (self.predicate)(node)
    }
}

/// Concrete-shaped node: operation tag, ordered argument patterns, attribute check
#[derive(Clone)]
pub struct OpPattern {
    pub(crate) kind: OpKind,
    pub(crate) args: SmallVec<[PatternId; 4]>,
    pub(crate) attrs: Option<OpPredicate>,
}

impl OpPattern {
    /// Operation tag
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Argument sub-patterns
    pub fn args(&self) -> &[PatternId] {
        &self.args
    }

    /// Check tag, arity and attributes against a concrete node
    pub fn accepts(&self, node: &Node) -> bool {
        node.kind() == self.kind
            && node.args().len() == self.args.len()
            && self.attrs.as_ref().map(|p| p(node.op())).unwrap_or(true)
    }
}

/// One node of a pattern
#[derive(Clone)]
pub enum PatternNode {
    /// Bindable wildcard (or capture, when it wraps a sub-pattern)
    Label(Label),
    /// Optionally absorbed node
    Skip(Skip),
    /// Concrete-shaped node
    Op(OpPattern),
}

impl fmt::Debug for PatternNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternNode::Label(label) => f
                .debug_struct("Label")
                .field("constraint", &label.constraint)
                .field("predicate", &label.predicate.is_some())
                .field("wrapped", &label.wrapped)
                .finish(),
            PatternNode::Skip(skip) => f.debug_struct("Skip").field("sub", &skip.sub).finish(),
            PatternNode::Op(op) => f
                .debug_struct("Op")
                .field("kind", &op.kind)
                .field("args", &op.args)
                .field("attrs", &op.attrs.is_some())
                .finish(),
        }
    }
}

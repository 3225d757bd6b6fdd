//! Error types for fusion-ir
//!
//! This module defines all error types used throughout the crate.
//! Structural mismatches and callback rejections are not errors; they are
//! reported as `None` / `Ok(false)`. Everything here is a contract violation
//! that aborts the current pass.

use thiserror::Error;

use crate::graph::NodeId;
use crate::op::OpKind;
use crate::pattern::PatternId;

/// Main error type for graph construction and rewriting
#[derive(Error, Debug)]
pub enum GraphError {
    /// Operation received the wrong number of arguments
    #[error("{op}: expected {expected} arguments, got {actual}")]
    ArityMismatch {
        /// Operation being constructed
        op: OpKind,
        /// Human-readable arity contract (e.g. "2", "at least 1")
        expected: String,
        /// Number of arguments supplied
        actual: usize,
    },

    /// Argument types violate the operation's type contract
    #[error("{op}: {reason}")]
    TypeMismatch {
        /// Operation being typed
        op: OpKind,
        /// Violated invariant
        reason: String,
    },

    /// Reduction or concatenation axis is outside the argument rank
    #[error("{op}: axis {axis} out of range for rank {rank}")]
    AxisOutOfRange {
        /// Operation being typed
        op: OpKind,
        /// Offending axis
        axis: usize,
        /// Rank of the argument
        rank: usize,
    },

    /// Argument has no single resolved value type
    #[error("{op}: argument {index} has no single resolved value type")]
    UnresolvedType {
        /// Operation being typed
        op: OpKind,
        /// Argument slot
        index: usize,
    },

    /// Node id does not exist in the graph
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Node was released and cannot take part in this operation
    #[error("Node {0} has been released")]
    ReleasedNode(NodeId),

    /// Argument slot index is out of range
    #[error("Node {node} has no argument slot {slot}")]
    SlotOutOfRange {
        /// Node being edited
        node: NodeId,
        /// Requested slot
        slot: usize,
    },

    /// Edge mutation would introduce a cycle
    #[error("Rewiring {old} to {new} would create a cycle")]
    WouldCreateCycle {
        /// Node losing its users
        old: NodeId,
        /// Node gaining them
        new: NodeId,
    },

    /// Designated graph outputs cannot be replaced
    #[error("Cannot replace designated output {0}")]
    ReplaceOutput(NodeId),

    /// Replacement does not provide the outputs the users consume
    #[error("Cannot replace {old} with {new}: {reason}")]
    IncompatibleReplacement {
        /// Node being replaced
        old: NodeId,
        /// Replacement node
        new: NodeId,
        /// What does not line up
        reason: String,
    },

    /// Pattern is malformed
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// Callback asked for a label the match did not bind
    #[error("Label {0} is not bound in this match")]
    UnboundLabel(PatternId),

    /// Fusion callback found the match internally inconsistent
    #[error("{rule}: {reason}")]
    FusionInvariant {
        /// Rule that detected the violation
        rule: &'static str,
        /// Violated invariant
        reason: String,
    },

    /// A rewrite callback failed; the pass is aborted
    #[error("Rule '{rule}' failed at {node}: {source}")]
    RuleFailed {
        /// Registered rule name
        rule: String,
        /// Name of the candidate root node
        node: String,
        /// Underlying error
        #[source]
        source: Box<GraphError>,
    },

    /// Graph failed validation
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// Reference evaluation failed
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Reference evaluator has no kernel for this case
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type alias for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

impl GraphError {
    /// Shorthand for a [`GraphError::TypeMismatch`]
    pub fn type_mismatch(op: OpKind, reason: impl Into<String>) -> Self {
        GraphError::TypeMismatch {
            op,
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`GraphError::FusionInvariant`]
    pub fn fusion(rule: &'static str, reason: impl Into<String>) -> Self {
        GraphError::FusionInvariant {
            rule,
            reason: reason.into(),
        }
    }
}

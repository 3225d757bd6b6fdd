//! Graph nodes
//!
//! A node is one operation instance in the arena: its op, ordered argument
//! edges and the output types computed when it was created.

use std::fmt;

use smallvec::SmallVec;

use crate::op::{Op, OpKind, OutputTypes};
use crate::tensor::{ElementType, Shape, ValueType};

/// Stable identity of a node: its index in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Arena index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Argument list of a node (one entry per input slot)
pub type ArgList = SmallVec<[NodeId; 4]>;

/// One operation instance
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) op: Op,
    pub(crate) args: ArgList,
    pub(crate) output_types: OutputTypes,
    pub(crate) released: bool,
}

impl Node {
    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Generated name (`Add_12`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operation and attributes
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Operation tag
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Ordered argument edges
    pub fn args(&self) -> &[NodeId] {
        &self.args
    }

    /// Argument in `slot`
    pub fn arg(&self, slot: usize) -> Option<NodeId> {
        self.args.get(slot).copied()
    }

    /// All output value types
    pub fn output_types(&self) -> &[ValueType] {
        &self.output_types
    }

    /// Number of outputs
    pub fn output_count(&self) -> usize {
        self.output_types.len()
    }

    /// The output type, if the node has exactly one output
    pub fn output_type(&self) -> Option<&ValueType> {
        match self.output_types.as_slice() {
            [t] => Some(t),
            _ => None,
        }
    }

    /// Element type of the single output
    pub fn element_type(&self) -> Option<ElementType> {
        self.output_type().map(|t| t.element_type())
    }

    /// Shape of the single output
    pub fn shape(&self) -> Option<&Shape> {
        self.output_type().map(|t| t.shape())
    }

    /// Check if the node has been released
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Check if this is a designated output
    pub fn is_result(&self) -> bool {
        self.kind() == OpKind::Result
    }

    /// Check if this is a graph input
    pub fn is_parameter(&self) -> bool {
        self.kind() == OpKind::Parameter
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

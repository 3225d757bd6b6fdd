//! Graph queries
//!
//! Read-only questions about edges, types, reachability and ordering.

use smallvec::SmallVec;

use crate::error::GraphResult;
use crate::op::OpKind;
use crate::tensor::ValueType;

use super::context::Graph;
use super::maps::distinct;
use super::node::NodeId;
use super::traversal::{ancestors, post_order, BfsIterator, Direction};

impl Graph {
    // ========================================================================
    // Edges
    // ========================================================================

    /// Distinct users of a node, in first-edge order
    pub fn users(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        distinct(self.user_edges(id))
    }

    /// Users with one entry per argument edge
    pub fn user_edges(&self, id: NodeId) -> &[NodeId] {
        self.users
            .get(id.index())
            .map(|u| u.as_slice())
            .unwrap_or(&[])
    }

    /// Number of argument edges pointing at a node
    pub fn use_count(&self, id: NodeId) -> usize {
        self.user_edges(id).len()
    }

    /// Check if exactly one node uses this node
    pub fn is_single_use(&self, id: NodeId) -> bool {
        self.users(id).len() == 1
    }

    /// Argument ids of a node
    pub fn args(&self, id: NodeId) -> GraphResult<&[NodeId]> {
        Ok(self.try_node(id)?.args())
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Output value types of a node
    pub fn output_types(&self, id: NodeId) -> GraphResult<&[ValueType]> {
        Ok(self.try_node(id)?.output_types())
    }

    /// Single output value type of a node, if it has exactly one
    pub fn output_type(&self, id: NodeId) -> Option<&ValueType> {
        self.node(id).and_then(|n| n.output_type())
    }

    // ========================================================================
    // Reachability
    // ========================================================================

    /// Parameters and results are never released
    pub fn is_pinned(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| n.is_parameter() || n.is_result())
            .unwrap_or(false)
    }

    /// Check if `node` transitively argues `ancestor` (or is it)
    pub fn depends_on(&self, node: NodeId, ancestor: NodeId) -> bool {
        BfsIterator::backward(self, node).any(|id| id == ancestor)
    }

    /// Check if `node` transitively argues any of `candidates`
    pub fn depends_on_any(&self, node: NodeId, candidates: &[NodeId]) -> bool {
        let reached = ancestors(self, node);
        candidates.iter().any(|c| reached.contains(c))
    }

    /// Check if a designated output consumes this node, directly or not
    pub fn is_connected_to_output(&self, id: NodeId) -> bool {
        BfsIterator::forward(self, id).any(|n| self.node(n).map(|n| n.is_result()).unwrap_or(false))
    }

    /// Released, or no longer contributing to any designated output
    pub fn is_dead(&self, id: NodeId) -> bool {
        !self.is_live(id) || !self.is_connected_to_output(id)
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Live nodes with every node after its arguments
    pub fn topological_order(&self) -> Vec<NodeId> {
        let starts: Vec<NodeId> = self.node_ids().collect();
        post_order(self, &starts, Direction::Backward)
    }

    /// Live nodes with every node before its arguments (consumers first)
    pub fn reverse_topological_order(&self) -> Vec<NodeId> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    /// Find live nodes by operation kind
    pub fn find_nodes_by_kind(&self, kind: OpKind) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.kind() == kind)
            .map(|n| n.id())
            .collect()
    }

    /// Count live nodes of an operation kind
    pub fn count_kind(&self, kind: OpKind) -> usize {
        self.nodes().filter(|n| n.kind() == kind).count()
    }
}

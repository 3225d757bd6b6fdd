//! Graph arena
//!
//! `Graph` is the central structure of the IR. It owns every node in an
//! append-only arena addressed by [`NodeId`], the forward argument edges, and
//! the derived user index that mirrors them.

use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::op::infer_output_types;
use crate::tensor::ValueType;

use super::maps::{build_user_map, same_users, UserMap};
use super::node::{Node, NodeId};

/// Computation graph
///
/// Nodes are never removed from the arena. A node whose last user goes away
/// is *released*: it stops contributing edges but keeps its data so ids held
/// by a rewrite callback stay inspectable.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,

    /// Arena index → users (one entry per argument edge)
    pub(crate) users: UserMap,

    /// Graph inputs in creation order
    pub(crate) parameters: Vec<NodeId>,

    /// Designated outputs in creation order
    pub(crate) results: Vec<NodeId>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id (live or released)
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a node by id, failing if it does not exist
    pub fn try_node(&self, id: NodeId) -> GraphResult<&Node> {
        self.node(id).ok_or(GraphError::UnknownNode(id))
    }

    /// Get a node by id, failing if it does not exist or was released
    pub fn live_node(&self, id: NodeId) -> GraphResult<&Node> {
        let node = self.try_node(id)?;
        if node.released {
            return Err(GraphError::ReleasedNode(id));
        }
        Ok(node)
    }

    /// Check if a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Check if a node exists and is live
    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).map(|n| !n.released).unwrap_or(false)
    }

    /// Check if a node was released
    pub fn is_released(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.released).unwrap_or(false)
    }

    /// Number of nodes ever created
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes
    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| !n.released).count()
    }

    /// Iterate over live nodes in creation order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.released)
    }

    /// Iterate over live node ids in creation order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes().map(|n| n.id)
    }

    /// Graph inputs
    pub fn parameters(&self) -> &[NodeId] {
        &self.parameters
    }

    /// Designated outputs
    pub fn results(&self) -> &[NodeId] {
        &self.results
    }

    /// Node name for diagnostics, falling back to the raw id
    pub fn node_name(&self, id: NodeId) -> String {
        self.node(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check every structural invariant of the graph
    ///
    /// - arguments of live nodes exist and are live
    /// - the user index is exactly the inverse of the live argument edges
    /// - the argument graph is acyclic
    /// - stored output types equal freshly propagated ones
    /// - designated inputs/outputs have the right operations
    pub fn validate(&self) -> GraphResult<()> {
        for node in self.nodes() {
            for &arg in &node.args {
                match self.node(arg) {
                    None => {
                        return Err(GraphError::InvalidGraph(format!(
                            "{} argues unknown node {}",
                            node, arg
                        )))
                    }
                    Some(a) if a.released => {
                        return Err(GraphError::InvalidGraph(format!(
                            "{} argues released node {}",
                            node, a
                        )))
                    }
                    Some(_) => {}
                }
            }
        }

        let expected = build_user_map(&self.nodes);
        for (index, users) in expected.iter().enumerate() {
            let actual = self.users.get(index).map(|u| u.as_slice()).unwrap_or(&[]);
            if !same_users(users, actual) {
                return Err(GraphError::InvalidGraph(format!(
                    "user index of {} is {:?}, expected {:?}",
                    self.nodes[index], actual, users
                )));
            }
        }

        let order = self.topological_order();
        let mut position = vec![usize::MAX; self.nodes.len()];
        for (pos, id) in order.iter().enumerate() {
            position[id.index()] = pos;
        }
        for node in self.nodes() {
            for &arg in &node.args {
                if position[arg.index()] >= position[node.id.index()] {
                    return Err(GraphError::InvalidGraph(format!(
                        "cycle through {} and {}",
                        node,
                        self.node_name(arg)
                    )));
                }
            }
        }

        for node in self.nodes() {
            let arg_types: Vec<&[ValueType]> = node
                .args
                .iter()
                .map(|a| self.nodes[a.index()].output_types.as_slice())
                .collect();
            let types = infer_output_types(&node.op, &arg_types)?;
            if types != node.output_types {
                return Err(GraphError::InvalidGraph(format!(
                    "{} has stale output types",
                    node
                )));
            }
        }

        if let Some(id) = self
            .results
            .iter()
            .find(|&&id| self.node(id).map(|n| !n.is_result()).unwrap_or(true))
        {
            return Err(GraphError::InvalidGraph(format!(
                "designated output {} is not a Result",
                id
            )));
        }
        if let Some(id) = self
            .parameters
            .iter()
            .find(|&&id| self.node(id).map(|n| !n.is_parameter()).unwrap_or(true))
        {
            return Err(GraphError::InvalidGraph(format!(
                "graph input {} is not a Parameter",
                id
            )));
        }

        trace!(nodes = self.live_node_count(), "graph validated");
        Ok(())
    }
}

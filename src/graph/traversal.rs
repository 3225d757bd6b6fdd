//! Graph traversal utilities
//!
//! Provides BFS and DFS traversal over live nodes, plus the orderings the
//! rewrite driver and type propagation rely on.

use std::collections::VecDeque;

use super::context::Graph;
use super::maps::NodeSet;
use super::node::NodeId;

/// Direction of traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward: follow user edges (producer → consumer)
    Forward,
    /// Backward: follow argument edges (consumer → producer)
    Backward,
}

fn neighbors(graph: &Graph, id: NodeId, direction: Direction) -> &[NodeId] {
    match direction {
        Direction::Forward => graph
            .users
            .get(id.index())
            .map(|u| u.as_slice())
            .unwrap_or(&[]),
        Direction::Backward => graph.node(id).map(|n| n.args()).unwrap_or(&[]),
    }
}

/// BFS traversal iterator
pub struct BfsIterator<'a> {
    graph: &'a Graph,
    queue: VecDeque<NodeId>,
    visited: NodeSet,
    direction: Direction,
}

impl<'a> BfsIterator<'a> {
    /// Create a new BFS iterator starting from the given node
    pub fn new(graph: &'a Graph, start: NodeId, direction: Direction) -> Self {
        let mut queue = VecDeque::new();
        let mut visited = NodeSet::default();

        if graph.is_live(start) {
            queue.push_back(start);
            visited.insert(start);
        }

        Self {
            graph,
            queue,
            visited,
            direction,
        }
    }

    /// Create forward BFS (follows users)
    pub fn forward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Forward)
    }

    /// Create backward BFS (follows arguments)
    pub fn backward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Backward)
    }
}

impl<'a> Iterator for BfsIterator<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;

        for &next in neighbors(self.graph, id, self.direction) {
            if self.visited.insert(next) {
                self.queue.push_back(next);
            }
        }

        Some(id)
    }
}

/// DFS traversal iterator (pre-order)
pub struct DfsIterator<'a> {
    graph: &'a Graph,
    stack: Vec<NodeId>,
    visited: NodeSet,
    direction: Direction,
}

impl<'a> DfsIterator<'a> {
    /// Create a new DFS iterator starting from the given node
    pub fn new(graph: &'a Graph, start: NodeId, direction: Direction) -> Self {
        let mut stack = Vec::new();
        let mut visited = NodeSet::default();

        if graph.is_live(start) {
            stack.push(start);
            visited.insert(start);
        }

        Self {
            graph,
            stack,
            visited,
            direction,
        }
    }

    /// Create forward DFS (follows users)
    pub fn forward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Forward)
    }

    /// Create backward DFS (follows arguments)
    pub fn backward(graph: &'a Graph, start: NodeId) -> Self {
        Self::new(graph, start, Direction::Backward)
    }
}

impl<'a> Iterator for DfsIterator<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;

        for &next in neighbors(self.graph, id, self.direction).iter().rev() {
            if self.visited.insert(next) {
                self.stack.push(next);
            }
        }

        Some(id)
    }
}

/// Post-order over everything reachable from `starts` in `direction`
///
/// With `Direction::Backward` this is a topological order (arguments before
/// users); reversing a forward post-order gives a topological order of the
/// reached descendants.
pub fn post_order(graph: &Graph, starts: &[NodeId], direction: Direction) -> Vec<NodeId> {
    let mut visited = vec![false; graph.node_count()];
    let mut order = Vec::new();

    for &start in starts {
        if !graph.is_live(start) || visited[start.index()] {
            continue;
        }
        visited[start.index()] = true;
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];

        while let Some(top) = stack.last_mut() {
            let id = top.0;
            let next = neighbors(graph, id, direction);
            if top.1 < next.len() {
                let child = next[top.1];
                top.1 += 1;
                if !visited[child.index()] {
                    visited[child.index()] = true;
                    stack.push((child, 0));
                }
            } else {
                order.push(id);
                stack.pop();
            }
        }
    }

    order
}

/// Descendants of `starts` (inclusive) in topological order
pub fn descendants_topological(graph: &Graph, starts: &[NodeId]) -> Vec<NodeId> {
    let mut order = post_order(graph, starts, Direction::Forward);
    order.reverse();
    order
}

/// Get direct argument ids of a node (deduplicated)
pub fn predecessors(graph: &Graph, id: NodeId) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    for &arg in neighbors(graph, id, Direction::Backward) {
        if !out.contains(&arg) {
            out.push(arg);
        }
    }
    out
}

/// Get direct user ids of a node (deduplicated)
pub fn successors(graph: &Graph, id: NodeId) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::new();
    for &user in neighbors(graph, id, Direction::Forward) {
        if !out.contains(&user) {
            out.push(user);
        }
    }
    out
}

/// Check if there's a path from `from` to `to` along user edges
pub fn has_path(graph: &Graph, from: NodeId, to: NodeId) -> bool {
    BfsIterator::forward(graph, from).any(|id| id == to)
}

/// Ancestors of a node (inclusive)
pub fn ancestors(graph: &Graph, id: NodeId) -> NodeSet {
    BfsIterator::backward(graph, id).collect()
}

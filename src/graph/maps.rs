//! Graph map types and builders
//!
//! Defines the derived indices kept next to the node arena.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::op::OutputTypes;

use super::node::{Node, NodeId};

/// Users of one node: one entry per argument edge pointing at it
/// SmallVec optimized for common case of 1-4 users
pub type UserList = SmallVec<[NodeId; 4]>;

/// Type alias for user map: arena index → users
pub type UserMap = Vec<UserList>;

/// Type alias for a set of node ids
pub type NodeSet = FxHashSet<NodeId>;

/// Pending output types during transactional re-typing
pub type TypeOverlay = FxHashMap<NodeId, OutputTypes>;

/// Build the user map from the argument edges of live nodes
///
/// This is the reference the incrementally maintained map must equal.
pub fn build_user_map(nodes: &[Node]) -> UserMap {
    let mut map: UserMap = vec![UserList::new(); nodes.len()];

    for node in nodes.iter().filter(|n| !n.released) {
        for arg in &node.args {
            if let Some(users) = map.get_mut(arg.index()) {
                users.push(node.id);
            }
        }
    }

    map
}

/// Remove one edge entry for `user`; returns whether one was found
pub fn remove_one(users: &mut UserList, user: NodeId) -> bool {
    match users.iter().position(|&u| u == user) {
        Some(pos) => {
            users.remove(pos);
            true
        }
        None => false,
    }
}

/// Users with duplicates removed, in first-edge order
pub fn distinct(users: &[NodeId]) -> SmallVec<[NodeId; 4]> {
    let mut out: SmallVec<[NodeId; 4]> = SmallVec::new();
    for &user in users {
        if !out.contains(&user) {
            out.push(user);
        }
    }
    out
}

/// Compare two user lists as multisets
pub fn same_users(a: &[NodeId], b: &[NodeId]) -> bool {
    let mut a: SmallVec<[NodeId; 4]> = a.iter().copied().collect();
    let mut b: SmallVec<[NodeId; 4]> = b.iter().copied().collect();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

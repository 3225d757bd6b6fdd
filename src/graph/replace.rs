//! Node replacement
//!
//! `replace(old, new)` moves every user of `old` over to `new`, slot for slot,
//! then lets ordinary ownership release collect whatever `old` kept alive.

use tracing::{debug, trace};

use crate::error::{GraphError, GraphResult};

use super::context::Graph;
use super::maps::remove_one;
use super::node::NodeId;
use super::traversal::ancestors;

impl Graph {
    /// Rewire every user of `old` (other than `new` itself) to `new`
    ///
    /// Returns `Ok(false)` when `old == new`. Fails without mutating if `old`
    /// is a designated output, either node is released, `new` does not
    /// provide the outputs the users consume, or the rewire would create a
    /// cycle. Users of a multi-output `old` are output selectors; each keeps
    /// its selected slot.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> GraphResult<bool> {
        if old == new {
            return Ok(false);
        }
        if self.live_node(old)?.is_result() {
            return Err(GraphError::ReplaceOutput(old));
        }
        self.live_node(new)?;

        let users: Vec<NodeId> = self
            .users(old)
            .into_iter()
            .filter(|&user| user != new)
            .collect();
        self.check_replacement_outputs(old, new, &users)?;

        let reached = ancestors(self, new);
        if users.iter().any(|user| reached.contains(user)) {
            return Err(GraphError::WouldCreateCycle { old, new });
        }

        for &user in &users {
            let mut rewired = 0;
            for arg in self.nodes[user.index()].args.iter_mut() {
                if *arg == old {
                    *arg = new;
                    rewired += 1;
                }
            }
            for _ in 0..rewired {
                remove_one(&mut self.users[old.index()], user);
                self.users[new.index()].push(user);
            }
        }
        self.retype_from(&users)?;

        debug!(
            old = %self.nodes[old.index()].name,
            new = %self.nodes[new.index()].name,
            users = users.len(),
            "node replaced"
        );
        let released = self.release_if_unused(old);
        trace!(released, "released after replace");
        Ok(true)
    }

    /// `new` must offer every output slot the users of `old` read, at the same type
    fn check_replacement_outputs(&self, old: NodeId, new: NodeId, users: &[NodeId]) -> GraphResult<()> {
        let old_types = self.nodes[old.index()].output_types();
        let new_types = self.nodes[new.index()].output_types();
        let incompatible = |reason: String| GraphError::IncompatibleReplacement { old, new, reason };

        if old_types.len() == 1 {
            return match new_types {
                [t] if t.is_compatible(&old_types[0]) => Ok(()),
                [t] => Err(incompatible(format!(
                    "output type {} differs from {}",
                    t, old_types[0]
                ))),
                _ => Err(incompatible(format!(
                    "replacement has {} outputs, expected 1",
                    new_types.len()
                ))),
            };
        }

        for &user in users {
            match self.nodes[user.index()].op().selected_output() {
                Some(n) => match (old_types.get(n), new_types.get(n)) {
                    (Some(a), Some(b)) if a.is_compatible(b) => {}
                    (_, None) => {
                        return Err(incompatible(format!(
                            "selector {} reads output {} which the replacement lacks",
                            self.nodes[user.index()].name, n
                        )))
                    }
                    _ => {
                        return Err(incompatible(format!(
                            "output {} changes type under selector {}",
                            n, self.nodes[user.index()].name
                        )))
                    }
                },
                None => {
                    let same = old_types.len() == new_types.len()
                        && old_types
                            .iter()
                            .zip(new_types.iter())
                            .all(|(a, b)| a.is_compatible(b));
                    if !same {
                        return Err(incompatible("output types differ".to_string()));
                    }
                }
            }
        }
        Ok(())
    }
}

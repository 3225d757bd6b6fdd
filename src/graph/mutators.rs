//! Graph mutation operations
//!
//! Node creation, single-edge rewiring, ownership release and transactional
//! re-typing. Every function here keeps the user index in step with the
//! argument edges it touches.

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::op::{infer_output_types, Op, OpKind};
use crate::tensor::{ElementType, ValueType};

use super::context::Graph;
use super::maps::{remove_one, NodeSet, TypeOverlay, UserList};
use super::node::{ArgList, Node, NodeId};
use super::traversal::descendants_topological;

impl Graph {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Add a node, typing it from its arguments
    ///
    /// Fails without touching the graph if an argument is unknown or the
    /// argument types violate the operation's contract. Released arguments
    /// are revived.
    pub fn add_node(&mut self, op: Op, args: &[NodeId]) -> GraphResult<NodeId> {
        for &arg in args {
            self.try_node(arg)?;
        }
        let output_types = {
            let arg_types: SmallVec<[&[ValueType]; 4]> = args
                .iter()
                .map(|a| self.nodes[a.index()].output_types.as_slice())
                .collect();
            infer_output_types(&op, &arg_types)?
        };

        let id = NodeId::from_index(self.nodes.len());
        for &arg in args {
            self.revive(arg);
            self.users[arg.index()].push(id);
        }

        let kind = op.kind();
        let node = Node {
            id,
            name: format!("{}_{}", kind, id.index()),
            op,
            args: ArgList::from_slice(args),
            output_types,
            released: false,
        };
        trace!(node = %node.name, args = ?args, "node added");
        self.nodes.push(node);
        self.users.push(UserList::new());

        match kind {
            OpKind::Parameter => self.parameters.push(id),
            OpKind::Result => self.results.push(id),
            _ => {}
        }
        Ok(id)
    }

    /// Add a graph input
    pub fn add_parameter(&mut self, value_type: ValueType) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node {
            id,
            name: format!("{}_{}", OpKind::Parameter, id.index()),
            op: Op::Parameter {
                value_type: value_type.clone(),
            },
            args: ArgList::new(),
            output_types: SmallVec::from_elem(value_type, 1),
            released: false,
        });
        self.users.push(UserList::new());
        self.parameters.push(id);
        id
    }

    /// Add a constant with row-major `values`
    pub fn add_constant(&mut self, value_type: ValueType, values: Vec<f64>) -> GraphResult<NodeId> {
        self.add_node(Op::Constant { value_type, values }, &[])
    }

    /// Add a scalar constant
    pub fn add_scalar(&mut self, element_type: ElementType, value: f64) -> GraphResult<NodeId> {
        self.add_constant(ValueType::scalar(element_type), vec![value])
    }

    /// Designate `arg` as a graph output
    pub fn add_result(&mut self, arg: NodeId) -> GraphResult<NodeId> {
        self.add_node(Op::Result, &[arg])
    }

    // ========================================================================
    // Edge mutation
    // ========================================================================

    /// Point argument `slot` of `node` at `new_arg`
    ///
    /// The node and its descendants are re-typed; if any of them no longer
    /// type-checks the edge is restored and the error returned. The previous
    /// argument is released if this was its last use.
    pub fn set_argument(&mut self, node: NodeId, slot: usize, new_arg: NodeId) -> GraphResult<()> {
        let old_arg = self
            .live_node(node)?
            .arg(slot)
            .ok_or(GraphError::SlotOutOfRange { node, slot })?;
        self.try_node(new_arg)?;
        if old_arg == new_arg {
            return Ok(());
        }
        if self.depends_on(new_arg, node) {
            return Err(GraphError::WouldCreateCycle {
                old: old_arg,
                new: new_arg,
            });
        }

        let was_released = self.is_released(new_arg);
        self.revive(new_arg);
        self.nodes[node.index()].args[slot] = new_arg;
        remove_one(&mut self.users[old_arg.index()], node);
        self.users[new_arg.index()].push(node);

        if let Err(err) = self.retype_from(&[node]) {
            self.nodes[node.index()].args[slot] = old_arg;
            remove_one(&mut self.users[new_arg.index()], node);
            self.users[old_arg.index()].push(node);
            if was_released {
                self.release_if_unused(new_arg);
            }
            return Err(err);
        }

        trace!(node = %node, slot, old = %old_arg, new = %new_arg, "argument rewired");
        self.release_if_unused(old_arg);
        Ok(())
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Release `id` if nothing uses it, cascading to arguments left unused
    ///
    /// Returns the number of nodes released.
    pub fn release_if_unused(&mut self, id: NodeId) -> usize {
        let mut stack = vec![id];
        let mut released = 0;

        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id.index()) else {
                continue;
            };
            if node.released || node.is_parameter() || node.is_result() {
                continue;
            }
            if !self.users[id.index()].is_empty() {
                continue;
            }

            let args = node.args.clone();
            self.nodes[id.index()].released = true;
            released += 1;
            for arg in args {
                let users = &mut self.users[arg.index()];
                remove_one(users, id);
                if users.is_empty() {
                    stack.push(arg);
                }
            }
            trace!(node = %self.nodes[id.index()].name, "node released");
        }

        released
    }

    /// Re-attach a released node and its released arguments
    fn revive(&mut self, id: NodeId) {
        let mut stack = vec![id];

        while let Some(id) = stack.pop() {
            if !self.nodes[id.index()].released {
                continue;
            }
            self.nodes[id.index()].released = false;
            let args = self.nodes[id.index()].args.clone();
            for arg in args {
                self.users[arg.index()].push(id);
                if self.nodes[arg.index()].released {
                    stack.push(arg);
                }
            }
            trace!(node = %self.nodes[id.index()].name, "node revived");
        }
    }

    // ========================================================================
    // Type propagation
    // ========================================================================

    /// Re-type `starts` and every descendant whose arguments changed type
    ///
    /// All-or-nothing: new types are committed only if every affected node
    /// still type-checks. Returns how many nodes changed type.
    pub(crate) fn retype_from(&mut self, starts: &[NodeId]) -> GraphResult<usize> {
        let start_set: NodeSet = starts.iter().copied().collect();
        let mut pending = TypeOverlay::default();

        for id in descendants_topological(self, starts) {
            let node = &self.nodes[id.index()];
            if !start_set.contains(&id) && !node.args.iter().any(|a| pending.contains_key(a)) {
                continue;
            }
            let types = {
                let arg_types: SmallVec<[&[ValueType]; 4]> = node
                    .args
                    .iter()
                    .map(|a| {
                        pending
                            .get(a)
                            .unwrap_or(&self.nodes[a.index()].output_types)
                            .as_slice()
                    })
                    .collect();
                infer_output_types(&node.op, &arg_types)?
            };
            if types != node.output_types {
                pending.insert(id, types);
            }
        }

        let changed = pending.len();
        for (id, types) in pending {
            self.nodes[id.index()].output_types = types;
        }
        Ok(changed)
    }

    /// Re-run type propagation over every live node
    ///
    /// Returns the number of nodes whose types changed; `0` on a graph whose
    /// types are already consistent.
    pub fn propagate_types(&mut self) -> GraphResult<usize> {
        let all: Vec<NodeId> = self.node_ids().collect();
        self.retype_from(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{AxisSet, Shape};

    fn f32_type(dims: &[usize]) -> ValueType {
        ValueType::new(ElementType::F32, Shape::from(dims))
    }

    #[test]
    fn test_add_node_types_immediately() {
        let mut graph = Graph::new();
        let x = graph.add_parameter(f32_type(&[3, 2]));
        let sum = graph
            .add_node(
                Op::Sum {
                    reduction_axes: AxisSet::from([1]),
                },
                &[x],
            )
            .unwrap();
        assert_eq!(graph.output_type(sum), Some(&f32_type(&[3])));
        assert_eq!(graph.users(x).as_slice(), &[sum]);
    }

    #[test]
    fn test_add_node_type_error_leaves_graph_untouched() {
        let mut graph = Graph::new();
        let x = graph.add_parameter(f32_type(&[3, 2]));
        let y = graph.add_parameter(f32_type(&[2, 3]));
        let err = graph.add_node(Op::Add, &[x, y]).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { op: OpKind::Add, .. }));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.use_count(x), 0);
    }

    #[test]
    fn test_add_node_unknown_argument() {
        let mut graph = Graph::new();
        let err = graph
            .add_node(Op::Tanh, &[NodeId::from_index(5)])
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownNode(_)));
    }

    #[test]
    fn test_release_cascades() {
        let mut graph = Graph::new();
        let x = graph.add_parameter(f32_type(&[4]));
        let neg = graph.add_node(Op::Negative, &[x]).unwrap();
        let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
        let tanh = graph.add_node(Op::Tanh, &[x]).unwrap();
        let result = graph.add_result(tanh).unwrap();

        assert_eq!(graph.release_if_unused(exp), 2);
        assert!(graph.is_released(exp));
        assert!(graph.is_released(neg));
        assert!(graph.is_live(x));
        assert_eq!(graph.users(x).as_slice(), &[tanh]);

        assert_eq!(graph.release_if_unused(tanh), 0);
        assert_eq!(graph.release_if_unused(result), 0);
        graph.validate().unwrap();
    }

    #[test]
    fn test_released_argument_is_revived() {
        let mut graph = Graph::new();
        let x = graph.add_parameter(f32_type(&[4]));
        let neg = graph.add_node(Op::Negative, &[x]).unwrap();
        let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
        graph.release_if_unused(exp);
        assert!(graph.is_released(neg));

        let tanh = graph.add_node(Op::Tanh, &[exp]).unwrap();
        assert!(graph.is_live(exp));
        assert!(graph.is_live(neg));
        assert_eq!(graph.users(exp).as_slice(), &[tanh]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_set_argument_retypes_descendants() {
        let mut graph = Graph::new();
        let a = graph.add_parameter(f32_type(&[2, 3]));
        let b = graph.add_parameter(f32_type(&[3, 2]));
        let tanh = graph.add_node(Op::Tanh, &[a]).unwrap();
        let exp = graph.add_node(Op::Exp, &[tanh]).unwrap();
        graph.add_result(exp).unwrap();

        graph.set_argument(tanh, 0, b).unwrap();
        assert_eq!(graph.output_type(exp), Some(&f32_type(&[3, 2])));
        assert_eq!(graph.use_count(a), 0);
        graph.validate().unwrap();
    }

    #[test]
    fn test_set_argument_rolls_back_on_type_error() {
        let mut graph = Graph::new();
        let a = graph.add_parameter(f32_type(&[2, 3]));
        let b = graph.add_parameter(f32_type(&[2, 3]));
        let c = graph.add_parameter(f32_type(&[3, 2]));
        let tanh = graph.add_node(Op::Tanh, &[a]).unwrap();
        let add = graph.add_node(Op::Add, &[tanh, b]).unwrap();
        graph.add_result(add).unwrap();

        assert!(graph.set_argument(tanh, 0, c).is_err());
        assert_eq!(graph.args(tanh).unwrap(), &[a]);
        assert_eq!(graph.output_type(tanh), Some(&f32_type(&[2, 3])));
        assert_eq!(graph.use_count(c), 0);
        graph.validate().unwrap();
    }

    #[test]
    fn test_set_argument_rejects_cycle() {
        let mut graph = Graph::new();
        let a = graph.add_parameter(f32_type(&[4]));
        let neg = graph.add_node(Op::Negative, &[a]).unwrap();
        let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
        let err = graph.set_argument(neg, 0, exp).unwrap_err();
        assert!(matches!(err, GraphError::WouldCreateCycle { .. }));
        let err = graph.set_argument(neg, 1, a).unwrap_err();
        assert!(matches!(err, GraphError::SlotOutOfRange { slot: 1, .. }));
    }

    #[test]
    fn test_propagate_types_idempotent() {
        let mut graph = Graph::new();
        let x = graph.add_parameter(f32_type(&[3, 2]));
        let t = graph.add_node(Op::transpose_2d([2, 3]), &[x]).unwrap();
        let s = graph
            .add_node(
                Op::Sum {
                    reduction_axes: AxisSet::from([0]),
                },
                &[t],
            )
            .unwrap();
        graph.add_result(s).unwrap();
        assert_eq!(graph.propagate_types().unwrap(), 0);
        assert_eq!(graph.propagate_types().unwrap(), 0);
    }

    mod props {
        use proptest::prelude::*;
        use proptest::sample::Index;

        use super::*;

        fn elementwise(code: u8) -> Op {
            match code % 8 {
                0 => Op::Negative,
                1 => Op::Exp,
                2 => Op::Tanh,
                3 => Op::Relu,
                4 => Op::Sigmoid,
                5 => Op::Sqrt,
                6 => Op::Add,
                _ => Op::Multiply,
            }
        }

        proptest! {
            #[test]
            fn propagation_is_idempotent(
                dims in prop::collection::vec(1usize..5, 0..3),
                steps in prop::collection::vec((any::<u8>(), any::<Index>()), 1..24),
            ) {
                let value_type = f32_type(&dims);
                let mut graph = Graph::new();
                let mut values = vec![graph.add_parameter(value_type.clone())];

                for (code, pick) in steps {
                    let op = elementwise(code);
                    let last = values[values.len() - 1];
                    let args = if op.kind().is_binary_elementwise() {
                        vec![last, *pick.get(&values)]
                    } else {
                        vec![last]
                    };
                    values.push(graph.add_node(op, &args).unwrap());
                }
                graph.add_result(values[values.len() - 1]).unwrap();

                prop_assert_eq!(graph.propagate_types().unwrap(), 0);
                for &id in &values {
                    prop_assert_eq!(graph.output_type(id), Some(&value_type));
                }
            }
        }
    }
}

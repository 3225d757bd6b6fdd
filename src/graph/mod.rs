//! Computation graph
//!
//! This module provides the core IR data structures:
//!
//! - [`Graph`]: append-only node arena with derived user index
//! - [`Node`] / [`NodeId`]: one typed operation instance and its stable id
//! - [`maps`]: derived index types and builders
//! - [`traversal`]: BFS/DFS iterators and orderings
//!
//! # Overview
//!
//! Argument edges are owned by the nodes; the user index is derived from them
//! and updated on every edge mutation. Nodes are typed when they are created
//! and re-typed when a rewrite changes their arguments.
//!
//! # Example
//!
//! ```
//! use fusion_ir::graph::Graph;
//! use fusion_ir::op::Op;
//! use fusion_ir::tensor::{ElementType, ValueType};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter(ValueType::new(ElementType::F32, [3, 4]));
//! let neg = graph.add_node(Op::Negative, &[x]).unwrap();
//! let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
//! graph.add_result(exp).unwrap();
//!
//! let tanh = graph.add_node(Op::Tanh, &[x]).unwrap();
//! assert!(graph.replace(exp, tanh).unwrap());
//! assert!(graph.is_released(neg));
//! ```
//!
//! # Lifecycle
//!
//! | State | Meaning |
//! |-------|---------|
//! | live | contributes argument edges and appears in traversals |
//! | released | last user went away; data kept, edges dropped |

pub mod accessors;
pub mod context;
pub mod maps;
pub mod mutators;
pub mod node;
pub mod replace;
pub mod traversal;

// Re-export main types
pub use context::Graph;
pub use maps::{NodeSet, UserList, UserMap};
pub use node::{ArgList, Node, NodeId};
pub use traversal::{BfsIterator, DfsIterator, Direction};

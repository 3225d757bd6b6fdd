//! Structural pattern matching
//!
//! Patterns describe the sub-graphs that fusion rules look for. A pattern is
//! built bottom-up in a [`Pattern`] arena from three kinds of node:
//!
//! - **Labels** bind whatever concrete node they meet, subject to a type
//!   constraint and an optional predicate. A Label used twice must bind the
//!   same node both times. A Label wrapping a sub-pattern is a *capture*.
//! - **Skips** optionally absorb a chain of single-argument nodes (for
//!   example Broadcasts or Reshapes) before matching their sub-pattern.
//! - **Op nodes** require a concrete node of a given [`OpKind`](crate::op::OpKind)
//!   with matching arguments and, optionally, matching attributes.
//!
//! [`Matcher`] matches one pattern at one candidate node. [`RecurrentMatcher`]
//! repeats a match along a recurrence label to recognise unrolled loops.
//!
//! # Example
//!
//! ```
//! use fusion_ir::graph::Graph;
//! use fusion_ir::op::{Op, OpKind};
//! use fusion_ir::pattern::{LabelType, Matcher, Pattern};
//! use fusion_ir::tensor::{ElementType, ValueType};
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter(ValueType::new(ElementType::F32, [4]));
//! let neg = graph.add_node(Op::Negative, &[x]).unwrap();
//! let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
//!
//! let mut p = Pattern::new();
//! let input = p.label(LabelType::Element(ElementType::F32));
//! let pneg = p.op(OpKind::Negative, &[input]);
//! let root = p.op(OpKind::Exp, &[pneg]);
//! let matcher = Matcher::new(p, root).unwrap();
//!
//! let m = matcher.match_node(&graph, exp).unwrap();
//! assert_eq!(m.get(input), Some(x));
//! ```

pub mod builder;
pub mod label;
pub mod matcher;
pub mod ops;
pub mod recurrent;

// Re-export main types
pub use builder::{LabelId, Pattern, PatternId};
pub use label::{Label, LabelType, NodePredicate, OpPattern, OpPredicate, PatternNode, Skip};
pub use matcher::{Matcher, PatternMap, PatternMatch};
pub use recurrent::{RecurrentMatch, RecurrentMatcher};

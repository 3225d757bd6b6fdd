//! # fusion-ir
//!
//! Tensor computation-graph IR with structural pattern matching and fusion
//! rewrites.
//!
//! This crate provides the optimization core of a tensor compiler: a typed
//! graph of operations, a backtracking sub-graph matcher, safe node
//! replacement, and a rule driver. It ships Sigmoid, LSTM-cell and RNN-layer
//! fusions plus a small reference evaluator for checking that rewrites keep
//! numerics intact.
//!
//! ## Features
//!
//! - **Graph IR**: arena of typed nodes with user tracking and type propagation
//! - **Pattern Matching**: labels, skips, commutative ops, recurrent chains
//! - **Rewrites**: rule registry, replace-with-retype, fusion pipeline
//!
//! ## Example
//!
//! ```
//! use fusion_ir::prelude::*;
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter(ValueType::new(ElementType::F32, [2, 3]));
//! let neg = graph.add_node(Op::Negative, &[x]).unwrap();
//! let out = graph.add_node(Op::Negative, &[neg]).unwrap();
//! let result = graph.add_result(out).unwrap();
//!
//! let mut p = Pattern::new();
//! let input = p.any();
//! let inner = p.op(OpKind::Negative, &[input]);
//! let root = p.op(OpKind::Negative, &[inner]);
//!
//! let mut rewrite = GraphRewrite::new();
//! rewrite.add_matcher("double_negation", Matcher::new(p, root).unwrap(), move |g, m| {
//!     g.replace(m.root(), m.require(input)?)
//! });
//! rewrite.run(&mut graph).unwrap();
//! assert_eq!(graph.args(result).unwrap(), &[x]);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod eval;
pub mod graph;
pub mod op;
pub mod pattern;
pub mod tensor;
pub mod traits;
pub mod transform;
pub mod transformers;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use fusion_ir::prelude::*`
pub mod prelude {
    pub use crate::error::{GraphError, GraphResult};
    pub use crate::eval::evaluate;
    pub use crate::graph::{Graph, Node, NodeId};
    pub use crate::op::{Op, OpKind, RnnAttrs};
    pub use crate::pattern::{LabelType, Matcher, Pattern, PatternMatch, RecurrentMatcher};
    pub use crate::tensor::{ElementType, Shape, ValueType};
    pub use crate::traits::{GraphPass, PassChain};
    pub use crate::transform::{GraphRewrite, RewriteConfig, RewriteStats};
    pub use crate::transformers::{FusionPipeline, LstmFusion, RnnFusion, SigmoidFusion};
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{GraphError, GraphResult};
pub use traits::GraphPass;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

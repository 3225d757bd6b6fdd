//! Core traits for fusion-ir
//!
//! Defines the interface shared by every graph optimization pass.

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::transform::RewriteStats;

/// Optimization pass over a graph
///
/// A pass rewrites the graph in place and reports what it did. Which passes
/// run, and in which order, is up to the caller.
///
/// # Example
///
/// ```
/// use fusion_ir::graph::Graph;
/// use fusion_ir::traits::GraphPass;
/// use fusion_ir::transform::RewriteStats;
/// use fusion_ir::GraphResult;
///
/// struct NoOp;
///
/// impl GraphPass for NoOp {
///     fn name(&self) -> &str {
///         "noop"
///     }
///
///     fn run(&self, _graph: &mut Graph) -> GraphResult<RewriteStats> {
///         Ok(RewriteStats::default())
///     }
/// }
///
/// let mut graph = Graph::new();
/// assert_eq!(NoOp.run(&mut graph).unwrap().rewrites, 0);
/// ```
pub trait GraphPass {
    /// Pass name used in logs and diagnostics
    fn name(&self) -> &str;

    /// Rewrite `graph` in place
    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats>;
}

/// Passes applied in sequence
pub struct PassChain {
    passes: Vec<Box<dyn GraphPass>>,
}

impl PassChain {
    /// Create a new empty chain
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Append a pass
    #[allow(clippy::should_implement_trait)]
    pub fn add<P: GraphPass + 'static>(mut self, pass: P) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    /// Number of passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl Default for PassChain {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphPass for PassChain {
    fn name(&self) -> &str {
        "pass_chain"
    }

    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        let mut stats = RewriteStats::default();
        for pass in &self.passes {
            let pass_stats = pass.run(graph)?;
            tracing::debug!(pass = pass.name(), rewrites = pass_stats.rewrites, "pass finished");
            stats.merge(pass_stats);
        }
        Ok(stats)
    }
}

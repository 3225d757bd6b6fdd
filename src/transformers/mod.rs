//! Ready-to-use fusion rules
//!
//! - **Sigmoid**: `1 / (1 + exp(-x))` becomes a single `Sigmoid`
//! - **LSTM cell**: one unrolled cell of primitive ops becomes an `Lstm` node
//! - **RNN layer**: a weight-sharing chain of `Lstm` cells becomes one `Rnn` node
//!
//! Each rule is a [`RewriteRule`](crate::transform::RewriteRule) (or a
//! recurrent one) that can be registered with a
//! [`GraphRewrite`](crate::transform::GraphRewrite), and also a standalone
//! [`GraphPass`]. The rules build on each other, so [`FusionPipeline`] runs them
//! in dependency order.
//!
//! # Example
//!
//! ```
//! use fusion_ir::graph::Graph;
//! use fusion_ir::op::OpKind;
//! use fusion_ir::tensor::{ElementType, ValueType};
//! use fusion_ir::traits::GraphPass;
//! use fusion_ir::transformers::FusionPipeline;
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter(ValueType::new(ElementType::F32, [4]));
//! let t = graph.add_node(fusion_ir::op::Op::Tanh, &[x]).unwrap();
//! graph.add_result(t).unwrap();
//!
//! let stats = FusionPipeline::default().run(&mut graph).unwrap();
//! assert_eq!(stats.rewrites, 0);
//! assert_eq!(graph.count_kind(OpKind::Tanh), 1);
//! ```

/// Common utilities for the fusion rules
pub mod common;
/// Fuse unrolled LSTM cells
pub mod lstm_fusion;
/// Fuse chains of LSTM cells into RNN layers
pub mod rnn_fusion;
/// Fuse the expanded logistic function
pub mod sigmoid_fusion;

#[cfg(test)]
pub(crate) mod test_graphs;

pub use common::{run_recurrent_rule, run_rule};
pub use lstm_fusion::LstmFusion;
pub use rnn_fusion::RnnFusion;
pub use sigmoid_fusion::SigmoidFusion;

use tracing::debug;

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::traits::GraphPass;
use crate::transform::{RewriteConfig, RewriteStats};

/// Fusion rules run in sequence: Sigmoid, then LSTM cell, then RNN layer
#[derive(Debug, Clone)]
pub struct FusionPipeline {
    /// Enable sigmoid fusion
    pub sigmoid: bool,
    /// Enable LSTM cell fusion
    pub lstm: bool,
    /// Enable RNN layer fusion
    pub rnn: bool,
    /// Driver configuration for every stage
    pub config: RewriteConfig,
}

impl Default for FusionPipeline {
    fn default() -> Self {
        Self {
            sigmoid: true,
            lstm: true,
            rnn: true,
            config: RewriteConfig::default(),
        }
    }
}

impl FusionPipeline {
    /// Create a new pipeline with every stage enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse cells but keep them unrolled
    pub fn cells_only() -> Self {
        Self {
            rnn: false,
            ..Self::default()
        }
    }

    /// Use `config` for every stage
    pub fn with_config(mut self, config: RewriteConfig) -> Self {
        self.config = config;
        self
    }
}

impl GraphPass for FusionPipeline {
    fn name(&self) -> &str {
        "fusion_pipeline"
    }

    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        let mut total = RewriteStats::default();

        if self.sigmoid {
            total.merge(run_rule(SigmoidFusion::new()?, graph, self.config.clone())?);
        }
        if self.lstm {
            total.merge(run_rule(LstmFusion::new()?, graph, self.config.clone())?);
        }
        if self.rnn {
            total.merge(run_recurrent_rule(RnnFusion::new()?, graph, self.config.clone())?);
        }

        debug!(
            rewrites = total.rewrites,
            rejected = total.rejected,
            live_nodes = graph.live_node_count(),
            "fusion pipeline finished"
        );
        Ok(total)
    }
}

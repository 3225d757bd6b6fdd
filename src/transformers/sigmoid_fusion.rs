//! Sigmoid fusion
//!
//! Recognises the logistic function spelled with primitive operations and
//! replaces it with a single Sigmoid node.
//!
//! Pattern: `Divide(Broadcast(1), Add(Exp(Negative(x)), Broadcast(1)))`

use tracing::debug;

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::op::{Op, OpKind};
use crate::pattern::ops::is_constant_filled;
use crate::pattern::{LabelId, LabelType, Matcher, Pattern, PatternMatch};
use crate::tensor::ElementType;
use crate::traits::GraphPass;
use crate::transform::{RewriteConfig, RewriteRule, RewriteStats};

use super::common::{is_f32, run_rule};

/// Fuse `1 / (1 + exp(-x))` into `Sigmoid(x)`
#[derive(Debug, Clone)]
pub struct SigmoidFusion {
    matcher: Matcher,
    input: LabelId,
}

impl SigmoidFusion {
    /// Rule name
    pub const NAME: &'static str = "sigmoid_fusion";

    /// Build the rule and its pattern
    pub fn new() -> GraphResult<Self> {
        let mut p = Pattern::new();
        let input = p.label(LabelType::Element(ElementType::F32));
        let one = p.label_where(LabelType::Element(ElementType::F32), is_constant_filled(1.0));
        let ones = p.op(OpKind::Broadcast, &[one]);
        let neg = p.op(OpKind::Negative, &[input]);
        let exp = p.op(OpKind::Exp, &[neg]);
        let denom = p.op(OpKind::Add, &[exp, ones]);
        let root = p.op(OpKind::Divide, &[ones, denom]);

        Ok(Self {
            matcher: Matcher::new(p, root)?,
            input,
        })
    }
}

impl RewriteRule for SigmoidFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn rewrite(&self, graph: &mut Graph, m: &PatternMatch) -> GraphResult<bool> {
        if !is_f32(graph, m.root()) {
            debug!(root = %graph.node_name(m.root()), "sigmoid: root is not f32");
            return Ok(false);
        }
        let sigmoid = graph.add_node(Op::Sigmoid, &[m.require(self.input)?])?;
        graph.replace(m.root(), sigmoid)
    }
}

impl GraphPass for SigmoidFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        run_rule(self.clone(), graph, RewriteConfig::default())
    }
}

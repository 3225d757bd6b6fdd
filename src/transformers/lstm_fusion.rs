//! LSTM cell fusion
//!
//! Recognises one unrolled LSTM cell written with primitive operations and
//! replaces it with a fused [`Op::Lstm`] node.
//!
//! ```text
//! X  = (xt . W_i2h^T + broadcast(b_i2h)) + (ht_1 . W_h2h^T + broadcast(b_h2h))
//! f  = sigmoid(X[:, 0F..1F])      i = sigmoid(X[:, 1F..2F])
//! g  = tanh(X[:, 2F..3F])         o = sigmoid(X[:, 3F..4F])
//! ct = f * ct_1 + i * g
//! ht = o * tanh(ct)
//! ```
//!
//! The match is rooted at `ht`. Users of `ht` are moved to output 0 of the
//! fused cell, users of `ct` outside the cell to output 1. Sigmoids must
//! already be fused, so run [`SigmoidFusion`](super::SigmoidFusion) first.

use tracing::debug;

use crate::error::GraphResult;
use crate::graph::Graph;
use crate::op::{Op, OpKind};
use crate::pattern::ops::{gate_slice, is_transpose_2d_reshape};
use crate::pattern::{LabelId, LabelType, Matcher, Pattern, PatternId, PatternMatch};
use crate::tensor::ElementType;
use crate::traits::GraphPass;
use crate::transform::{RewriteConfig, RewriteRule, RewriteStats};

use super::common::{dims, is_f32, run_rule, type_checks};

/// Fuse a primitive LSTM cell into [`Op::Lstm`]
#[derive(Debug, Clone)]
pub struct LstmFusion {
    matcher: Matcher,
    xt: LabelId,
    w_i2h: LabelId,
    ht_1: LabelId,
    w_h2h: LabelId,
    b_i2h: LabelId,
    b_h2h: LabelId,
    ct_1: LabelId,
    stacked: LabelId,
    ct: LabelId,
}

/// `value . W^T + broadcast(bias)`
fn projection(p: &mut Pattern, value: PatternId, weights: LabelId, bias: LabelId) -> PatternId {
    let transposed = p.op_where(OpKind::Reshape, &[weights], is_transpose_2d_reshape);
    let dot = p.op(OpKind::Dot, &[value, transposed]);
    let bias = p.op(OpKind::Broadcast, &[bias]);
    p.op(OpKind::Add, &[dot, bias])
}

impl LstmFusion {
    /// Rule name
    pub const NAME: &'static str = "lstm_fusion";

    /// Build the rule and its pattern
    pub fn new() -> GraphResult<Self> {
        let f32_label = || LabelType::Element(ElementType::F32);
        let mut p = Pattern::new();

        let xt = p.label(f32_label());
        let w_i2h = p.label(f32_label());
        let b_i2h = p.label(f32_label());
        let ht_1 = p.label(f32_label());
        let w_h2h = p.label(f32_label());
        let b_h2h = p.label(f32_label());
        let ct_1 = p.label(f32_label());

        let from_input = projection(&mut p, xt, w_i2h, b_i2h);
        let from_hidden = projection(&mut p, ht_1, w_h2h, b_h2h);
        let sum = p.op(OpKind::Add, &[from_input, from_hidden]);
        let stacked = p.capture(sum);

        let g_forget = p.op_where(OpKind::Slice, &[stacked], gate_slice(0));
        let g_input = p.op_where(OpKind::Slice, &[stacked], gate_slice(1));
        let g_candidate = p.op_where(OpKind::Slice, &[stacked], gate_slice(2));
        let g_output = p.op_where(OpKind::Slice, &[stacked], gate_slice(3));

        let forget = p.op(OpKind::Sigmoid, &[g_forget]);
        let input = p.op(OpKind::Sigmoid, &[g_input]);
        let candidate = p.op(OpKind::Tanh, &[g_candidate]);
        let output = p.op(OpKind::Sigmoid, &[g_output]);

        let keep = p.op(OpKind::Multiply, &[forget, ct_1]);
        let write = p.op(OpKind::Multiply, &[input, candidate]);
        let cell = p.op(OpKind::Add, &[keep, write]);
        let ct = p.capture(cell);
        let squashed = p.op(OpKind::Tanh, &[ct]);
        let root = p.op(OpKind::Multiply, &[output, squashed]);

        Ok(Self {
            matcher: Matcher::new(p, root)?,
            xt,
            w_i2h,
            ht_1,
            w_h2h,
            b_i2h,
            b_h2h,
            ct_1,
            stacked,
            ct,
        })
    }
}

impl RewriteRule for LstmFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    fn rewrite(&self, graph: &mut Graph, m: &PatternMatch) -> GraphResult<bool> {
        let root = m.root();
        let ht_1 = m.require(self.ht_1)?;
        let stacked = m.require(self.stacked)?;
        let ct = m.require(self.ct)?;

        if !is_f32(graph, root) {
            debug!(root = %graph.node_name(root), "lstm: hidden state is not f32");
            return Ok(false);
        }
        let feature = match (dims(graph, root), dims(graph, ht_1)) {
            (Some(&[b, f]), Some(&[prev_b, prev_f])) if (b, f) == (prev_b, prev_f) => f,
            _ => {
                debug!(root = %graph.node_name(root), "lstm: hidden states are not matching rank-2 values");
                return Ok(false);
            }
        };
        let gate_cols = dims(graph, stacked).and_then(|d| d.get(1).copied());
        if gate_cols != Some(4 * feature) {
            debug!(
                root = %graph.node_name(root),
                feature,
                gate_cols = ?gate_cols,
                "lstm: gate block is not four features wide"
            );
            return Ok(false);
        }

        let args = [
            m.require(self.xt)?,
            m.require(self.w_i2h)?,
            ht_1,
            m.require(self.w_h2h)?,
            m.require(self.b_i2h)?,
            m.require(self.b_h2h)?,
            m.require(self.ct_1)?,
        ];
        if !type_checks(graph, &Op::Lstm, &args) {
            debug!(root = %graph.node_name(root), "lstm: operands do not form a cell");
            return Ok(false);
        }

        let lstm = graph.add_node(Op::Lstm, &args)?;
        let ht_out = graph.add_node(Op::get_output_element(0), &[lstm])?;
        graph.replace(root, ht_out)?;

        // ct survives only if something outside the cell reads it
        if graph.is_live(ct) {
            let ct_out = graph.add_node(Op::get_output_element(1), &[lstm])?;
            graph.replace(ct, ct_out)?;
        }

        debug!(root = %graph.node_name(root), lstm = %graph.node_name(lstm), "lstm cell fused");
        Ok(true)
    }
}

impl GraphPass for LstmFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        run_rule(self.clone(), graph, RewriteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::evaluate;
    use crate::tensor::ValueType;
    use crate::transformers::test_graphs::{lstm_cell, sample_inputs, unrolled_lstm, LstmDims};
    use crate::transformers::SigmoidFusion;

    const DIMS: LstmDims = LstmDims {
        batch: 2,
        input: 3,
        feature: 4,
    };

    #[test]
    fn test_fuses_every_cell() {
        let mut cell = unrolled_lstm(DIMS, 3, true);
        let inputs = sample_inputs(&cell.graph);
        let before = evaluate(&cell.graph, &inputs, &[cell.result]).unwrap();

        SigmoidFusion::new().unwrap().run(&mut cell.graph).unwrap();
        assert_eq!(cell.graph.count_kind(OpKind::Sigmoid), 9);

        let stats = LstmFusion::new().unwrap().run(&mut cell.graph).unwrap();
        assert_eq!(stats.rewrites, 3);
        assert_eq!(cell.graph.count_kind(OpKind::Lstm), 3);
        for kind in [OpKind::Sigmoid, OpKind::Dot, OpKind::Slice, OpKind::Multiply] {
            assert_eq!(cell.graph.count_kind(kind), 0, "{:?} left behind", kind);
        }
        assert!(cell.graph.validate().is_ok());

        // hidden state chains through output 0, cell state through output 1
        let last = cell.graph.args(cell.result).unwrap()[0];
        let last_lstm = cell.graph.args(last).unwrap()[0];
        let last_args = cell.graph.args(last_lstm).unwrap().to_vec();
        assert_eq!(last_args[0], cell.xts[2]);
        assert_eq!(last_args[1], cell.w_i2h);
        let ht_1 = cell.graph.node(last_args[2]).unwrap();
        let ct_1 = cell.graph.node(last_args[6]).unwrap();
        assert_eq!(ht_1.op().selected_output(), Some(0));
        assert_eq!(ct_1.op().selected_output(), Some(1));
        assert_eq!(ht_1.args(), ct_1.args());

        let after = evaluate(&cell.graph, &inputs, &[cell.result]).unwrap();
        for (a, b) in before[0].iter().zip(after[0].iter()) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_cell_state_output_is_rewired() {
        let mut cell = unrolled_lstm(DIMS, 2, false);
        let ct_result = cell.graph.add_result(cell.cts[1]).unwrap();
        let inputs = sample_inputs(&cell.graph);
        let before = evaluate(&cell.graph, &inputs, &[ct_result]).unwrap();

        let stats = LstmFusion::new().unwrap().run(&mut cell.graph).unwrap();
        assert_eq!(stats.rewrites, 2);

        let selector = cell.graph.args(ct_result).unwrap()[0];
        let node = cell.graph.node(selector).unwrap();
        assert_eq!(node.op().selected_output(), Some(1));
        assert_eq!(cell.graph.node(node.args()[0]).unwrap().kind(), OpKind::Lstm);
        assert!(cell.graph.is_released(cell.cts[1]));

        let after = evaluate(&cell.graph, &inputs, &[ct_result]).unwrap();
        for (a, b) in before[0].iter().zip(after[0].iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_expanded_sigmoid_is_not_matched() {
        let mut cell = unrolled_lstm(DIMS, 1, true);
        let stats = LstmFusion::new().unwrap().run(&mut cell.graph).unwrap();
        assert_eq!(stats.matches, 0);
        assert_eq!(cell.graph.count_kind(OpKind::Lstm), 0);
    }

    #[test]
    fn test_wide_gate_block_is_declined() {
        let mut graph = Graph::new();
        let f32_type = |d: &[usize]| ValueType::new(ElementType::F32, d.to_vec());
        let state = [DIMS.batch, DIMS.feature];
        // five feature blocks, only four used as gates
        let cols = 5 * DIMS.feature;

        let h0 = graph.add_parameter(f32_type(&state));
        let c0 = graph.add_parameter(f32_type(&state));
        let w_i2h = graph.add_parameter(f32_type(&[cols, DIMS.input]));
        let w_h2h = graph.add_parameter(f32_type(&[cols, DIMS.feature]));
        let b_i2h = graph.add_parameter(f32_type(&[cols]));
        let b_h2h = graph.add_parameter(f32_type(&[cols]));
        let xt = graph.add_parameter(f32_type(&[DIMS.batch, DIMS.input]));
        let (ht, _) = lstm_cell(&mut graph, DIMS, false, xt, h0, c0, [w_i2h, w_h2h, b_i2h, b_h2h]);
        graph.add_result(ht).unwrap();

        let stats = LstmFusion::new().unwrap().run(&mut graph).unwrap();
        assert_eq!(stats.matches, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(graph.count_kind(OpKind::Lstm), 0);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_broadcast_initial_state() {
        let mut graph = Graph::new();
        let f32_type = |d: &[usize]| ValueType::new(ElementType::F32, d.to_vec());
        let gates = 4 * DIMS.feature;

        let zero = graph.add_scalar(ElementType::F32, 0.0).unwrap();
        let h0 = graph
            .add_node(
                Op::Broadcast {
                    shape: [DIMS.batch, DIMS.feature].into(),
                    axes: [0, 1].into_iter().collect(),
                },
                &[zero],
            )
            .unwrap();
        let c0 = graph.add_parameter(f32_type(&[DIMS.batch, DIMS.feature]));
        let w_i2h = graph.add_parameter(f32_type(&[gates, DIMS.input]));
        let w_h2h = graph.add_parameter(f32_type(&[gates, DIMS.feature]));
        let b_i2h = graph.add_parameter(f32_type(&[gates]));
        let b_h2h = graph.add_parameter(f32_type(&[gates]));
        let xt = graph.add_parameter(f32_type(&[DIMS.batch, DIMS.input]));
        let (ht, _) = lstm_cell(&mut graph, DIMS, false, xt, h0, c0, [w_i2h, w_h2h, b_i2h, b_h2h]);
        let result = graph.add_result(ht).unwrap();

        LstmFusion::new().unwrap().run(&mut graph).unwrap();
        let selector = graph.args(result).unwrap()[0];
        let lstm = graph.args(selector).unwrap()[0];
        assert_eq!(graph.node(lstm).unwrap().kind(), OpKind::Lstm);
        assert_eq!(graph.args(lstm).unwrap()[2], h0);
    }
}

//! RNN layer fusion
//!
//! Folds a chain of fused [`Op::Lstm`] cells that share their weights into a
//! single [`Op::Rnn`] layer. The chain is found with a [`RecurrentMatcher`]
//! that follows each cell's `ht_1` input back to the previous cell, so the
//! match rooted at the latest hidden state covers the whole unrolled layer.
//!
//! ```text
//! src_layer = concat(xt_1 .. xt_N)     (earliest timestep first)
//! src_iter  = concat(h0, c0)
//! bias      = b_i2h + b_h2h
//! rnn       = Rnn(src_layer, src_iter, W_i2h, W_h2h, bias)
//! ```
//!
//! Every old `ht` selector becomes a row slice of the hidden-state sequence;
//! a consumed final `ct` becomes the cell-state rows of the final states.

use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId};
use crate::op::{Op, OpKind, RnnAttrs};
use crate::pattern::ops::is_output_slot;
use crate::pattern::{LabelId, LabelType, Pattern, RecurrentMatch, RecurrentMatcher};
use crate::tensor::ElementType;
use crate::traits::GraphPass;
use crate::transform::{RecurrentRewriteRule, RewriteConfig, RewriteStats};

use super::common::{dims, is_lstm_output, output_selectors, row_slice, run_recurrent_rule};

/// Fuse a weight-sharing chain of LSTM cells into [`Op::Rnn`]
#[derive(Debug, Clone)]
pub struct RnnFusion {
    matcher: RecurrentMatcher,
    xt: LabelId,
    w_i2h: LabelId,
    ht_1: LabelId,
    w_h2h: LabelId,
    b_i2h: LabelId,
    b_h2h: LabelId,
    ct_1: LabelId,
    lstm: LabelId,
}

impl RnnFusion {
    /// Rule name
    pub const NAME: &'static str = "rnn_fusion";

    /// Build the rule and its recurrent pattern
    pub fn new() -> GraphResult<Self> {
        let f32_label = || LabelType::Element(ElementType::F32);
        let mut p = Pattern::new();

        let xt = p.label(f32_label());
        let w_i2h = p.label(f32_label());
        let ht_1 = p.label(f32_label());
        let w_h2h = p.label(f32_label());
        let b_i2h = p.label(f32_label());
        let b_h2h = p.label(f32_label());
        let ct_1 = p.label(f32_label());

        let cell = p.op(OpKind::Lstm, &[xt, w_i2h, ht_1, w_h2h, b_i2h, b_h2h, ct_1]);
        let lstm = p.capture(cell);
        let root = p.op_where(OpKind::GetOutputElement, &[lstm], is_output_slot(0));

        Ok(Self {
            matcher: RecurrentMatcher::new(p, root, ht_1, [w_i2h, w_h2h, b_i2h, b_h2h])?,
            xt,
            w_i2h,
            ht_1,
            w_h2h,
            b_i2h,
            b_h2h,
            ct_1,
            lstm,
        })
    }

    /// Per-repetition bindings of `label`; one per matched cell
    fn sequence<'m>(&self, m: &'m RecurrentMatch, label: LabelId, what: &str) -> GraphResult<&'m [NodeId]> {
        let seq = m.require_sequence(label)?;
        if seq.len() != m.count() {
            return Err(GraphError::fusion(
                Self::NAME,
                format!("{} bound {} times over {} cells", what, seq.len(), m.count()),
            ));
        }
        Ok(seq)
    }
}

/// First `ct_1` that is not output 1 of the cell one step earlier
fn broken_cell_state(graph: &Graph, cts_1: &[NodeId], lstms: &[NodeId]) -> Option<NodeId> {
    cts_1.iter().zip(lstms.iter().skip(1)).find_map(|(&ct_1, &previous)| {
        let carried = graph
            .node(ct_1)
            .map(|node| node.op().selected_output() == Some(1) && node.arg(0) == Some(previous))
            .unwrap_or(false);
        (!carried).then_some(ct_1)
    })
}

impl RecurrentRewriteRule for RnnFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn matcher(&self) -> &RecurrentMatcher {
        &self.matcher
    }

    fn rewrite(&self, graph: &mut Graph, m: &RecurrentMatch) -> GraphResult<bool> {
        let count = m.count();
        // latest cell first
        let xts = self.sequence(m, self.xt, "xt")?;
        let hts_1 = self.sequence(m, self.ht_1, "ht_1")?;
        let cts_1 = self.sequence(m, self.ct_1, "ct_1")?;
        let lstms = self.sequence(m, self.lstm, "lstm")?;

        if let Some(broken) = broken_cell_state(graph, cts_1, lstms) {
            debug!(
                root = %graph.node_name(m.root()),
                ct_1 = %graph.node_name(broken),
                "rnn: cell state is not carried from the previous cell"
            );
            return Ok(false);
        }

        let h0 = hts_1[count - 1];
        let c0 = cts_1[count - 1];
        for init in [h0, c0] {
            if is_lstm_output(graph, init) {
                return Err(GraphError::fusion(
                    Self::NAME,
                    format!("initial state {} is an intermediate lstm output", graph.node_name(init)),
                ));
            }
        }

        let (batch, feature) = match (dims(graph, h0), dims(graph, c0)) {
            (Some(&[b, f]), Some(&[cb, cf])) if (b, f) == (cb, cf) => (b, f),
            _ => {
                return Err(GraphError::fusion(
                    Self::NAME,
                    format!(
                        "src_iter needs two states of one [batch, feature] shape, got {} and {}",
                        graph.node_name(h0),
                        graph.node_name(c0)
                    ),
                ))
            }
        };
        let mut input = None;
        for &xt in xts {
            match dims(graph, xt) {
                Some(&[b, i]) if b == batch && input.map_or(true, |prev| prev == i) => input = Some(i),
                _ => {
                    return Err(GraphError::fusion(
                        Self::NAME,
                        format!(
                            "{} is not a [{}, input] timestep like the other cells",
                            graph.node_name(xt),
                            batch
                        ),
                    ))
                }
            }
        }
        let input = input.ok_or_else(|| GraphError::fusion(Self::NAME, "no timestep inputs"))?;

        let weights = [
            m.shared(self.w_i2h)?,
            m.shared(self.w_h2h)?,
            m.shared(self.b_i2h)?,
            m.shared(self.b_h2h)?,
        ];
        let inputs: Vec<NodeId> = xts.iter().copied().chain([h0, c0]).chain(weights).collect();
        if let Some(&offending) = inputs.iter().find(|&&i| graph.depends_on_any(i, lstms)) {
            debug!(
                root = %graph.node_name(m.root()),
                input = %graph.node_name(offending),
                "rnn: input depends on a fused cell"
            );
            return Ok(false);
        }

        let timesteps: Vec<NodeId> = xts.iter().rev().copied().collect();
        let src_layer = graph.add_node(Op::Concat { axis: 0 }, &timesteps)?;
        let src_iter = graph.add_node(Op::Concat { axis: 0 }, &[h0, c0])?;
        let bias = graph.add_node(Op::Add, &[weights[2], weights[3]])?;
        let attrs = RnnAttrs::lstm(count, input, feature);
        let rnn = graph.add_node(Op::Rnn(attrs), &[src_layer, src_iter, weights[0], weights[1], bias])?;
        let hidden_seq = graph.add_node(Op::get_output_element(0), &[rnn])?;

        // Final cell state goes first: rewiring the hidden states may release
        // the whole chain.
        let final_ct = output_selectors(graph, lstms[0], 1);
        if !final_ct.is_empty() {
            let states = graph.add_node(Op::get_output_element(1), &[rnn])?;
            let c_n = row_slice(graph, states, batch, 2 * batch)?;
            for selector in final_ct {
                graph.replace(selector, c_n)?;
            }
        }

        for (i, &lstm) in lstms.iter().enumerate() {
            let selectors = output_selectors(graph, lstm, 0);
            if selectors.is_empty() {
                continue;
            }
            let t = count - 1 - i;
            let h_t = row_slice(graph, hidden_seq, t * batch, (t + 1) * batch)?;
            for selector in selectors {
                graph.replace(selector, h_t)?;
            }
        }

        debug!(
            root = %graph.node_name(m.root()),
            rnn = %graph.node_name(rnn),
            timesteps = count,
            "lstm chain fused"
        );
        Ok(true)
    }
}

impl GraphPass for RnnFusion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, graph: &mut Graph) -> GraphResult<RewriteStats> {
        run_recurrent_rule(self.clone(), graph, RewriteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::ArrayD;

    use super::*;
    use crate::eval::evaluate;
    use crate::tensor::ValueType;
    use crate::transformers::test_graphs::{lstm_cell, sample_inputs, unrolled_lstm, LstmDims};
    use crate::transformers::LstmFusion;

    const DIMS: LstmDims = LstmDims {
        batch: 2,
        input: 3,
        feature: 4,
    };

    fn f32_type(dims: &[usize]) -> ValueType {
        ValueType::new(ElementType::F32, dims.to_vec())
    }

    fn weights(graph: &mut Graph, dims: LstmDims) -> [NodeId; 4] {
        let gates = 4 * dims.feature;
        [
            graph.add_parameter(f32_type(&[gates, dims.input])),
            graph.add_parameter(f32_type(&[gates, dims.feature])),
            graph.add_parameter(f32_type(&[gates])),
            graph.add_parameter(f32_type(&[gates])),
        ]
    }

    fn fuse(graph: &mut Graph) -> GraphResult<RewriteStats> {
        LstmFusion::new()?.run(graph)?;
        RnnFusion::new()?.run(graph)
    }

    fn assert_close(before: &ArrayD<f64>, after: &ArrayD<f64>) {
        assert_eq!(before.shape(), after.shape());
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_fuses_layer() {
        let mut cell = unrolled_lstm(DIMS, 3, false);
        let inputs = sample_inputs(&cell.graph);
        let before = evaluate(&cell.graph, &inputs, &[cell.result]).unwrap();

        let stats = fuse(&mut cell.graph).unwrap();
        assert_eq!(stats.rewrites, 1);
        assert_eq!(cell.graph.count_kind(OpKind::Rnn), 1);
        assert_eq!(cell.graph.count_kind(OpKind::Lstm), 0);
        assert!(cell.graph.validate().is_ok());

        let rnn = cell.graph.find_nodes_by_kind(OpKind::Rnn)[0];
        match cell.graph.node(rnn).unwrap().op() {
            Op::Rnn(attrs) => assert_eq!(*attrs, RnnAttrs::lstm(3, DIMS.input, DIMS.feature)),
            other => panic!("unexpected {:?}", other),
        }
        let args = cell.graph.args(rnn).unwrap().to_vec();
        assert_eq!(cell.graph.args(args[0]).unwrap(), cell.xts.as_slice());
        assert_eq!(cell.graph.args(args[1]).unwrap(), &[cell.h0, cell.c0]);
        assert_eq!(args[2], cell.w_i2h);
        assert_eq!(args[3], cell.w_h2h);
        assert_eq!(cell.graph.args(args[4]).unwrap(), &[cell.b_i2h, cell.b_h2h]);

        let after = evaluate(&cell.graph, &inputs, &[cell.result]).unwrap();
        assert_close(&before[0], &after[0]);
    }

    #[test]
    fn test_intermediate_and_final_states_are_sliced() {
        let mut cell = unrolled_lstm(DIMS, 3, false);
        let first_h = cell.graph.add_result(cell.hts[0]).unwrap();
        let last_c = cell.graph.add_result(cell.cts[2]).unwrap();
        let targets = [cell.result, first_h, last_c];
        let inputs = sample_inputs(&cell.graph);
        let before = evaluate(&cell.graph, &inputs, &targets).unwrap();

        fuse(&mut cell.graph).unwrap();
        assert_eq!(cell.graph.count_kind(OpKind::Rnn), 1);
        assert_eq!(cell.graph.count_kind(OpKind::Lstm), 0);
        assert!(cell.graph.validate().is_ok());

        let slice_of = |result: NodeId| {
            let slice = cell.graph.args(result).unwrap()[0];
            match cell.graph.node(slice).unwrap().op() {
                Op::Slice { lower, upper } => (lower.clone(), upper.clone()),
                other => panic!("unexpected {:?}", other),
            }
        };
        assert_eq!(slice_of(cell.result), (vec![4, 0], vec![6, 4]));
        assert_eq!(slice_of(first_h), (vec![0, 0], vec![2, 4]));
        assert_eq!(slice_of(last_c), (vec![2, 0], vec![4, 4]));

        let after = evaluate(&cell.graph, &inputs, &targets).unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert_close(b, a);
        }
    }

    #[test]
    fn test_single_cell_is_fused() {
        let mut cell = unrolled_lstm(DIMS, 1, false);
        let stats = fuse(&mut cell.graph).unwrap();
        assert_eq!(stats.rewrites, 1);
        assert_eq!(cell.graph.count_kind(OpKind::Rnn), 1);
        assert_eq!(cell.graph.count_kind(OpKind::Lstm), 0);
    }

    #[test]
    fn test_distinct_weights_are_not_fused() {
        let mut graph = Graph::new();
        let state = [DIMS.batch, DIMS.feature];
        let h0 = graph.add_parameter(f32_type(&state));
        let c0 = graph.add_parameter(f32_type(&state));
        let mut h = h0;
        let mut c = c0;
        for _ in 0..2 {
            let w = weights(&mut graph, DIMS);
            let xt = graph.add_parameter(f32_type(&[DIMS.batch, DIMS.input]));
            (h, c) = lstm_cell(&mut graph, DIMS, false, xt, h, c, w);
        }
        graph.add_result(h).unwrap();

        let stats = fuse(&mut graph).unwrap();
        // only the earliest cell has nothing to disagree with
        assert_eq!(stats.rewrites, 1);
        assert_eq!(graph.count_kind(OpKind::Rnn), 1);
        assert_eq!(graph.count_kind(OpKind::Lstm), 1);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_input_depending_on_chain_is_declined() {
        let dims = LstmDims {
            batch: 2,
            input: 4,
            feature: 4,
        };
        let mut graph = Graph::new();
        let state = [dims.batch, dims.feature];
        let h0 = graph.add_parameter(f32_type(&state));
        let c0 = graph.add_parameter(f32_type(&state));
        let w = weights(&mut graph, dims);
        let x1 = graph.add_parameter(f32_type(&[dims.batch, dims.input]));
        let (h1, c1) = lstm_cell(&mut graph, dims, false, x1, h0, c0, w);
        let x2 = graph.add_node(Op::Tanh, &[h1]).unwrap();
        let (h2, _) = lstm_cell(&mut graph, dims, false, x2, h1, c1, w);
        let result = graph.add_result(h2).unwrap();
        let inputs = sample_inputs(&graph);
        let before = evaluate(&graph, &inputs, &[result]).unwrap();

        let stats = fuse(&mut graph).unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.rewrites, 1);
        assert_eq!(graph.count_kind(OpKind::Lstm), 1);
        assert_eq!(graph.count_kind(OpKind::Rnn), 1);
        assert!(graph.validate().is_ok());

        let after = evaluate(&graph, &inputs, &[result]).unwrap();
        assert_close(&before[0], &after[0]);
    }

    #[test]
    fn test_foreign_cell_state_is_declined() {
        let mut graph = Graph::new();
        let state = [DIMS.batch, DIMS.feature];
        let h0 = graph.add_parameter(f32_type(&state));
        let c0 = graph.add_parameter(f32_type(&state));
        let c_reset = graph.add_parameter(f32_type(&state));
        let w = weights(&mut graph, DIMS);
        let mut h = h0;
        let mut c = c0;
        for step in 0..3 {
            let xt = graph.add_parameter(f32_type(&[DIMS.batch, DIMS.input]));
            // the second cell starts from its own cell state
            let ct_1 = if step == 1 { c_reset } else { c };
            (h, c) = lstm_cell(&mut graph, DIMS, false, xt, h, ct_1, w);
        }
        let result = graph.add_result(h).unwrap();
        let inputs = sample_inputs(&graph);
        let before = evaluate(&graph, &inputs, &[result]).unwrap();

        let stats = fuse(&mut graph).unwrap();
        // the chains rooted at the third and second cells cross the reset
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.rewrites, 1);
        assert_eq!(graph.count_kind(OpKind::Rnn), 1);
        assert_eq!(graph.count_kind(OpKind::Lstm), 2);
        assert!(!graph.users(c_reset).is_empty());
        assert!(graph.validate().is_ok());

        let after = evaluate(&graph, &inputs, &[result]).unwrap();
        assert_close(&before[0], &after[0]);
    }

    #[test]
    fn test_intermediate_initial_state_is_an_error() {
        let dims = LstmDims {
            batch: 2,
            input: 4,
            feature: 4,
        };
        let mut graph = Graph::new();
        let state = [dims.batch, dims.feature];
        let h0 = graph.add_parameter(f32_type(&state));
        let c0 = graph.add_parameter(f32_type(&state));
        let w = weights(&mut graph, dims);
        let x1 = graph.add_parameter(f32_type(&[dims.batch, dims.input]));
        let (h1, c1) = lstm_cell(&mut graph, dims, false, x1, h0, c0, w);

        // fresh hidden state but the cell state carried over
        let x2 = graph.add_node(Op::Tanh, &[h1]).unwrap();
        let fresh_h = graph.add_parameter(f32_type(&state));
        let (h2, _) = lstm_cell(&mut graph, dims, false, x2, fresh_h, c1, w);
        graph.add_result(h2).unwrap();

        LstmFusion::new().unwrap().run(&mut graph).unwrap();
        let err = RnnFusion::new().unwrap().run(&mut graph).unwrap_err();
        match err {
            GraphError::RuleFailed { rule, source, .. } => {
                assert_eq!(rule, RnnFusion::NAME);
                assert!(matches!(*source, GraphError::FusionInvariant { .. }));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

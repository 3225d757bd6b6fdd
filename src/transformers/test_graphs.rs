//! Graph builders shared by the fusion and evaluator tests

use ndarray::ArrayD;

use crate::graph::{Graph, NodeId};
use crate::op::Op;
use crate::tensor::{values_to_array, AxisSet, ElementType, Shape, ValueType};

#[derive(Debug, Clone, Copy)]
pub(crate) struct LstmDims {
    pub batch: usize,
    pub input: usize,
    pub feature: usize,
}

/// Primitive-op LSTM layer; per-timestep vectors are earliest first
pub(crate) struct UnrolledLstm {
    pub graph: Graph,
    pub xts: Vec<NodeId>,
    pub h0: NodeId,
    pub c0: NodeId,
    pub w_i2h: NodeId,
    pub w_h2h: NodeId,
    pub b_i2h: NodeId,
    pub b_h2h: NodeId,
    pub hts: Vec<NodeId>,
    pub cts: Vec<NodeId>,
    pub result: NodeId,
}

fn f32_type(dims: &[usize]) -> ValueType {
    ValueType::new(ElementType::F32, dims.to_vec())
}

/// 1 / (1 + exp(-x)) spelled with a broadcast constant
pub(crate) fn sigmoid_expanded(graph: &mut Graph, x: NodeId, dims: &[usize]) -> NodeId {
    let one = graph.add_scalar(ElementType::F32, 1.0).unwrap();
    let ones = graph
        .add_node(
            Op::Broadcast {
                shape: Shape::from(dims),
                axes: (0..dims.len()).collect(),
            },
            &[one],
        )
        .unwrap();
    let neg = graph.add_node(Op::Negative, &[x]).unwrap();
    let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
    let denom = graph.add_node(Op::Add, &[exp, ones]).unwrap();
    graph.add_node(Op::Divide, &[ones, denom]).unwrap()
}

fn sigmoid(graph: &mut Graph, x: NodeId, dims: &[usize], expanded: bool) -> NodeId {
    if expanded {
        sigmoid_expanded(graph, x, dims)
    } else {
        graph.add_node(Op::Sigmoid, &[x]).unwrap()
    }
}

fn gate_input(graph: &mut Graph, stacked: NodeId, dims: LstmDims, k: usize) -> NodeId {
    let f = dims.feature;
    graph
        .add_node(
            Op::Slice {
                lower: vec![0, k * f],
                upper: vec![dims.batch, (k + 1) * f],
            },
            &[stacked],
        )
        .unwrap()
}

fn projection(graph: &mut Graph, dims: LstmDims, value: NodeId, weights: NodeId, bias: NodeId) -> NodeId {
    let shape = graph.node(weights).unwrap().shape().unwrap();
    let (gates, cols) = (shape[0], shape[1]);
    let wt = graph.add_node(Op::transpose_2d([cols, gates]), &[weights]).unwrap();
    let dot = graph.add_node(Op::Dot, &[value, wt]).unwrap();
    let bias = graph
        .add_node(
            Op::Broadcast {
                shape: Shape::from([dims.batch, gates]),
                axes: AxisSet::from([0]),
            },
            &[bias],
        )
        .unwrap();
    graph.add_node(Op::Add, &[dot, bias]).unwrap()
}

/// One unfused LSTM cell; returns (ht, ct)
#[allow(clippy::too_many_arguments)]
pub(crate) fn lstm_cell(
    graph: &mut Graph,
    dims: LstmDims,
    expanded_sigmoid: bool,
    xt: NodeId,
    ht_1: NodeId,
    ct_1: NodeId,
    weights: [NodeId; 4],
) -> (NodeId, NodeId) {
    let [w_i2h, w_h2h, b_i2h, b_h2h] = weights;
    let state = [dims.batch, dims.feature];

    let from_input = projection(graph, dims, xt, w_i2h, b_i2h);
    let from_hidden = projection(graph, dims, ht_1, w_h2h, b_h2h);
    let stacked = graph.add_node(Op::Add, &[from_input, from_hidden]).unwrap();

    let g0 = gate_input(graph, stacked, dims, 0);
    let forget = sigmoid(graph, g0, &state, expanded_sigmoid);
    let g1 = gate_input(graph, stacked, dims, 1);
    let input = sigmoid(graph, g1, &state, expanded_sigmoid);
    let g2 = gate_input(graph, stacked, dims, 2);
    let candidate = graph.add_node(Op::Tanh, &[g2]).unwrap();
    let g3 = gate_input(graph, stacked, dims, 3);
    let output = sigmoid(graph, g3, &state, expanded_sigmoid);

    let keep = graph.add_node(Op::Multiply, &[forget, ct_1]).unwrap();
    let write = graph.add_node(Op::Multiply, &[input, candidate]).unwrap();
    let ct = graph.add_node(Op::Add, &[keep, write]).unwrap();
    let squashed = graph.add_node(Op::Tanh, &[ct]).unwrap();
    let ht = graph.add_node(Op::Multiply, &[output, squashed]).unwrap();
    (ht, ct)
}

/// `steps` cells sharing weights; the last hidden state is the graph output
pub(crate) fn unrolled_lstm(dims: LstmDims, steps: usize, expanded_sigmoid: bool) -> UnrolledLstm {
    let mut graph = Graph::new();
    let gates = 4 * dims.feature;
    let state = [dims.batch, dims.feature];

    let h0 = graph.add_parameter(f32_type(&state));
    let c0 = graph.add_parameter(f32_type(&state));
    let w_i2h = graph.add_parameter(f32_type(&[gates, dims.input]));
    let w_h2h = graph.add_parameter(f32_type(&[gates, dims.feature]));
    let b_i2h = graph.add_parameter(f32_type(&[gates]));
    let b_h2h = graph.add_parameter(f32_type(&[gates]));

    let mut xts = Vec::with_capacity(steps);
    let mut hts = Vec::with_capacity(steps);
    let mut cts = Vec::with_capacity(steps);
    let (mut h, mut c) = (h0, c0);
    for _ in 0..steps {
        let xt = graph.add_parameter(f32_type(&[dims.batch, dims.input]));
        let (ht, ct) = lstm_cell(
            &mut graph,
            dims,
            expanded_sigmoid,
            xt,
            h,
            c,
            [w_i2h, w_h2h, b_i2h, b_h2h],
        );
        xts.push(xt);
        hts.push(ht);
        cts.push(ct);
        h = ht;
        c = ct;
    }
    let result = graph.add_result(h).unwrap();

    UnrolledLstm {
        graph,
        xts,
        h0,
        c0,
        w_i2h,
        w_h2h,
        b_i2h,
        b_h2h,
        hts,
        cts,
        result,
    }
}

/// Deterministic values in [-0.5, 0.5) for every Parameter
pub(crate) fn sample_inputs(graph: &Graph) -> Vec<(NodeId, ArrayD<f64>)> {
    graph
        .parameters()
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let shape = graph.node(p).unwrap().shape().unwrap().clone();
            let values: Vec<f64> = (0..shape.numel())
                .map(|i| ((i * 7 + k * 13) % 17) as f64 / 17.0 - 0.5)
                .collect();
            (p, values_to_array(&values, &shape).unwrap())
        })
        .collect()
}

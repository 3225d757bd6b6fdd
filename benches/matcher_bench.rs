//! Benchmarks for pattern matching and the fusion pipeline
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use fusion_ir::prelude::*;
use fusion_ir::transform::RewriteRule;

const BATCH: usize = 8;
const INPUT: usize = 32;
const FEATURE: usize = 16;

fn f32_type(dims: &[usize]) -> ValueType {
    ValueType::new(ElementType::F32, dims.to_vec())
}

fn sigmoid(graph: &mut Graph, x: NodeId) -> NodeId {
    let one = graph.add_scalar(ElementType::F32, 1.0).unwrap();
    let ones = graph
        .add_node(
            Op::Broadcast {
                shape: Shape::from([BATCH, FEATURE]),
                axes: [0, 1].into_iter().collect(),
            },
            &[one],
        )
        .unwrap();
    let neg = graph.add_node(Op::Negative, &[x]).unwrap();
    let exp = graph.add_node(Op::Exp, &[neg]).unwrap();
    let denom = graph.add_node(Op::Add, &[exp, ones]).unwrap();
    graph.add_node(Op::Divide, &[ones, denom]).unwrap()
}

fn projection(graph: &mut Graph, value: NodeId, weights: NodeId, bias: NodeId, cols: usize) -> NodeId {
    let gates = 4 * FEATURE;
    let wt = graph.add_node(Op::transpose_2d([cols, gates]), &[weights]).unwrap();
    let dot = graph.add_node(Op::Dot, &[value, wt]).unwrap();
    let bias = graph
        .add_node(
            Op::Broadcast {
                shape: Shape::from([BATCH, gates]),
                axes: [0].into_iter().collect(),
            },
            &[bias],
        )
        .unwrap();
    graph.add_node(Op::Add, &[dot, bias]).unwrap()
}

/// `steps` primitive LSTM cells sharing their weights; returns the graph and the cell roots
fn unrolled_lstm(steps: usize) -> (Graph, Vec<NodeId>) {
    let mut graph = Graph::new();
    let gates = 4 * FEATURE;
    let mut h = graph.add_parameter(f32_type(&[BATCH, FEATURE]));
    let mut c = graph.add_parameter(f32_type(&[BATCH, FEATURE]));
    let w_i2h = graph.add_parameter(f32_type(&[gates, INPUT]));
    let w_h2h = graph.add_parameter(f32_type(&[gates, FEATURE]));
    let b_i2h = graph.add_parameter(f32_type(&[gates]));
    let b_h2h = graph.add_parameter(f32_type(&[gates]));

    let mut roots = Vec::with_capacity(steps);
    for _ in 0..steps {
        let xt = graph.add_parameter(f32_type(&[BATCH, INPUT]));
        let from_input = projection(&mut graph, xt, w_i2h, b_i2h, INPUT);
        let from_hidden = projection(&mut graph, h, w_h2h, b_h2h, FEATURE);
        let stacked = graph.add_node(Op::Add, &[from_input, from_hidden]).unwrap();

        let gate: Vec<NodeId> = (0..4)
            .map(|k| {
                graph
                    .add_node(
                        Op::Slice {
                            lower: vec![0, k * FEATURE],
                            upper: vec![BATCH, (k + 1) * FEATURE],
                        },
                        &[stacked],
                    )
                    .unwrap()
            })
            .collect();
        let f = sigmoid(&mut graph, gate[0]);
        let i = sigmoid(&mut graph, gate[1]);
        let g = graph.add_node(Op::Tanh, &[gate[2]]).unwrap();
        let o = sigmoid(&mut graph, gate[3]);

        let keep = graph.add_node(Op::Multiply, &[f, c]).unwrap();
        let write = graph.add_node(Op::Multiply, &[i, g]).unwrap();
        c = graph.add_node(Op::Add, &[keep, write]).unwrap();
        let squashed = graph.add_node(Op::Tanh, &[c]).unwrap();
        h = graph.add_node(Op::Multiply, &[o, squashed]).unwrap();
        roots.push(h);
    }
    graph.add_result(h).unwrap();
    (graph, roots)
}

fn matcher_benchmark(c: &mut Criterion) {
    let (mut graph, roots) = unrolled_lstm(16);
    SigmoidFusion::new().unwrap().run(&mut graph).unwrap();
    let rule = LstmFusion::new().unwrap();

    c.bench_function("lstm_cell_match", |b| {
        b.iter(|| {
            for &root in &roots {
                black_box(rule.matcher().match_node(&graph, black_box(root)));
            }
        })
    });

    let misses: Vec<NodeId> = graph.node_ids().filter(|id| graph.is_live(*id)).collect();
    c.bench_function("lstm_cell_scan", |b| {
        b.iter(|| misses.iter().filter(|&&id| rule.matcher().match_node(&graph, id).is_some()).count())
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    c.bench_function("fusion_pipeline_16_steps", |b| {
        b.iter_batched(
            || unrolled_lstm(16).0,
            |mut graph| {
                let stats = FusionPipeline::default().run(&mut graph).unwrap();
                black_box(stats.rewrites)
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, matcher_benchmark, pipeline_benchmark);
criterion_main!(benches);

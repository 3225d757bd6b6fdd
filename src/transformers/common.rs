//! Common utilities for transformers
//!
//! Shared helper functions used across the fusion rules.

use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, NodeId};
use crate::op::{infer_output_types, Op, OpKind};
use crate::tensor::{ElementType, ValueType};
use crate::transform::{GraphRewrite, RecurrentRewriteRule, RewriteConfig, RewriteRule, RewriteStats};

/// Single output type of a node, if it has exactly one
pub fn single_type(graph: &Graph, id: NodeId) -> Option<&ValueType> {
    graph.output_type(id)
}

/// Dimensions of a single-output node
pub fn dims(graph: &Graph, id: NodeId) -> Option<&[usize]> {
    single_type(graph, id).map(|t| t.shape().dims())
}

/// Check if a node has a single `f32` output
pub fn is_f32(graph: &Graph, id: NodeId) -> bool {
    single_type(graph, id).map(|t| t.element_type()) == Some(ElementType::F32)
}

/// Check if `op` would type-check over `args` without adding a node
pub fn type_checks(graph: &Graph, op: &Op, args: &[NodeId]) -> bool {
    let types: Option<Vec<&[ValueType]>> = args
        .iter()
        .map(|&a| graph.output_types(a).ok())
        .collect();
    match types {
        Some(types) => infer_output_types(op, &types).is_ok(),
        None => false,
    }
}

/// Check if a node selects an output of a fused LSTM cell
pub fn is_lstm_output(graph: &Graph, id: NodeId) -> bool {
    let Some(node) = graph.node(id) else {
        return false;
    };
    node.kind() == OpKind::GetOutputElement
        && node
            .arg(0)
            .and_then(|arg| graph.node(arg))
            .map(|arg| arg.kind() == OpKind::Lstm)
            .unwrap_or(false)
}

/// Live selectors of output `n` of a multi-output node
pub fn output_selectors(graph: &Graph, id: NodeId, n: usize) -> Vec<NodeId> {
    graph
        .users(id)
        .into_iter()
        .filter(|&u| {
            graph
                .node(u)
                .map(|node| node.op().selected_output() == Some(n))
                .unwrap_or(false)
        })
        .collect()
}

/// Rows `[begin, end)` of a rank-2 node, all columns
pub fn row_slice(graph: &mut Graph, arg: NodeId, begin: usize, end: usize) -> GraphResult<NodeId> {
    let cols = match dims(graph, arg) {
        Some(&[_, cols]) => cols,
        _ => {
            return Err(GraphError::type_mismatch(
                OpKind::Slice,
                format!("row slice of {} needs a rank-2 value", graph.node_name(arg)),
            ))
        }
    };
    graph.add_node(
        Op::Slice {
            lower: vec![begin, 0],
            upper: vec![end, cols],
        },
        &[arg],
    )
}

/// Run a single rule as its own rewrite pass
pub fn run_rule<R>(rule: R, graph: &mut Graph, config: RewriteConfig) -> GraphResult<RewriteStats>
where
    R: RewriteRule + 'static,
{
    let mut rewrite = GraphRewrite::new().with_config(config);
    rewrite.add_rule(rule);
    rewrite.run(graph)
}

/// Run a single recurrent rule as its own rewrite pass
pub fn run_recurrent_rule<R>(rule: R, graph: &mut Graph, config: RewriteConfig) -> GraphResult<RewriteStats>
where
    R: RecurrentRewriteRule + 'static,
{
    let mut rewrite = GraphRewrite::new().with_config(config);
    rewrite.add_recurrent_rule(rule);
    rewrite.run(graph)
}

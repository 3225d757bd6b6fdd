//! Reference evaluator
//!
//! Interprets a graph on dense `f64` arrays so rewrites can be checked for
//! numerical equivalence. Every operation has a straightforward kernel; none
//! of them is meant to be fast.
//!
//! # Example
//!
//! ```
//! use fusion_ir::eval::evaluate;
//! use fusion_ir::graph::Graph;
//! use fusion_ir::op::Op;
//! use fusion_ir::tensor::{AxisSet, ElementType, ValueType};
//! use ndarray::arr2;
//!
//! let mut graph = Graph::new();
//! let x = graph.add_parameter(ValueType::new(ElementType::F32, [3, 2]));
//! let sum = graph
//!     .add_node(Op::Sum { reduction_axes: AxisSet::from([0]) }, &[x])
//!     .unwrap();
//!
//! let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn();
//! let out = evaluate(&graph, &[(x, input)], &[sum]).unwrap();
//! assert_eq!(out[0].as_slice().unwrap(), &[9.0, 12.0]);
//! ```

use ndarray::{concatenate, s, Array2, ArrayD, ArrayView1, ArrayView2, ArrayViewD, Axis, Ix1, Ix2, IxDyn, Slice};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{GraphError, GraphResult};
use crate::graph::traversal::post_order;
use crate::graph::{Direction, Graph, NodeId};
use crate::op::{Op, RnnAttrs};
use crate::tensor::{array_shape, values_to_array, AxisSet, Shape};

/// Evaluate `targets` given a value for every Parameter they depend on
///
/// Each target must have a single output.
pub fn evaluate(
    graph: &Graph,
    inputs: &[(NodeId, ArrayD<f64>)],
    targets: &[NodeId],
) -> GraphResult<Vec<ArrayD<f64>>> {
    for &target in targets {
        graph.live_node(target)?;
    }
    let feeds: FxHashMap<NodeId, &ArrayD<f64>> = inputs.iter().map(|(id, a)| (*id, a)).collect();
    let mut values: FxHashMap<NodeId, Vec<ArrayD<f64>>> = FxHashMap::default();

    for id in post_order(graph, targets, Direction::Backward) {
        let node = graph.live_node(id)?;
        let outputs = match node.op() {
            Op::Parameter { value_type } => {
                let feed = feeds
                    .get(&id)
                    .ok_or_else(|| GraphError::Evaluation(format!("no input for {}", node.name())))?;
                if array_shape(feed) != *value_type.shape() {
                    return Err(GraphError::Evaluation(format!(
                        "input for {} has shape {}, expected {}",
                        node.name(),
                        array_shape(feed),
                        value_type.shape()
                    )));
                }
                vec![(*feed).clone()]
            }
            op => {
                let args = node
                    .args()
                    .iter()
                    .map(|a| {
                        values
                            .get(a)
                            .map(|v| v.as_slice())
                            .ok_or_else(|| GraphError::Evaluation(format!("{} evaluated before its arguments", node.name())))
                    })
                    .collect::<GraphResult<Vec<_>>>()?;
                evaluate_op(op, &args)?
            }
        };
        trace!(node = node.name(), outputs = outputs.len(), "evaluated");
        values.insert(id, outputs);
    }

    targets
        .iter()
        .map(|t| match values.remove(t) {
            Some(mut outputs) if outputs.len() == 1 => Ok(outputs.remove(0)),
            Some(outputs) => Err(GraphError::Evaluation(format!(
                "target {} has {} outputs",
                graph.node_name(*t),
                outputs.len()
            ))),
            // the same target listed twice
            None => Err(GraphError::Evaluation(format!(
                "target {} requested more than once",
                graph.node_name(*t)
            ))),
        })
        .collect()
}

/// Apply one operation to argument values
///
/// `args[i]` holds every output of argument `i`.
pub fn evaluate_op(op: &Op, args: &[&[ArrayD<f64>]]) -> GraphResult<Vec<ArrayD<f64>>> {
    let arg = |i: usize| single(op, args, i);

    let out = match op {
        Op::Parameter { .. } => {
            return Err(GraphError::Evaluation("Parameter values are supplied, not computed".to_string()))
        }
        Op::Constant { value_type, values } => values_to_array(values, value_type.shape())?,
        Op::Result => arg(0)?.clone(),
        Op::Add => arg(0)? + arg(1)?,
        Op::Subtract => arg(0)? - arg(1)?,
        Op::Multiply => arg(0)? * arg(1)?,
        Op::Divide => arg(0)? / arg(1)?,
        Op::Negative => arg(0)?.mapv(|v| -v),
        Op::Exp => arg(0)?.mapv(f64::exp),
        Op::Tanh => arg(0)?.mapv(f64::tanh),
        Op::Sigmoid => arg(0)?.mapv(sigmoid),
        Op::Relu => arg(0)?.mapv(|v| v.max(0.0)),
        Op::Sqrt => arg(0)?.mapv(f64::sqrt),
        Op::Broadcast { shape, axes } => broadcast(arg(0)?, shape, axes)?,
        Op::Reshape {
            input_order,
            output_shape,
        } => {
            let permuted = arg(0)?.view().permuted_axes(IxDyn(input_order));
            let values: Vec<f64> = permuted.iter().copied().collect();
            values_to_array(&values, output_shape)?
        }
        Op::Slice { lower, upper } => {
            let mut view = arg(0)?.view();
            for (axis, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
                view.slice_axis_inplace(Axis(axis), Slice::from(lo..hi));
            }
            view.to_owned()
        }
        Op::Concat { axis } => {
            let views = (0..args.len())
                .map(|i| arg(i).map(|a| a.view()))
                .collect::<GraphResult<Vec<ArrayViewD<f64>>>>()?;
            concatenate(Axis(*axis), &views).map_err(shape_error)?
        }
        Op::Dot => dot(arg(0)?, arg(1)?)?,
        Op::Sum { reduction_axes } => {
            let mut acc = arg(0)?.clone();
            for &axis in reduction_axes.iter().rev() {
                acc = acc.sum_axis(Axis(axis));
            }
            acc
        }
        Op::Tuple => {
            return (0..args.len()).map(|i| arg(i).cloned()).collect();
        }
        Op::GetOutputElement { n } => match args.first().and_then(|outputs| outputs.get(*n)) {
            Some(value) => value.clone(),
            None => return Err(GraphError::Evaluation(format!("argument has no output {}", n))),
        },
        Op::Lstm => {
            let bias = &view1(arg(4)?)? + &view1(arg(5)?)?;
            let (h, c) = lstm_cell(
                view2(arg(0)?)?,
                view2(arg(1)?)?,
                view2(arg(2)?)?,
                view2(arg(3)?)?,
                bias.view(),
                view2(arg(6)?)?,
            );
            return Ok(vec![h.into_dyn(), c.into_dyn()]);
        }
        Op::Rnn(attrs) => {
            return rnn(
                attrs,
                view2(arg(0)?)?,
                view2(arg(1)?)?,
                view2(arg(2)?)?,
                view2(arg(3)?)?,
                view1(arg(4)?)?,
            )
        }
    };
    Ok(vec![out])
}

fn single<'a>(op: &Op, args: &[&'a [ArrayD<f64>]], index: usize) -> GraphResult<&'a ArrayD<f64>> {
    match args.get(index).copied() {
        Some([a]) => Ok(a),
        _ => Err(GraphError::Evaluation(format!(
            "{}: argument {} has no single value",
            op.kind(),
            index
        ))),
    }
}

fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

fn shape_error(e: ndarray::ShapeError) -> GraphError {
    GraphError::Evaluation(e.to_string())
}

fn view1(a: &ArrayD<f64>) -> GraphResult<ArrayView1<'_, f64>> {
    a.view().into_dimensionality::<Ix1>().map_err(shape_error)
}

fn view2(a: &ArrayD<f64>) -> GraphResult<ArrayView2<'_, f64>> {
    a.view().into_dimensionality::<Ix2>().map_err(shape_error)
}

fn broadcast(a: &ArrayD<f64>, shape: &Shape, axes: &AxisSet) -> GraphResult<ArrayD<f64>> {
    let mut view = a.view();
    // ascending, so each insertion lands at its final output position
    for &axis in axes {
        view = view.insert_axis(Axis(axis));
    }
    view.broadcast(IxDyn(shape.dims()))
        .map(|v| v.to_owned())
        .ok_or_else(|| GraphError::Evaluation(format!("cannot broadcast {} to {}", array_shape(a), shape)))
}

fn dot(a: &ArrayD<f64>, b: &ArrayD<f64>) -> GraphResult<ArrayD<f64>> {
    match (a.ndim(), b.ndim()) {
        (1, 1) => {
            let v = view1(a)?.dot(&view1(b)?);
            Ok(ArrayD::from_elem(IxDyn(&[]), v))
        }
        (2, 1) => Ok(view2(a)?.dot(&view1(b)?).into_dyn()),
        (2, 2) => Ok(view2(a)?.dot(&view2(b)?).into_dyn()),
        (ra, rb) => Err(GraphError::Unsupported(format!(
            "Dot of rank {} with rank {}",
            ra, rb
        ))),
    }
}

/// One LSTM step; gate columns are [forget, input, candidate, output]
fn lstm_cell(
    x: ArrayView2<'_, f64>,
    w_i2h: ArrayView2<'_, f64>,
    h: ArrayView2<'_, f64>,
    w_h2h: ArrayView2<'_, f64>,
    bias: ArrayView1<'_, f64>,
    c: ArrayView2<'_, f64>,
) -> (Array2<f64>, Array2<f64>) {
    let gates = x.dot(&w_i2h.t()) + h.dot(&w_h2h.t()) + &bias;
    let f = c.ncols();
    let gate = |k: usize| gates.slice(s![.., k * f..(k + 1) * f]);

    let forget = gate(0).mapv(sigmoid);
    let input = gate(1).mapv(sigmoid);
    let candidate = gate(2).mapv(f64::tanh);
    let output = gate(3).mapv(sigmoid);

    let c_next = &forget * &c + &input * &candidate;
    let h_next = &output * &c_next.mapv(f64::tanh);
    (h_next, c_next)
}

fn rnn(
    attrs: &RnnAttrs,
    src_layer: ArrayView2<'_, f64>,
    src_iter: ArrayView2<'_, f64>,
    weights_layer: ArrayView2<'_, f64>,
    weights_iter: ArrayView2<'_, f64>,
    bias: ArrayView1<'_, f64>,
) -> GraphResult<Vec<ArrayD<f64>>> {
    if attrs.direction != 1 || attrs.num_fused_layers != 1 || attrs.num_cell_states != 2 {
        return Err(GraphError::Unsupported(format!(
            "Rnn with direction {}, {} layers, {} states",
            attrs.direction, attrs.num_fused_layers, attrs.num_cell_states
        )));
    }
    let steps = attrs.num_timesteps;
    if steps == 0 {
        return Err(GraphError::Evaluation("Rnn needs at least one timestep".to_string()));
    }
    let batch = src_layer.nrows() / steps;

    let mut h = src_iter.slice(s![0..batch, ..]).to_owned();
    let mut c = src_iter.slice(s![batch..2 * batch, ..]).to_owned();
    let mut sequence = Vec::with_capacity(steps);
    for step in 0..steps {
        let x = src_layer.slice(s![step * batch..(step + 1) * batch, ..]);
        let (h_next, c_next) = lstm_cell(x, weights_layer, h.view(), weights_iter, bias, c.view());
        sequence.push(h_next.clone());
        h = h_next;
        c = c_next;
    }

    let views: Vec<ArrayView2<'_, f64>> = sequence.iter().map(|a| a.view()).collect();
    let hidden = concatenate(Axis(0), &views).map_err(shape_error)?;
    let states = concatenate(Axis(0), &[h.view(), c.view()]).map_err(shape_error)?;
    Ok(vec![hidden.into_dyn(), states.into_dyn()])
}

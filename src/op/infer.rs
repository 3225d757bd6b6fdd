//! Type propagation
//!
//! Computes the output value types of an operation from the output types of
//! its arguments. Pure: the graph calls it when a node is created and again
//! when a rewrite changes the node's arguments.

use smallvec::smallvec;

use crate::error::{GraphError, GraphResult};
use crate::tensor::{first_out_of_range, is_permutation, AxisSet, Shape, ValueType};

use super::{Op, OpKind, OutputTypes, RnnAttrs};

/// Compute output types of `op` applied to arguments with `args` output types
///
/// `args[i]` holds every output type of argument `i`. Except for
/// [`Op::GetOutputElement`], every operation requires each argument to have
/// exactly one output type.
pub fn infer_output_types(op: &Op, args: &[&[ValueType]]) -> GraphResult<OutputTypes> {
    let kind = op.kind();
    if !kind.arity().accepts(args.len()) {
        return Err(GraphError::ArityMismatch {
            op: kind,
            expected: kind.arity().to_string(),
            actual: args.len(),
        });
    }

    let out = match op {
        Op::Parameter { value_type } => smallvec![value_type.clone()],
        Op::Constant { value_type, values } => {
            if values.len() != value_type.shape().numel() {
                return Err(GraphError::type_mismatch(
                    kind,
                    format!("{} values cannot fill {}", values.len(), value_type),
                ));
            }
            smallvec![value_type.clone()]
        }
        Op::Result
        | Op::Negative
        | Op::Exp
        | Op::Tanh
        | Op::Sigmoid
        | Op::Relu
        | Op::Sqrt => smallvec![single(kind, args, 0)?.clone()],
        Op::Add | Op::Subtract | Op::Multiply | Op::Divide => {
            let a = single(kind, args, 0)?;
            let b = single(kind, args, 1)?;
            if !a.is_compatible(b) {
                return Err(GraphError::type_mismatch(
                    kind,
                    format!("argument types {} and {} are not compatible", a, b),
                ));
            }
            smallvec![a.clone()]
        }
        Op::Broadcast { shape, axes } => smallvec![broadcast(kind, single(kind, args, 0)?, shape, axes)?],
        Op::Reshape {
            input_order,
            output_shape,
        } => {
            let arg = single(kind, args, 0)?;
            if !is_permutation(input_order, arg.shape().rank()) {
                return Err(GraphError::type_mismatch(
                    kind,
                    format!(
                        "input order {:?} is not a permutation of rank {}",
                        input_order,
                        arg.shape().rank()
                    ),
                ));
            }
            if arg.shape().numel() != output_shape.numel() {
                return Err(GraphError::type_mismatch(
                    kind,
                    format!("cannot reshape {} to {}", arg.shape(), output_shape),
                ));
            }
            smallvec![arg.with_shape(output_shape.clone())]
        }
        Op::Slice { lower, upper } => smallvec![slice(kind, single(kind, args, 0)?, lower, upper)?],
        Op::Concat { axis } => smallvec![concat(kind, args, *axis)?],
        Op::Dot => smallvec![dot(kind, single(kind, args, 0)?, single(kind, args, 1)?)?],
        Op::Sum { reduction_axes } => {
            let arg = single(kind, args, 0)?;
            let rank = arg.shape().rank();
            if let Some(axis) = first_out_of_range(reduction_axes, rank) {
                return Err(GraphError::AxisOutOfRange { op: kind, axis, rank });
            }
            smallvec![arg.with_shape(arg.shape().without_axes(reduction_axes))]
        }
        Op::Tuple => {
            let mut out = OutputTypes::new();
            for index in 0..args.len() {
                out.push(single(kind, args, index)?.clone());
            }
            out
        }
        Op::GetOutputElement { n } => {
            let outputs = args[0];
            match outputs.get(*n) {
                Some(t) => smallvec![t.clone()],
                None => {
                    return Err(GraphError::type_mismatch(
                        kind,
                        format!(
                            "cannot select output {} of a node with {} outputs",
                            n,
                            outputs.len()
                        ),
                    ))
                }
            }
        }
        Op::Lstm => lstm(kind, args)?,
        Op::Rnn(attrs) => rnn(kind, args, attrs)?,
    };
    Ok(out)
}

fn single<'a>(kind: OpKind, args: &[&'a [ValueType]], index: usize) -> GraphResult<&'a ValueType> {
    match args.get(index).copied() {
        Some([t]) => Ok(t),
        _ => Err(GraphError::UnresolvedType { op: kind, index }),
    }
}

fn broadcast(kind: OpKind, arg: &ValueType, shape: &Shape, axes: &AxisSet) -> GraphResult<ValueType> {
    if let Some(axis) = first_out_of_range(axes, shape.rank()) {
        return Err(GraphError::AxisOutOfRange {
            op: kind,
            axis,
            rank: shape.rank(),
        });
    }
    let expected = shape.without_axes(axes);
    if *arg.shape() != expected {
        return Err(GraphError::type_mismatch(
            kind,
            format!(
                "argument shape {} does not broadcast to {} along {:?} (expected {})",
                arg.shape(),
                shape,
                axes,
                expected
            ),
        ));
    }
    Ok(arg.with_shape(shape.clone()))
}

fn slice(kind: OpKind, arg: &ValueType, lower: &[usize], upper: &[usize]) -> GraphResult<ValueType> {
    let dims = arg.shape();
    if lower.len() != dims.rank() || upper.len() != dims.rank() {
        return Err(GraphError::type_mismatch(
            kind,
            format!(
                "bounds {:?}..{:?} do not match argument rank {}",
                lower,
                upper,
                dims.rank()
            ),
        ));
    }
    let mut out = Vec::with_capacity(dims.rank());
    for (axis, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
        if lo > hi || hi > dims[axis] {
            return Err(GraphError::type_mismatch(
                kind,
                format!(
                    "bounds {}..{} invalid for axis {} of size {}",
                    lo, hi, axis, dims[axis]
                ),
            ));
        }
        out.push(hi - lo);
    }
    Ok(arg.with_shape(out))
}

fn concat(kind: OpKind, args: &[&[ValueType]], axis: usize) -> GraphResult<ValueType> {
    let first = single(kind, args, 0)?;
    let rank = first.shape().rank();
    if axis >= rank {
        return Err(GraphError::AxisOutOfRange { op: kind, axis, rank });
    }
    let mut dims = first.shape().dims().to_vec();
    for index in 1..args.len() {
        let t = single(kind, args, index)?;
        let compatible = t.element_type() == first.element_type()
            && t.shape().rank() == rank
            && (0..rank).all(|i| i == axis || t.shape()[i] == first.shape()[i]);
        if !compatible {
            return Err(GraphError::type_mismatch(
                kind,
                format!(
                    "argument {} type {} cannot be concatenated with {} along axis {}",
                    index, t, first, axis
                ),
            ));
        }
        dims[axis] += t.shape()[axis];
    }
    Ok(first.with_shape(dims))
}

fn dot(kind: OpKind, a: &ValueType, b: &ValueType) -> GraphResult<ValueType> {
    if a.element_type() != b.element_type() {
        return Err(GraphError::type_mismatch(
            kind,
            format!("element types {} and {} differ", a.element_type(), b.element_type()),
        ));
    }
    let (sa, sb) = (a.shape(), b.shape());
    match (sa.last(), sb.first()) {
        (Some(k1), Some(k2)) if k1 == k2 => {
            let dims: Vec<usize> = sa[..sa.rank() - 1]
                .iter()
                .chain(sb[1..].iter())
                .copied()
                .collect();
            Ok(a.with_shape(dims))
        }
        _ => Err(GraphError::type_mismatch(
            kind,
            format!("cannot contract {} with {}", sa, sb),
        )),
    }
}

fn expect_dims(kind: OpKind, what: &str, t: &ValueType, dims: &[usize]) -> GraphResult<()> {
    if t.shape().dims() != dims {
        return Err(GraphError::type_mismatch(
            kind,
            format!("{} has shape {}, expected {:?}", what, t.shape(), dims),
        ));
    }
    Ok(())
}

fn expect_rank(kind: OpKind, what: &str, t: &ValueType, rank: usize) -> GraphResult<()> {
    if t.shape().rank() != rank {
        return Err(GraphError::type_mismatch(
            kind,
            format!("{} has shape {}, expected rank {}", what, t.shape(), rank),
        ));
    }
    Ok(())
}

fn same_element_types(kind: OpKind, types: &[&ValueType]) -> GraphResult<()> {
    if let Some(first) = types.first() {
        if let Some(other) = types.iter().find(|t| t.element_type() != first.element_type()) {
            return Err(GraphError::type_mismatch(
                kind,
                format!(
                    "mixed element types {} and {}",
                    first.element_type(),
                    other.element_type()
                ),
            ));
        }
    }
    Ok(())
}

/// Argument order: xt, W_i2h, ht_1, W_h2h, b_i2h, b_h2h, ct_1
fn lstm(kind: OpKind, args: &[&[ValueType]]) -> GraphResult<OutputTypes> {
    let types = (0..args.len())
        .map(|i| single(kind, args, i))
        .collect::<GraphResult<Vec<_>>>()?;
    same_element_types(kind, &types)?;

    let (xt, w_i2h, ht_1, w_h2h, b_i2h, b_h2h, ct_1) = (
        types[0], types[1], types[2], types[3], types[4], types[5], types[6],
    );
    expect_rank(kind, "xt", xt, 2)?;
    expect_rank(kind, "ht_1", ht_1, 2)?;
    let (batch, input) = (xt.shape()[0], xt.shape()[1]);
    let feature = ht_1.shape()[1];
    let gates = 4 * feature;

    expect_dims(kind, "ht_1", ht_1, &[batch, feature])?;
    expect_dims(kind, "W_i2h", w_i2h, &[gates, input])?;
    expect_dims(kind, "W_h2h", w_h2h, &[gates, feature])?;
    expect_dims(kind, "b_i2h", b_i2h, &[gates])?;
    expect_dims(kind, "b_h2h", b_h2h, &[gates])?;
    expect_dims(kind, "ct_1", ct_1, &[batch, feature])?;

    let state = ht_1.clone();
    Ok(smallvec![state.clone(), state])
}

/// Argument order: src_layer, src_iter, weights_layer, weights_iter, bias
fn rnn(kind: OpKind, args: &[&[ValueType]], attrs: &RnnAttrs) -> GraphResult<OutputTypes> {
    let types = (0..args.len())
        .map(|i| single(kind, args, i))
        .collect::<GraphResult<Vec<_>>>()?;
    same_element_types(kind, &types)?;

    let (src_layer, src_iter, weights_layer, weights_iter, bias) =
        (types[0], types[1], types[2], types[3], types[4]);
    if attrs.num_timesteps == 0 {
        return Err(GraphError::type_mismatch(kind, "num_timesteps must be positive"));
    }
    expect_rank(kind, "src_layer", src_layer, 2)?;
    let rows = src_layer.shape()[0];
    if rows % attrs.num_timesteps != 0 {
        return Err(GraphError::type_mismatch(
            kind,
            format!(
                "src_layer rows {} are not divisible by {} timesteps",
                rows, attrs.num_timesteps
            ),
        ));
    }
    let batch = rows / attrs.num_timesteps;
    let feature = attrs.feature_size;
    let input = attrs.src_layer_feature_size;
    let gates = attrs.num_gates_per_cell * feature;
    let state_rows = attrs.state_rows_per_batch() * batch;

    expect_dims(kind, "src_layer", src_layer, &[rows, input])?;
    expect_dims(kind, "src_iter", src_iter, &[state_rows, feature])?;
    expect_dims(kind, "weights_layer", weights_layer, &[gates, input])?;
    expect_dims(kind, "weights_iter", weights_iter, &[gates, feature])?;
    expect_dims(kind, "bias", bias, &[gates])?;

    Ok(smallvec![
        src_layer.with_shape([attrs.direction * attrs.num_timesteps * batch, feature]),
        src_layer.with_shape([state_rows, feature]),
    ])
}

//! Operation set
//!
//! Every graph node carries one [`Op`]: a closed tagged enum whose variants
//! hold the operation's attributes. [`OpKind`] is the attribute-free tag used
//! by patterns and diagnostics. Output types are computed by
//! [`infer::infer_output_types`].

pub mod infer;

use std::fmt;

use smallvec::SmallVec;

use crate::tensor::{AxisSet, AxisVector, Coordinate, Shape, ValueType};

pub use infer::infer_output_types;

/// Output value types of one node (most nodes have exactly one)
pub type OutputTypes = SmallVec<[ValueType; 2]>;

/// Geometry of a fused recurrent layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RnnAttrs {
    /// Number of unrolled timesteps folded into the op
    pub num_timesteps: usize,
    /// Gates per cell (4 for LSTM)
    pub num_gates_per_cell: usize,
    /// Length of the input sequence
    pub src_sequence_length: usize,
    /// Feature size of each timestep input
    pub src_layer_feature_size: usize,
    /// Hidden feature size
    pub feature_size: usize,
    /// Recurrent states per cell (hidden + cell state for LSTM)
    pub num_cell_states: usize,
    /// 1 for unidirectional
    pub direction: usize,
    /// Number of stacked layers folded into the op
    pub num_fused_layers: usize,
}

impl RnnAttrs {
    /// Single-layer, unidirectional LSTM geometry
    pub fn lstm(num_timesteps: usize, src_layer_feature_size: usize, feature_size: usize) -> Self {
        Self {
            num_timesteps,
            num_gates_per_cell: 4,
            src_sequence_length: num_timesteps,
            src_layer_feature_size,
            feature_size,
            num_cell_states: 2,
            direction: 1,
            num_fused_layers: 1,
        }
    }

    /// Rows of state per batch entry in `src_iter` and the final-state output
    pub fn state_rows_per_batch(&self) -> usize {
        self.num_cell_states * self.direction * self.num_fused_layers
    }
}

/// An operation together with its attributes
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Graph input
    Parameter {
        /// Declared type
        value_type: ValueType,
    },
    /// Constant tensor, values in row-major order
    Constant {
        /// Declared type
        value_type: ValueType,
        /// Payload
        values: Vec<f64>,
    },
    /// Designated graph output
    Result,
    /// Elementwise addition
    Add,
    /// Elementwise subtraction
    Subtract,
    /// Elementwise multiplication
    Multiply,
    /// Elementwise division
    Divide,
    /// Elementwise negation
    Negative,
    /// Elementwise exponential
    Exp,
    /// Elementwise hyperbolic tangent
    Tanh,
    /// Elementwise logistic function
    Sigmoid,
    /// Elementwise max(x, 0)
    Relu,
    /// Elementwise square root
    Sqrt,
    /// Replicate the argument along `axes` of the output `shape`
    Broadcast {
        /// Output shape
        shape: Shape,
        /// Output axes that the argument does not have
        axes: AxisSet,
    },
    /// Permute axes by `input_order`, then reinterpret as `output_shape`
    Reshape {
        /// Axis permutation applied first
        input_order: AxisVector,
        /// Output shape
        output_shape: Shape,
    },
    /// Dense sub-box `[lower, upper)`
    Slice {
        /// Inclusive lower corner
        lower: Coordinate,
        /// Exclusive upper corner
        upper: Coordinate,
    },
    /// Concatenate arguments along `axis`
    Concat {
        /// Concatenation axis
        axis: usize,
    },
    /// Contract the last axis of the first argument with the first axis of the second
    Dot,
    /// Sum-reduce over `reduction_axes`
    Sum {
        /// Axes removed by the reduction
        reduction_axes: AxisSet,
    },
    /// Aggregate several values into one multi-output node
    Tuple,
    /// Select output `n` of a multi-output argument
    GetOutputElement {
        /// Selected output slot
        n: usize,
    },
    /// Fused LSTM cell: outputs hidden state and cell state
    Lstm,
    /// Fused recurrent layer: outputs the hidden-state sequence and final states
    Rnn(RnnAttrs),
}

/// Attribute-free operation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum OpKind {
    Parameter,
    Constant,
    Result,
    Add,
    Subtract,
    Multiply,
    Divide,
    Negative,
    Exp,
    Tanh,
    Sigmoid,
    Relu,
    Sqrt,
    Broadcast,
    Reshape,
    Slice,
    Concat,
    Dot,
    Sum,
    Tuple,
    GetOutputElement,
    Lstm,
    Rnn,
}

/// Argument-count contract of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments
    Exact(usize),
    /// `n` or more arguments
    AtLeast(usize),
}

impl Arity {
    /// Check if `count` arguments satisfy this contract
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

impl Op {
    /// Attribute-free tag of this operation
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Parameter { .. } => OpKind::Parameter,
            Op::Constant { .. } => OpKind::Constant,
            Op::Result => OpKind::Result,
            Op::Add => OpKind::Add,
            Op::Subtract => OpKind::Subtract,
            Op::Multiply => OpKind::Multiply,
            Op::Divide => OpKind::Divide,
            Op::Negative => OpKind::Negative,
            Op::Exp => OpKind::Exp,
            Op::Tanh => OpKind::Tanh,
            Op::Sigmoid => OpKind::Sigmoid,
            Op::Relu => OpKind::Relu,
            Op::Sqrt => OpKind::Sqrt,
            Op::Broadcast { .. } => OpKind::Broadcast,
            Op::Reshape { .. } => OpKind::Reshape,
            Op::Slice { .. } => OpKind::Slice,
            Op::Concat { .. } => OpKind::Concat,
            Op::Dot => OpKind::Dot,
            Op::Sum { .. } => OpKind::Sum,
            Op::Tuple => OpKind::Tuple,
            Op::GetOutputElement { .. } => OpKind::GetOutputElement,
            Op::Lstm => OpKind::Lstm,
            Op::Rnn(_) => OpKind::Rnn,
        }
    }

    /// 2-D transpose to `output_shape`
    pub fn transpose_2d(output_shape: impl Into<Shape>) -> Self {
        Op::Reshape {
            input_order: vec![1, 0],
            output_shape: output_shape.into(),
        }
    }

    /// Row-major reinterpretation without permutation
    pub fn reshape(rank: usize, output_shape: impl Into<Shape>) -> Self {
        Op::Reshape {
            input_order: (0..rank).collect(),
            output_shape: output_shape.into(),
        }
    }

    /// Output selector for slot `n`
    pub fn get_output_element(n: usize) -> Self {
        Op::GetOutputElement { n }
    }

    /// Selected slot if this is a [`Op::GetOutputElement`]
    pub fn selected_output(&self) -> Option<usize> {
        match self {
            Op::GetOutputElement { n } => Some(*n),
            _ => None,
        }
    }

    /// Constant payload if this is a [`Op::Constant`]
    pub fn constant_values(&self) -> Option<&[f64]> {
        match self {
            Op::Constant { values, .. } => Some(values),
            _ => None,
        }
    }
}

impl OpKind {
    /// Operation name used in node names and diagnostics
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Parameter => "Parameter",
            OpKind::Constant => "Constant",
            OpKind::Result => "Result",
            OpKind::Add => "Add",
            OpKind::Subtract => "Subtract",
            OpKind::Multiply => "Multiply",
            OpKind::Divide => "Divide",
            OpKind::Negative => "Negative",
            OpKind::Exp => "Exp",
            OpKind::Tanh => "Tanh",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::Relu => "Relu",
            OpKind::Sqrt => "Sqrt",
            OpKind::Broadcast => "Broadcast",
            OpKind::Reshape => "Reshape",
            OpKind::Slice => "Slice",
            OpKind::Concat => "Concat",
            OpKind::Dot => "Dot",
            OpKind::Sum => "Sum",
            OpKind::Tuple => "Tuple",
            OpKind::GetOutputElement => "GetOutputElement",
            OpKind::Lstm => "Lstm",
            OpKind::Rnn => "Rnn",
        }
    }

    /// Argument-count contract
    pub fn arity(self) -> Arity {
        match self {
            OpKind::Parameter | OpKind::Constant => Arity::Exact(0),
            OpKind::Result
            | OpKind::Negative
            | OpKind::Exp
            | OpKind::Tanh
            | OpKind::Sigmoid
            | OpKind::Relu
            | OpKind::Sqrt
            | OpKind::Broadcast
            | OpKind::Reshape
            | OpKind::Slice
            | OpKind::Sum
            | OpKind::GetOutputElement => Arity::Exact(1),
            OpKind::Add | OpKind::Subtract | OpKind::Multiply | OpKind::Divide | OpKind::Dot => {
                Arity::Exact(2)
            }
            OpKind::Concat => Arity::AtLeast(1),
            OpKind::Tuple => Arity::AtLeast(0),
            OpKind::Lstm => Arity::Exact(7),
            OpKind::Rnn => Arity::Exact(5),
        }
    }

    /// Binary operations whose arguments may be swapped
    pub fn is_commutative(self) -> bool {
        matches!(self, OpKind::Add | OpKind::Multiply)
    }

    /// Elementwise operations of one argument
    pub fn is_unary_elementwise(self) -> bool {
        matches!(
            self,
            OpKind::Negative
                | OpKind::Exp
                | OpKind::Tanh
                | OpKind::Sigmoid
                | OpKind::Relu
                | OpKind::Sqrt
        )
    }

    /// Elementwise operations of two same-typed arguments
    pub fn is_binary_elementwise(self) -> bool {
        matches!(
            self,
            OpKind::Add | OpKind::Subtract | OpKind::Multiply | OpKind::Divide
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

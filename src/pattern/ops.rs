//! Common pattern predicates
//!
//! Node and attribute predicates shared by the fusion rules. Each returns a
//! closure ready to hand to [`Pattern::label_where`](super::Pattern::label_where)
//! or [`Pattern::op_where`](super::Pattern::op_where).

use crate::graph::Node;
use crate::op::Op;
use crate::tensor::is_transpose_2d;

/// Node is a Constant whose every element equals `value`
pub fn is_constant_filled(value: f64) -> impl Fn(&Node) -> bool + Send + Sync + 'static {
    move |node| match node.op().constant_values() {
        Some(values) => !values.is_empty() && values.iter().all(|&v| v == value),
        None => false,
    }
}

/// Reshape attribute check: 2-D transpose
pub fn is_transpose_2d_reshape(op: &Op) -> bool {
    match op {
        Op::Reshape { input_order, .. } => is_transpose_2d(input_order),
        _ => false,
    }
}

/// Slice attribute check: column block `k` of a row-complete split into equal gates
///
/// Accepts `[0, k*w) .. [rows, (k+1)*w)` for any positive width `w`; the
/// rows and total width are checked by the rewrite, which has the types.
pub fn gate_slice(k: usize) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    move |op| match op {
        Op::Slice { lower, upper } if lower.len() == 2 && upper.len() == 2 => {
            let width = upper[1].saturating_sub(lower[1]);
            lower[0] == 0 && width > 0 && lower[1] == k * width
        }
        _ => false,
    }
}

/// GetOutputElement attribute check: selects slot `n`
pub fn is_output_slot(n: usize) -> impl Fn(&Op) -> bool + Send + Sync + 'static {
    move |op| op.selected_output() == Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::tensor::{ElementType, ValueType};

    #[test]
    fn test_constant_filled() {
        let mut graph = Graph::new();
        let t = ValueType::new(ElementType::F32, [2]);
        let ones = graph.add_constant(t.clone(), vec![1.0, 1.0]).unwrap();
        let mixed = graph.add_constant(t.clone(), vec![1.0, 2.0]).unwrap();
        let param = graph.add_parameter(t);

        let pred = is_constant_filled(1.0);
        assert!(pred(graph.node(ones).unwrap()));
        assert!(!pred(graph.node(mixed).unwrap()));
        assert!(!pred(graph.node(param).unwrap()));
    }

    #[test]
    fn test_gate_slice() {
        let slice = |lo: usize, hi: usize| Op::Slice {
            lower: vec![0, lo],
            upper: vec![10, hi],
        };
        assert!(gate_slice(0)(&slice(0, 100)));
        assert!(gate_slice(2)(&slice(200, 300)));
        assert!(!gate_slice(1)(&slice(200, 300)));
        assert!(!gate_slice(0)(&slice(0, 0)));
        assert!(!gate_slice(0)(&Op::Slice {
            lower: vec![1, 0],
            upper: vec![10, 100],
        }));
        assert!(!gate_slice(0)(&Op::Tanh));
    }

    #[test]
    fn test_attribute_checks() {
        assert!(is_transpose_2d_reshape(&Op::transpose_2d([4, 3])));
        assert!(!is_transpose_2d_reshape(&Op::reshape(2, [4, 3])));
        assert!(is_output_slot(1)(&Op::get_output_element(1)));
        assert!(!is_output_slot(0)(&Op::get_output_element(1)));
    }
}

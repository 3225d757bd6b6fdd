//! Tensor conversion utilities
//!
//! Convert between flat constant payloads and ndarray arrays.

use ndarray::{Array, ArrayD, IxDyn};

use crate::error::{GraphError, GraphResult};

use super::Shape;

/// Build a dense array from row-major values
pub fn values_to_array(values: &[f64], shape: &Shape) -> GraphResult<ArrayD<f64>> {
    if values.len() != shape.numel() {
        return Err(GraphError::Evaluation(format!(
            "{} values do not fill shape {} (expected {})",
            values.len(),
            shape,
            shape.numel()
        )));
    }
    Array::from_shape_vec(IxDyn(shape.dims()), values.to_vec())
        .map_err(|e| GraphError::Evaluation(e.to_string()))
}

/// Flatten an array into row-major values
pub fn array_to_values(array: &ArrayD<f64>) -> Vec<f64> {
    array.iter().copied().collect()
}

/// Shape of an array as a [`Shape`]
pub fn array_shape(array: &ArrayD<f64>) -> Shape {
    Shape::from(array.shape())
}

/// Reshape row-major values into a new shape
pub fn reshape_array(array: &ArrayD<f64>, shape: &Shape) -> GraphResult<ArrayD<f64>> {
    values_to_array(&array_to_values(array), shape)
}

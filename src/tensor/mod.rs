//! Tensor value types
//!
//! This module provides the static typing vocabulary of the IR:
//! - Element types (`dtype`)
//! - Shapes and axis helpers (`shape`)
//! - Value types, the `(element type, shape)` pair on every edge (`value_type`)
//! - Conversion between constant payloads and ndarray (`convert`)
//!
//! # Example
//!
//! ```
//! use fusion_ir::tensor::{ElementType, ValueType};
//!
//! let a = ValueType::new(ElementType::F32, [10, 100]);
//! let b = ValueType::new(ElementType::F32, [10, 100]);
//! assert!(a.is_compatible(&b));
//! ```

pub mod convert;
pub mod dtype;
pub mod shape;
pub mod value_type;

// Re-export commonly used items
pub use convert::{array_shape, array_to_values, reshape_array, values_to_array};
pub use dtype::ElementType;
pub use shape::{
    first_out_of_range, is_permutation, is_transpose_2d, AxisSet, AxisVector, Coordinate, Shape,
};
pub use value_type::ValueType;

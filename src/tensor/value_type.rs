//! Value types
//!
//! `(element type, shape)` pairs carried by every node output.

use std::fmt;

use super::{ElementType, Shape};

/// Type of a value flowing along a graph edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueType {
    element_type: ElementType,
    shape: Shape,
}

impl ValueType {
    /// Create a value type
    pub fn new(element_type: ElementType, shape: impl Into<Shape>) -> Self {
        Self {
            element_type,
            shape: shape.into(),
        }
    }

    /// Scalar of the given element type
    pub fn scalar(element_type: ElementType) -> Self {
        Self::new(element_type, Shape::scalar())
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Shape
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Same element type with a different shape
    pub fn with_shape(&self, shape: impl Into<Shape>) -> Self {
        Self::new(self.element_type, shape)
    }

    /// Compatible iff element types and shapes are both equal (no implicit broadcasting)
    pub fn is_compatible(&self, other: &ValueType) -> bool {
        self.element_type == other.element_type && self.shape == other.shape
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.element_type, self.shape)
    }
}

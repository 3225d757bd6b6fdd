//! Shape utilities
//!
//! Static tensor shapes and the axis helpers shared by type propagation
//! and the reference evaluator.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Deref;

use smallvec::SmallVec;

/// Ordered set of axes (reduction axes, broadcast axes)
pub type AxisSet = BTreeSet<usize>;

/// Ordered sequence of axes (permutations)
pub type AxisVector = Vec<usize>;

/// Position in a tensor (slice bounds)
pub type Coordinate = Vec<usize>;

/// Static shape: ordered, non-negative dimension sizes (rank 0 = scalar)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(SmallVec<[usize; 4]>);

impl Shape {
    /// Create a shape from dimension sizes
    pub fn new(dims: impl IntoIterator<Item = usize>) -> Self {
        Self(dims.into_iter().collect())
    }

    /// Rank-0 shape
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Check if this is a scalar shape
    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of elements (1 for scalars)
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Dimension sizes as a slice
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Shape with `axes` removed, keeping the remaining axes in order
    pub fn without_axes(&self, axes: &AxisSet) -> Shape {
        Shape(
            self.0
                .iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, &d)| d)
                .collect(),
        )
    }
}

impl Deref for Shape {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(SmallVec::from_slice(dims))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.into_iter().collect())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

/// Check that `order` is a permutation of `0..rank`
pub fn is_permutation(order: &[usize], rank: usize) -> bool {
    if order.len() != rank {
        return false;
    }
    let mut seen = vec![false; rank];
    for &axis in order {
        if axis >= rank || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}

/// First axis in `axes` that is out of range for `rank`
pub fn first_out_of_range(axes: &AxisSet, rank: usize) -> Option<usize> {
    axes.iter().copied().find(|&axis| axis >= rank)
}

/// Check if `order` is the 2-D transpose permutation
pub fn is_transpose_2d(order: &[usize]) -> bool {
    order == [1, 0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(Shape::from([2, 3, 4]).numel(), 24);
        assert_eq!(Shape::scalar().numel(), 1);
        assert_eq!(Shape::from([5, 0]).numel(), 0);
    }

    #[test]
    fn test_without_axes() {
        let shape = Shape::from([3, 2]);
        assert_eq!(shape.without_axes(&AxisSet::from([0])), Shape::from([2]));
        assert_eq!(shape.without_axes(&AxisSet::from([1])), Shape::from([3]));
        assert_eq!(shape.without_axes(&AxisSet::from([0, 1])), Shape::scalar());
        assert_eq!(shape.without_axes(&AxisSet::new()), shape);
    }

    #[test]
    fn test_is_permutation() {
        assert!(is_permutation(&[1, 0], 2));
        assert!(is_permutation(&[0, 2, 1], 3));
        assert!(!is_permutation(&[0, 0], 2));
        assert!(!is_permutation(&[0, 2], 2));
        assert!(!is_permutation(&[0], 2));
    }

    #[test]
    fn test_first_out_of_range() {
        assert_eq!(first_out_of_range(&AxisSet::from([0, 1]), 2), None);
        assert_eq!(first_out_of_range(&AxisSet::from([0, 2, 5]), 2), Some(2));
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([10, 100]).to_string(), "[10, 100]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }
}

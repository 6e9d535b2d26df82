//! Shape utilities for tensor dimensions.
//!
//! This module provides the [`Shape`] type for representing and validating
//! tensor dimensions, along with the broadcasting rules shared by every
//! elementwise operation.

use std::fmt;
use std::ops::{Deref, Index};

use crate::{TensorError, TensorResult};

/// Maximum number of axes a tensor can have.
pub const MAX_DIMS: usize = 4;

/// Represents the active dimensions of a tensor.
///
/// # Examples
///
/// ```
/// use litecnn_tensor::Shape;
///
/// let shape = Shape::new(vec![2, 3, 4]);
/// assert_eq!(shape.ndim(), 3);
/// assert_eq!(shape.numel(), 24);
/// assert_eq!(shape[0], 2);
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Creates a scalar shape (zero dimensions).
    pub fn scalar() -> Self {
        Self { dims: vec![] }
    }

    /// Creates a validated shape: 1 to [`MAX_DIMS`] dimensions, all positive.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] otherwise.
    pub fn checked(dims: &[usize]) -> TensorResult<Self> {
        if dims.is_empty() || dims.len() > MAX_DIMS {
            return Err(TensorError::InvalidShape(format!(
                "expected 1 to {} dimensions, got {:?}",
                MAX_DIMS, dims
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(TensorError::InvalidShape(format!(
                "dimensions must be positive, got {:?}",
                dims
            )));
        }
        Ok(Self::new(dims.to_vec()))
    }

    /// Returns the number of dimensions (rank) of the shape.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements in a tensor of this shape.
    ///
    /// A scalar shape holds exactly one element.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the dimensions as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.dims
    }

    /// Consumes the shape and returns the underlying dimensions vector.
    pub fn into_vec(self) -> Vec<usize> {
        self.dims
    }

    /// Returns the dimensions padded with trailing ones to [`MAX_DIMS`].
    pub fn padded(&self) -> [usize; MAX_DIMS] {
        let mut out = [1; MAX_DIMS];
        out[..self.dims.len()].copy_from_slice(&self.dims);
        out
    }

    /// Returns whether this shape is compatible for broadcasting with another shape.
    ///
    /// Two shapes are broadcast-compatible if, starting from the trailing dimensions,
    /// the dimension sizes are either equal or one of them is 1.
    ///
    /// # Examples
    ///
    /// ```
    /// use litecnn_tensor::Shape;
    ///
    /// let a = Shape::new(vec![2, 1, 3]);
    /// let b = Shape::new(vec![2, 3]);
    /// assert!(a.is_broadcast_compatible(&b));
    ///
    /// let c = Shape::new(vec![3, 4]);
    /// let d = Shape::new(vec![5]);
    /// assert!(!c.is_broadcast_compatible(&d));
    /// ```
    pub fn is_broadcast_compatible(&self, other: &Shape) -> bool {
        self.dims
            .iter()
            .rev()
            .zip(other.dims.iter().rev())
            .all(|(&a, &b)| a == b || a == 1 || b == 1)
    }

    /// Computes the broadcast shape of two shapes.
    ///
    /// Returns `None` if the shapes are not broadcast-compatible.
    ///
    /// # Examples
    ///
    /// ```
    /// use litecnn_tensor::Shape;
    ///
    /// let a = Shape::new(vec![2, 1, 3]);
    /// let b = Shape::new(vec![1, 2, 3]);
    /// assert_eq!(a.broadcast_with(&b).unwrap().as_slice(), &[2, 2, 3]);
    /// ```
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        if !self.is_broadcast_compatible(other) {
            return None;
        }

        let max_ndim = self.ndim().max(other.ndim());
        let mut result = vec![0; max_ndim];

        for i in 0..max_ndim {
            let a = if i < self.ndim() {
                self.dims[self.ndim() - 1 - i]
            } else {
                1
            };
            let b = if i < other.ndim() {
                other.dims[other.ndim() - 1 - i]
            } else {
                1
            };
            result[max_ndim - 1 - i] = a.max(b);
        }

        Some(Shape::new(result))
    }

    /// Returns the strides for a contiguous (row-major) tensor with this shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use litecnn_tensor::Shape;
    ///
    /// let shape = Shape::new(vec![2, 3, 4]);
    /// assert_eq!(shape.strides(), vec![12, 4, 1]);
    /// ```
    pub fn strides(&self) -> Vec<usize> {
        if self.dims.is_empty() {
            return vec![];
        }

        let mut strides = vec![1; self.ndim()];
        for i in (0..self.ndim() - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, ")")
    }
}

impl Deref for Shape {
    type Target = [usize];

    fn deref(&self) -> &Self::Target {
        &self.dims
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, index: usize) -> &Self::Output {
        &self.dims[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

//! Strided tensor engine for litecnn.
//!
//! This crate provides [`Tensor`], a value type describing up to four axes of
//! `f64` elements laid out in a shared, reference-counted backing buffer.
//!
//! # Overview
//!
//! A tensor is a shape, a stride per axis, an offset and a handle to a
//! buffer. Cloning a tensor, transposing it, reshaping it or slicing it all
//! produce *views*: they carry new metadata but point at the same buffer, so a
//! write through one view is visible through every other view. [`Tensor::fork`]
//! is the only way to break the aliasing.
//!
//! Elementwise operations follow the usual broadcasting rules: shapes are
//! aligned from the trailing axis, and every axis must be equal or 1 on one
//! side.
//!
//! # Example
//!
//! ```rust
//! use litecnn_tensor::Tensor;
//!
//! let a = Tensor::from_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
//! let b = Tensor::from_vec(&[3, 2], vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
//!
//! let c = a.dot(&b).unwrap();
//! assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);
//!
//! // Transpose is a view: writing through it changes `a`.
//! let mut t = a.t();
//! t.set(&[2, 0], 30.0).unwrap();
//! assert_eq!(a.at(&[0, 2]).unwrap(), 30.0);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod ops;
pub mod shape;
pub mod tensor;

pub use shape::{Shape, MAX_DIMS};
pub use tensor::{Tensor, DEFAULT_SEED};

/// Error types for tensor operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// Shape mismatch error.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape.
        got: Vec<usize>,
    },

    /// Element access outside of the declared shape.
    #[error("Index {index:?} out of bounds for shape {shape:?}")]
    IndexOutOfBounds {
        /// The requested index.
        index: Vec<usize>,
        /// The shape of the tensor.
        shape: Vec<usize>,
    },

    /// Reshape that does not preserve the element count or targets a
    /// non-contiguous view.
    #[error("Invalid reshape: {0}")]
    InvalidReshape(String),

    /// Operation not supported for the given operands.
    #[error("Operation not supported: {0}")]
    UnsupportedOperation(String),

    /// Invalid shape error.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Reduction axis outside of the tensor's rank.
    #[error("Invalid axis {axis} for a tensor of rank {ndim}")]
    InvalidAxis {
        /// The requested axis.
        axis: isize,
        /// The tensor's rank.
        ndim: usize,
    },

    /// Invalid argument for an operation (e.g. a negative distribution scale).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for tensor operations.
pub type TensorResult<T> = Result<T, TensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_workflow() {
        let a = Tensor::zeros(&[2, 3]).unwrap().add_scalar(1.0);
        let b = Tensor::zeros(&[2, 3]).unwrap().add_scalar(1.0);

        let c = a.add(&b).unwrap();
        assert_eq!(c.shape(), vec![2, 3]);
        assert_eq!(c.to_vec(), vec![2.0; 6]);
    }

    #[test]
    fn test_shape_utilities() {
        let shape = Shape::new(vec![2, 3, 4]);
        assert_eq!(shape.ndim(), 3);
        assert_eq!(shape.numel(), 24);
        assert_eq!(shape.strides(), vec![12, 4, 1]);
    }

    #[test]
    fn test_tensor_error() {
        let err = TensorError::ShapeMismatch {
            expected: vec![2, 3],
            got: vec![3, 2],
        };
        assert!(format!("{}", err).contains("Shape mismatch"));

        let err = TensorError::IndexOutOfBounds {
            index: vec![5],
            shape: vec![3],
        };
        assert!(format!("{}", err).contains("out of bounds"));
    }
}

//! Differentiable layers for litecnn.
//!
//! This crate provides the stages of a small convolutional network, each with
//! a hand-written backward pass:
//!
//! - **Affine**: fully connected `y = xW + b`
//! - **Relu**: rectified linear activation
//! - **MaxPool**: max pooling over the two trailing axes
//! - **Conv**: 2-D convolution with stride and implicit zero padding
//! - **softmax_loss**: mean cross-entropy and its gradient
//!
//! # Layer Trait
//!
//! All layers implement the [`Layer`] trait. `forward` is pure; use
//! `forward_train` before `backward`:
//!
//! ```
//! use litecnn_layers::prelude::*;
//!
//! let mut affine = Affine::new(3, 2, 1e-2).unwrap();
//! let x = Tensor::zeros(&[4, 3]).unwrap();
//! let y = affine.forward_train(&x).unwrap();
//! let dx = affine.backward(&y.zeros_like()).unwrap();
//! assert_eq!(dx.shape(), vec![4, 3]);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod affine;
pub mod conv;
pub mod error;
pub mod initializer;
pub mod layer;
pub mod loss;
pub mod pooling;
pub mod regularizer;

pub use activation::Relu;
pub use affine::Affine;
pub use conv::{Conv, ConvConfig};
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use layer::Layer;
pub use loss::softmax_loss;
pub use pooling::{MaxPool, MaxPoolConfig};
pub use regularizer::Regularizer;

/// Prelude module for convenient imports.
///
/// ```
/// use litecnn_layers::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::Relu;
    pub use crate::affine::Affine;
    pub use crate::conv::{Conv, ConvConfig};
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::layer::Layer;
    pub use crate::loss::softmax_loss;
    pub use crate::pooling::{MaxPool, MaxPoolConfig};
    pub use crate::regularizer::Regularizer;
    pub use litecnn_tensor::Tensor;
}

//! Layer trait definition.
//!
//! This module defines the core [`Layer`] trait shared by every
//! differentiable stage of the network.

use litecnn_tensor::Tensor;

use crate::error::LayerResult;

/// A network stage that supports forward and backward propagation.
///
/// A layer has two forward entry points:
/// - [`Layer::forward`] is pure and is used for prediction and evaluation;
/// - [`Layer::forward_train`] additionally caches what [`Layer::backward`]
///   needs. Each call overwrites the previous cache.
///
/// # Example
///
/// ```
/// use litecnn_layers::{Layer, Relu};
/// use litecnn_tensor::Tensor;
///
/// let mut relu = Relu::new();
/// let x = Tensor::from_vec(&[4], vec![-1.0, 1.0, 0.0, 2.0]).unwrap();
/// let y = relu.forward_train(&x).unwrap();
/// assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0, 2.0]);
/// ```
pub trait Layer: Send + Sync {
    /// Computes the output for `input` without touching the cache.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::LayerError`] if the input shape is incompatible with
    /// the layer.
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor>;

    /// Computes the output for `input` and remembers what backward needs.
    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor>;

    /// Takes the gradient of the loss with respect to the most recent
    /// training output and returns the gradient with respect to its input.
    /// Parameter gradients are stored on the layer.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LayerError::NotInitialized`] if no training forward
    /// pass has happened, or a shape error if `grad` does not match the cached
    /// output.
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor>;

    /// Returns the learnable parameters.
    fn parameters(&self) -> Vec<&Tensor>;

    /// Returns mutable references to the learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Returns the gradients from the last backward pass, in the same order
    /// as [`Layer::parameters`]. Empty before the first backward pass.
    fn gradients(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Returns the regularization loss contributed by this layer.
    fn regularization_loss(&self) -> f64 {
        0.0
    }

    /// Returns the name of the layer for debugging and logging purposes.
    fn name(&self) -> &str;

    /// Returns a copy with forked parameters and an empty cache.
    fn snapshot(&self) -> Self
    where
        Self: Sized;
}

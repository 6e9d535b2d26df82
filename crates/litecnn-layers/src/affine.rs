//! Affine (fully connected) layer.
//!
//! This module provides the [`Affine`] layer, which performs the linear
//! transformation `y = xW + b`.

use litecnn_tensor::Tensor;

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::regularizer::Regularizer;

/// A fully connected layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[batch_size, in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
/// - `y` is the output tensor of shape `[batch_size, out_features]`
///
/// # Example
///
/// ```
/// use litecnn_layers::{Affine, Layer};
/// use litecnn_tensor::Tensor;
///
/// let layer = Affine::new(128, 64, 1e-2).unwrap();
/// let input = Tensor::zeros(&[32, 128]).unwrap();
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), vec![32, 64]);
/// ```
#[derive(Debug)]
pub struct Affine {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    /// Kernel regularizer
    kernel_regularizer: Regularizer,
    /// Gradient of weights
    weights_grad: Option<Tensor>,
    /// Gradient of bias
    bias_grad: Option<Tensor>,
    /// Cached input for backward pass
    cached_input: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Affine {
    /// Creates a layer with Gaussian weights of standard deviation
    /// `weight_scale` and a zero bias.
    pub fn new(in_features: usize, out_features: usize, weight_scale: f64) -> LayerResult<Self> {
        Self::new_with_initializer(
            in_features,
            out_features,
            Initializer::Gaussian(weight_scale),
            Initializer::Zeros,
        )
    }

    /// Creates a layer with custom initializers.
    pub fn new_with_initializer(
        in_features: usize,
        out_features: usize,
        weight_init: Initializer,
        bias_init: Initializer,
    ) -> LayerResult<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(LayerError::ConfigError {
                message: format!(
                    "Affine dimensions must be positive, got {}x{}",
                    in_features, out_features
                ),
            });
        }
        let weights = weight_init.initialize(&[in_features, out_features])?;
        let bias = bias_init.initialize(&[out_features])?;
        Self::from_weights(weights, bias)
    }

    /// Creates a layer from explicit weights `[in, out]` and bias `[out]`.
    ///
    /// The tensors are adopted as-is (not forked).
    pub fn from_weights(weights: Tensor, bias: Tensor) -> LayerResult<Self> {
        if weights.ndim() != 2 {
            return Err(LayerError::ConfigError {
                message: format!("Weights must be 2D, got {}D", weights.ndim()),
            });
        }
        if bias.ndim() != 1 {
            return Err(LayerError::ConfigError {
                message: format!("Bias must be 1D, got {}D", bias.ndim()),
            });
        }
        if weights.dim(1) != bias.dim(0) {
            return Err(LayerError::ShapeMismatch {
                expected: vec![weights.dim(1)],
                actual: bias.shape(),
            });
        }

        Ok(Self {
            in_features: weights.dim(0),
            out_features: weights.dim(1),
            weights,
            bias,
            kernel_regularizer: Regularizer::None,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
        })
    }

    /// Sets the kernel regularizer.
    pub fn with_kernel_regularizer(mut self, regularizer: Regularizer) -> Self {
        self.kernel_regularizer = regularizer;
        self
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a reference to the bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Returns the weight gradients if available.
    pub fn weights_grad(&self) -> Option<&Tensor> {
        self.weights_grad.as_ref()
    }

    /// Returns the bias gradients if available.
    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias_grad.as_ref()
    }

    /// Returns the kernel regularizer.
    pub fn kernel_regularizer(&self) -> Regularizer {
        self.kernel_regularizer
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        if input.ndim() != 2 || input.dim(1) != self.in_features {
            return Err(LayerError::ShapeMismatch {
                expected: vec![input.dim(0), self.in_features],
                actual: input.shape(),
            });
        }
        Ok(())
    }
}

impl Layer for Affine {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        Ok(input.dot(&self.weights)?.add(&self.bias)?)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let expected = vec![input.dim(0), self.out_features];
        if grad.shape() != expected {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape(),
            });
        }

        let mut weights_grad = input.t().dot(grad)?;
        if let Some(reg_grad) = self.kernel_regularizer.grad(&self.weights) {
            weights_grad.add_assign(&reg_grad)?;
        }
        let bias_grad = grad.sum_dim(0)?;
        let input_grad = grad.dot(&self.weights.t())?;

        self.weights_grad = Some(weights_grad);
        self.bias_grad = Some(bias_grad);
        Ok(input_grad)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn gradients(&self) -> Vec<&Tensor> {
        match (&self.weights_grad, &self.bias_grad) {
            (Some(w), Some(b)) => vec![w, b],
            _ => Vec::new(),
        }
    }

    fn regularization_loss(&self) -> f64 {
        self.kernel_regularizer.loss(&self.weights)
    }

    fn name(&self) -> &str {
        "Affine"
    }

    fn snapshot(&self) -> Self {
        Self {
            weights: self.weights.fork(),
            bias: self.bias.fork(),
            kernel_regularizer: self.kernel_regularizer,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features: self.in_features,
            out_features: self.out_features,
        }
    }
}

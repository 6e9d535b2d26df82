//! 2-D convolution layer.
//!
//! Inputs are `[N, C, H, W]`, weights `[F, C, filter_height, filter_width]`
//! and outputs `[N, F, H', W']` with
//! `H' = 1 + (H + 2 * padding - filter_height) / stride` (and likewise for
//! `W'`). Padding is implicit: positions outside the input read as zero.

use litecnn_tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::regularizer::Regularizer;

/// Shape configuration for [`Conv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvConfig {
    /// Filter extent along the height axis.
    pub filter_height: usize,
    /// Filter extent along the width axis.
    pub filter_width: usize,
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of filters (output channels).
    pub out_filters: usize,
    /// Step between filter applications.
    pub stride: usize,
    /// Implicit zero padding on every spatial border.
    pub padding: usize,
}

impl ConvConfig {
    /// Square filters with stride 1 and "same" padding `(size - 1) / 2`.
    pub fn same(filter_size: usize, in_channels: usize, out_filters: usize) -> Self {
        Self {
            filter_height: filter_size,
            filter_width: filter_size,
            in_channels,
            out_filters,
            stride: 1,
            padding: filter_size.saturating_sub(1) / 2,
        }
    }

    /// Checks that every extent except padding is positive.
    pub fn validate(&self) -> LayerResult<()> {
        if self.filter_height == 0
            || self.filter_width == 0
            || self.in_channels == 0
            || self.out_filters == 0
            || self.stride == 0
        {
            return Err(LayerError::ConfigError {
                message: format!("Conv extents must be positive, got {:?}", self),
            });
        }
        Ok(())
    }

    /// Returns the spatial output size for an `height x width` input, or
    /// `None` if the padded input is smaller than the filter.
    pub fn output_size(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let padded_h = height + 2 * self.padding;
        let padded_w = width + 2 * self.padding;
        if padded_h < self.filter_height || padded_w < self.filter_width {
            return None;
        }
        Some((
            1 + (padded_h - self.filter_height) / self.stride,
            1 + (padded_w - self.filter_width) / self.stride,
        ))
    }

    fn weight_shape(&self) -> [usize; 4] {
        [
            self.out_filters,
            self.in_channels,
            self.filter_height,
            self.filter_width,
        ]
    }
}

/// Input geometry resolved for one call.
#[derive(Debug, Clone, Copy)]
struct Dims {
    batch: usize,
    height: usize,
    width: usize,
    out_height: usize,
    out_width: usize,
}

/// Convolution layer (cross-correlation, as is customary).
#[derive(Debug)]
pub struct Conv {
    config: ConvConfig,
    weights: Tensor,
    bias: Tensor,
    kernel_regularizer: Regularizer,
    weights_grad: Option<Tensor>,
    bias_grad: Option<Tensor>,
    cached_input: Option<Tensor>,
}

impl Conv {
    /// Creates a layer with `weight_init` weights and a zero bias.
    pub fn new(config: ConvConfig, weight_init: Initializer) -> LayerResult<Self> {
        config.validate()?;
        let weights = weight_init.initialize(&config.weight_shape())?;
        let bias = Tensor::zeros(&[config.out_filters])?;
        Self::from_weights(config, weights, bias)
    }

    /// Creates a layer from explicit weights `[F, C, fh, fw]` and bias `[F]`.
    pub fn from_weights(config: ConvConfig, weights: Tensor, bias: Tensor) -> LayerResult<Self> {
        config.validate()?;
        let expected = config.weight_shape().to_vec();
        if weights.shape() != expected {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: weights.shape(),
            });
        }
        if bias.shape() != [config.out_filters] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![config.out_filters],
                actual: bias.shape(),
            });
        }
        Ok(Self {
            config,
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

    /// Returns the configuration.
    pub fn config(&self) -> &ConvConfig {
        &self.config
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

    fn dims(&self, input: &Tensor) -> LayerResult<Dims> {
        if input.ndim() != 4 || input.dim(1) != self.config.in_channels {
            return Err(LayerError::ShapeMismatch {
                expected: vec![
                    input.dim(0),
                    self.config.in_channels,
                    input.dim(2),
                    input.dim(3),
                ],
                actual: input.shape(),
            });
        }
        let (height, width) = (input.dim(2), input.dim(3));
        let (out_height, out_width) =
            self.config
                .output_size(height, width)
                .ok_or_else(|| LayerError::ForwardError {
                    message: format!(
                        "input {}x{} with padding {} is smaller than the {}x{} filter",
                        height,
                        width,
                        self.config.padding,
                        self.config.filter_height,
                        self.config.filter_width
                    ),
                })?;
        Ok(Dims {
            batch: input.dim(0),
            height,
            width,
            out_height,
            out_width,
        })
    }

    /// Visits every (output position, filter tap, input position) triple that
    /// lands inside the unpadded input.
    ///
    /// The callback receives `(i2, i3, j2, j3, k2, k3)`: output row/column,
    /// filter row/column and input row/column.
    fn for_each_tap(&self, dims: &Dims, mut f: impl FnMut(usize, usize, usize, usize, usize, usize)) {
        let stride = self.config.stride as isize;
        let padding = self.config.padding as isize;
        for i2 in 0..dims.out_height {
            for j2 in 0..self.config.filter_height {
                let k2 = i2 as isize * stride - padding + j2 as isize;
                if k2 < 0 || k2 >= dims.height as isize {
                    continue;
                }
                for i3 in 0..dims.out_width {
                    for j3 in 0..self.config.filter_width {
                        let k3 = i3 as isize * stride - padding + j3 as isize;
                        if k3 < 0 || k3 >= dims.width as isize {
                            continue;
                        }
                        f(i2, i3, j2, j3, k2 as usize, k3 as usize);
                    }
                }
            }
        }
    }

    fn convolve(&self, input: &Tensor) -> LayerResult<Tensor> {
        let dims = self.dims(input)?;
        let ConvConfig {
            filter_height: fh,
            filter_width: fw,
            in_channels: channels,
            out_filters: filters,
            ..
        } = self.config;
        let (h, w, oh, ow) = (dims.height, dims.width, dims.out_height, dims.out_width);

        let x = input.to_vec();
        let weights = self.weights.to_vec();
        let bias = self.bias.to_vec();

        let mut out = vec![0.0; dims.batch * filters * oh * ow];
        for n in 0..dims.batch {
            for f in 0..filters {
                let base = (n * filters + f) * oh * ow;
                out[base..base + oh * ow].fill(bias[f]);
            }
        }

        self.for_each_tap(&dims, |i2, i3, j2, j3, k2, k3| {
            for n in 0..dims.batch {
                for f in 0..filters {
                    let mut acc = 0.0;
                    for c in 0..channels {
                        acc += weights[((f * channels + c) * fh + j2) * fw + j3]
                            * x[((n * channels + c) * h + k2) * w + k3];
                    }
                    out[((n * filters + f) * oh + i2) * ow + i3] += acc;
                }
            }
        });

        Ok(Tensor::from_vec(&[dims.batch, filters, oh, ow], out)?)
    }
}

impl Layer for Conv {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.convolve(input)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.convolve(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let dims = self.dims(input)?;
        let ConvConfig {
            filter_height: fh,
            filter_width: fw,
            in_channels: channels,
            out_filters: filters,
            ..
        } = self.config;
        let (h, w, oh, ow) = (dims.height, dims.width, dims.out_height, dims.out_width);

        let expected = vec![dims.batch, filters, oh, ow];
        if grad.shape() != expected {
            return Err(LayerError::ShapeMismatch {
                expected,
                actual: grad.shape(),
            });
        }

        let x = input.to_vec();
        let weights = self.weights.to_vec();
        let dout = grad.to_vec();

        let mut bias_grad = vec![0.0; filters];
        for n in 0..dims.batch {
            for (f, db) in bias_grad.iter_mut().enumerate() {
                let base = (n * filters + f) * oh * ow;
                *db += dout[base..base + oh * ow].iter().sum::<f64>();
            }
        }

        let mut weights_grad = vec![0.0; weights.len()];
        let mut input_grad = vec![0.0; x.len()];
        self.for_each_tap(&dims, |i2, i3, j2, j3, k2, k3| {
            for n in 0..dims.batch {
                for f in 0..filters {
                    let dv = dout[((n * filters + f) * oh + i2) * ow + i3];
                    for c in 0..channels {
                        let wi = ((f * channels + c) * fh + j2) * fw + j3;
                        let xi = ((n * channels + c) * h + k2) * w + k3;
                        weights_grad[wi] += dv * x[xi];
                        input_grad[xi] += dv * weights[wi];
                    }
                }
            }
        });

        let mut weights_grad = Tensor::from_vec(&self.config.weight_shape(), weights_grad)?;
        if let Some(reg_grad) = self.kernel_regularizer.grad(&self.weights) {
            weights_grad.add_assign(&reg_grad)?;
        }
        self.weights_grad = Some(weights_grad);
        self.bias_grad = Some(Tensor::from_vec(&[filters], bias_grad)?);
        Ok(Tensor::from_vec(&input.shape(), input_grad)?)
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
        "Conv"
    }

    fn snapshot(&self) -> Self {
        Self {
            config: self.config,
            weights: self.weights.fork(),
            bias: self.bias.fork(),
            kernel_regularizer: self.kernel_regularizer,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
        }
    }
}

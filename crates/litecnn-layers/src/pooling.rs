//! Max pooling over the two trailing axes.
//!
//! The layer works on the transposed view of its input, so for an input of
//! shape `[N, C, H, W]` the pooled axes are `W` (window `pool_width`) and `H`
//! (window `pool_height`). Windows start every `stride` positions and are
//! clipped at the boundary, so each pooled axis shrinks to
//! `ceil(size / stride)`.

use litecnn_tensor::{Tensor, MAX_DIMS};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;

/// Window configuration for [`MaxPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPoolConfig {
    /// Window extent along the height axis.
    pub pool_height: usize,
    /// Window extent along the width axis.
    pub pool_width: usize,
    /// Step between consecutive windows on both axes.
    pub stride: usize,
}

impl Default for MaxPoolConfig {
    fn default() -> Self {
        Self {
            pool_height: 2,
            pool_width: 2,
            stride: 2,
        }
    }
}

impl MaxPoolConfig {
    /// Checks that every extent is positive.
    pub fn validate(&self) -> LayerResult<()> {
        if self.pool_height == 0 || self.pool_width == 0 || self.stride == 0 {
            return Err(LayerError::ConfigError {
                message: format!("MaxPool extents must be positive, got {:?}", self),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    input: [usize; MAX_DIMS],
    output: [usize; MAX_DIMS],
}

impl Geometry {
    fn input_index(&self, i: [usize; MAX_DIMS]) -> usize {
        ((i[0] * self.input[1] + i[1]) * self.input[2] + i[2]) * self.input[3] + i[3]
    }

    fn output_index(&self, i: [usize; MAX_DIMS]) -> usize {
        ((i[0] * self.output[1] + i[1]) * self.output[2] + i[2]) * self.output[3] + i[3]
    }
}

#[derive(Debug)]
struct PoolCache {
    input_t: Vec<f64>,
    input_t_shape: Vec<usize>,
    maxima: Vec<f64>,
    output_shape: Vec<usize>,
    geometry: Geometry,
}

/// Max pooling layer.
///
/// # Example
///
/// ```
/// use litecnn_layers::{Layer, MaxPool, MaxPoolConfig};
/// use litecnn_tensor::Tensor;
///
/// let pool = MaxPool::new(MaxPoolConfig::default()).unwrap();
/// let x = Tensor::from_vec(&[3, 3], (1..=9).map(|v| v as f64).collect()).unwrap();
/// let y = pool.forward(&x).unwrap();
/// assert_eq!(y.to_vec(), vec![5.0, 6.0, 8.0, 9.0]);
/// ```
#[derive(Debug)]
pub struct MaxPool {
    config: MaxPoolConfig,
    cache: Option<PoolCache>,
}

impl MaxPool {
    /// Creates a pooling layer, rejecting non-positive extents.
    pub fn new(config: MaxPoolConfig) -> LayerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: None,
        })
    }

    /// Returns the window configuration.
    pub fn config(&self) -> &MaxPoolConfig {
        &self.config
    }

    /// Returns the pooled size of an axis of length `size`.
    pub fn output_size(&self, size: usize) -> usize {
        (size + self.config.stride - 1) / self.config.stride
    }

    fn window(&self, start: usize, extent: usize, limit: usize) -> std::ops::Range<usize> {
        let begin = start * self.config.stride;
        begin..(begin + extent).min(limit)
    }

    fn pool(&self, input: &Tensor) -> LayerResult<(Tensor, PoolCache)> {
        if input.ndim() < 2 {
            return Err(LayerError::ForwardError {
                message: format!(
                    "MaxPool needs an input of rank 2 or more, got shape {:?}",
                    input.shape()
                ),
            });
        }

        let input_t = input.t();
        let mut dims = [1; MAX_DIMS];
        for (axis, d) in dims.iter_mut().enumerate() {
            *d = input_t.dim(axis);
        }
        let mut out_dims = dims;
        out_dims[0] = self.output_size(dims[0]);
        out_dims[1] = self.output_size(dims[1]);
        let geometry = Geometry {
            input: dims,
            output: out_dims,
        };

        let values = input_t.to_vec();
        let mut maxima = vec![f64::NEG_INFINITY; out_dims.iter().product()];
        for i0 in 0..out_dims[0] {
            for i1 in 0..out_dims[1] {
                for i2 in 0..out_dims[2] {
                    for i3 in 0..out_dims[3] {
                        let mut best = f64::NEG_INFINITY;
                        for ii in self.window(i0, self.config.pool_width, dims[0]) {
                            for jj in self.window(i1, self.config.pool_height, dims[1]) {
                                best = best.max(values[geometry.input_index([ii, jj, i2, i3])]);
                            }
                        }
                        if !best.is_finite() {
                            return Err(LayerError::ForwardError {
                                message: format!(
                                    "MaxPool window at {:?} has no finite maximum",
                                    [i0, i1, i2, i3]
                                ),
                            });
                        }
                        maxima[geometry.output_index([i0, i1, i2, i3])] = best;
                    }
                }
            }
        }

        let input_t_shape = input_t.shape();
        let mut output_t_shape = input_t_shape.clone();
        output_t_shape[0] = out_dims[0];
        output_t_shape[1] = out_dims[1];
        let output = Tensor::from_vec(&output_t_shape, maxima.clone())?
            .t()
            .contiguous();

        let cache = PoolCache {
            input_t: values,
            input_t_shape,
            maxima,
            output_shape: output.shape(),
            geometry,
        };
        Ok((output, cache))
    }
}

impl Layer for MaxPool {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.pool(input).map(|(output, _)| output)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let (output, cache) = self.pool(input)?;
        self.cache = Some(cache);
        Ok(output)
    }

    /// Routes each upstream value to every position of its window that holds
    /// the window maximum; tied positions each receive the full value.
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let cache = self.cache.as_ref().ok_or(LayerError::NotInitialized)?;
        if grad.shape() != cache.output_shape {
            return Err(LayerError::ShapeMismatch {
                expected: cache.output_shape.clone(),
                actual: grad.shape(),
            });
        }

        let geometry = cache.geometry;
        let (dims, out_dims) = (geometry.input, geometry.output);
        let grad_t = grad.t().to_vec();
        let mut input_grad_t = vec![0.0; cache.input_t.len()];
        for i0 in 0..out_dims[0] {
            for i1 in 0..out_dims[1] {
                for i2 in 0..out_dims[2] {
                    for i3 in 0..out_dims[3] {
                        let out = geometry.output_index([i0, i1, i2, i3]);
                        for ii in self.window(i0, self.config.pool_width, dims[0]) {
                            for jj in self.window(i1, self.config.pool_height, dims[1]) {
                                let at = geometry.input_index([ii, jj, i2, i3]);
                                if cache.input_t[at] == cache.maxima[out] {
                                    input_grad_t[at] += grad_t[out];
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(Tensor::from_vec(&cache.input_t_shape, input_grad_t)?
            .t()
            .contiguous())
    }

    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "MaxPool"
    }

    fn snapshot(&self) -> Self {
        Self {
            config: self.config,
            cache: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> MaxPool {
        MaxPool::new(MaxPoolConfig::default()).unwrap()
    }

    fn seq(shape: &[usize]) -> Tensor {
        let n: usize = shape.iter().product();
        Tensor::from_vec(shape, (1..=n).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn test_maxpool_3x3() {
        let mut pool = pool();
        let x = seq(&[3, 3]);
        let y = pool.forward_train(&x).unwrap();
        assert_eq!(y.shape(), vec![2, 2]);
        assert_eq!(y.to_vec(), vec![5.0, 6.0, 8.0, 9.0]);

        let dx = pool.backward(&y).unwrap();
        assert_eq!(dx.shape(), vec![3, 3]);
        assert_eq!(
            dx.to_vec(),
            vec![0.0, 0.0, 0.0, 0.0, 5.0, 6.0, 0.0, 8.0, 9.0]
        );
    }

    #[test]
    fn test_maxpool_3d() {
        let mut pool = pool();
        let data: Vec<f64> = (1..=9).chain(1..=9).map(|v| v as f64).collect();
        let x = Tensor::from_vec(&[2, 3, 3], data).unwrap();
        let y = pool.forward_train(&x).unwrap();
        assert_eq!(y.shape(), vec![2, 2, 2]);
        assert_eq!(y.to_vec(), vec![5.0, 6.0, 8.0, 9.0, 5.0, 6.0, 8.0, 9.0]);
        assert!(y.is_contiguous());

        let dx = pool.backward(&y).unwrap();
        let expected: Vec<f64> = [0.0, 0.0, 0.0, 0.0, 5.0, 6.0, 0.0, 8.0, 9.0].repeat(2);
        assert_eq!(dx.to_vec(), expected);
    }

    #[test]
    fn test_maxpool_ties_receive_full_gradient() {
        let mut pool = pool();
        let x = Tensor::from_vec(&[2, 2], vec![1.0; 4]).unwrap();
        pool.forward_train(&x).unwrap();
        let dout = Tensor::from_vec(&[1, 1], vec![3.0]).unwrap();
        let dx = pool.backward(&dout).unwrap();
        assert_eq!(dx.to_vec(), vec![3.0; 4]);
    }

    #[test]
    fn test_maxpool_4d_output_shape() {
        let pool = pool();
        let x = seq(&[2, 3, 5, 4]);
        let y = pool.forward(&x).unwrap();
        assert_eq!(y.shape(), vec![2, 3, 3, 2]);
        // bottom-right window of the first channel is clipped to one row
        assert_eq!(y.at(&[0, 0, 2, 1]).unwrap(), 20.0);
        assert!(y.reshape(&[2, -1]).is_ok());
    }

    #[test]
    fn test_maxpool_non_square_window() {
        let config = MaxPoolConfig {
            pool_height: 1,
            pool_width: 3,
            stride: 3,
        };
        let pool = MaxPool::new(config).unwrap();
        let x = seq(&[2, 3]);
        let y = pool.forward(&x).unwrap();
        assert_eq!(y.shape(), vec![1, 1]);
        assert_eq!(y.to_vec(), vec![3.0]);
    }

    #[test]
    fn test_maxpool_errors() {
        assert!(matches!(
            MaxPool::new(MaxPoolConfig {
                pool_height: 0,
                pool_width: 2,
                stride: 2
            }),
            Err(LayerError::ConfigError { .. })
        ));

        let mut pool = pool();
        assert!(pool.forward(&seq(&[4])).is_err());
        assert!(matches!(
            pool.backward(&seq(&[2, 2])),
            Err(LayerError::NotInitialized)
        ));

        let x = Tensor::from_vec(&[2, 2], vec![f64::NEG_INFINITY; 4]).unwrap();
        assert!(matches!(
            pool.forward(&x),
            Err(LayerError::ForwardError { .. })
        ));

        pool.forward_train(&seq(&[3, 3])).unwrap();
        assert!(matches!(
            pool.backward(&seq(&[3, 3])),
            Err(LayerError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_config_serde() {
        let config = MaxPoolConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MaxPoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}

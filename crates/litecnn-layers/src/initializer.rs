//! Weight initialization.

use litecnn_tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::LayerResult;

/// How a parameter tensor is filled at construction time.
///
/// Random initializers draw from the fixed default seed of the tensor engine,
/// so two networks built from the same configuration start identical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Zero-mean normal samples with the given standard deviation.
    Gaussian(f64),
    /// Uniform samples in `[-bound, bound]`.
    Uniform(f64),
    /// All zeros.
    #[default]
    Zeros,
}

impl Initializer {
    /// Creates a tensor of `shape` filled according to this initializer.
    pub fn initialize(&self, shape: &[usize]) -> LayerResult<Tensor> {
        let mut tensor = Tensor::zeros(shape)?;
        match *self {
            Initializer::Gaussian(scale) => tensor.gaussian(scale)?,
            Initializer::Uniform(bound) => tensor.uniform(bound)?,
            Initializer::Zeros => {}
        }
        Ok(tensor)
    }
}

//! Regularization for learnable parameters.

use litecnn_tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Regularizer types supported for layer weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub enum Regularizer {
    /// No regularization.
    #[default]
    None,
    /// L2 regularization: loss `0.5 * lambda * sum(w^2)`, gradient `lambda * w`.
    L2(f64),
}

impl Regularizer {
    /// Builds an L2 regularizer, or `None` when `lambda` is zero.
    pub fn l2(lambda: f64) -> Self {
        if lambda == 0.0 {
            Regularizer::None
        } else {
            Regularizer::L2(lambda)
        }
    }

    /// Returns the regularization loss for the given parameter tensor.
    pub fn loss(&self, param: &Tensor) -> f64 {
        match *self {
            Regularizer::None => 0.0,
            Regularizer::L2(lambda) => 0.5 * lambda * param.map(|v| v * v).sum(),
        }
    }

    /// Returns the gradient contribution of this regularizer for the given parameter.
    pub fn grad(&self, param: &Tensor) -> Option<Tensor> {
        match *self {
            Regularizer::None => None,
            Regularizer::L2(lambda) => Some(param.mul_scalar(lambda)),
        }
    }
}

//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! SGD updates parameters by subtracting the gradient scaled by the
//! learning rate. It keeps no per-parameter state.

use litecnn_tensor::Tensor;

use crate::{check_same_shape, Optimizer, OptimizerConfig, OptimizerError, OptimizerResult, Slots};

/// Stochastic Gradient Descent optimizer.
///
/// Updates parameters using the formula:
/// `w = w - learning_rate * g`
#[derive(Debug, Clone)]
pub struct Sgd {
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates an SGD optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] for any other variant.
    pub fn new(config: OptimizerConfig) -> OptimizerResult<Self> {
        match config {
            OptimizerConfig::Sgd => Ok(Self { config }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }
}

impl Default for Sgd {
    fn default() -> Self {
        Self {
            config: OptimizerConfig::Sgd,
        }
    }
}

impl Optimizer for Sgd {
    fn apply(
        &self,
        param: &mut Tensor,
        grad: &Tensor,
        _slots: &mut Slots,
        learning_rate: f64,
    ) -> OptimizerResult<()> {
        check_same_shape(param, grad)?;
        param.zip_with_assign(grad, |w, g| w - learning_rate * g)?;
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

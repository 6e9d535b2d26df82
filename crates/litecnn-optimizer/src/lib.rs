//! Parameter update rules for litecnn.
//!
//! This crate provides the optimizers that turn the gradients of a training
//! step into in-place parameter updates. Each optimizer implements the
//! [`Optimizer`] trait and keeps no state of its own: per-parameter state
//! (the squared-gradient accumulator `n` and the FTRL linear term `z`) lives in
//! a [`Slots`] value owned next to the parameter, so one optimizer can be
//! shared by every layer and every training thread.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adagrad`] - Adaptive Gradient Algorithm
//! - [`Ftrl`] - Follow The Regularized Leader (proximal)
//!
//! # Example
//!
//! ```
//! use litecnn_optimizer::{create_optimizer, OptimizerConfig, Slots};
//! use litecnn_tensor::Tensor;
//!
//! let optimizer = create_optimizer(OptimizerConfig::Sgd).unwrap();
//! let mut param = Tensor::from_vec(&[3], vec![1.0, 2.0, 3.0]).unwrap();
//! let grad = Tensor::from_vec(&[3], vec![0.1, 0.2, 0.3]).unwrap();
//! let mut slots = Slots::new();
//!
//! optimizer.apply(&mut param, &grad, &mut slots, 1.0).unwrap();
//! assert!((param.at(&[0]).unwrap() - 0.9).abs() < 1e-12);
//! ```

#![warn(missing_docs)]

use litecnn_tensor::{Tensor, TensorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adagrad;
mod ftrl;
mod sgd;
mod slots;

pub use adagrad::Adagrad;
pub use ftrl::Ftrl;
pub use sgd::Sgd;
pub use slots::{Slots, UpdateTarget};

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer being constructed.
        expected: String,
        /// Variant that was supplied.
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Parameter, gradient and slot tensors disagree.
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),
}

/// Result type alias for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// Configuration for the supported update rules.
///
/// The learning rate is not part of the configuration: it is supplied with
/// every step so a training run can change it without rebuilding the
/// optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OptimizerConfig {
    /// Plain gradient descent.
    Sgd,

    /// Adagrad configuration.
    Adagrad {
        /// Small constant added to the root accumulator.
        epsilon: f64,
    },

    /// FTRL-proximal configuration.
    Ftrl {
        /// Per-coordinate learning-rate scale.
        alpha: f64,
        /// Smoothing term added to the root accumulator.
        beta: f64,
        /// L1 regularization strength.
        lambda1: f64,
        /// L2 regularization strength.
        lambda2: f64,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Ftrl {
            alpha: 5.0,
            beta: 0.001,
            lambda1: 0.0,
            lambda2: 0.0,
        }
    }
}

impl OptimizerConfig {
    /// Adagrad with `epsilon = 1e-8`.
    pub fn adagrad() -> Self {
        OptimizerConfig::Adagrad { epsilon: 1e-8 }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd => "Sgd",
            OptimizerConfig::Adagrad { .. } => "Adagrad",
            OptimizerConfig::Ftrl { .. } => "Ftrl",
        }
    }

    /// Returns whether the rule reads the per-step learning rate.
    pub fn uses_learning_rate(&self) -> bool {
        !matches!(self, OptimizerConfig::Ftrl { .. })
    }

    /// Checks the constants of the selected rule.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::InvalidParameter`] for a non-positive
    /// `epsilon` or `alpha`, or a negative (or non-finite) `beta`, `lambda1`
    /// or `lambda2`.
    pub fn validate(&self) -> OptimizerResult<()> {
        match *self {
            OptimizerConfig::Sgd => Ok(()),
            OptimizerConfig::Adagrad { epsilon } => positive("epsilon", epsilon),
            OptimizerConfig::Ftrl {
                alpha,
                beta,
                lambda1,
                lambda2,
            } => {
                positive("alpha", alpha)?;
                non_negative("beta", beta)?;
                non_negative("lambda1", lambda1)?;
                non_negative("lambda2", lambda2)
            }
        }
    }
}

fn positive(name: &str, value: f64) -> OptimizerResult<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(OptimizerError::InvalidParameter(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn non_negative(name: &str, value: f64) -> OptimizerResult<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(OptimizerError::InvalidParameter(format!(
            "{} must be non-negative, got {}",
            name, value
        )))
    }
}

/// An update rule applied to one parameter tensor at a time.
///
/// Implementations are stateless and shareable across threads; all
/// per-parameter state is carried by the [`Slots`] passed to
/// [`Optimizer::apply`].
pub trait Optimizer: Send + Sync + std::fmt::Debug {
    /// Updates `param` in place from `grad`, reading and updating `slots`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::Tensor`] if `param`, `grad` and any existing
    /// slot tensor do not share one shape.
    fn apply(
        &self,
        param: &mut Tensor,
        grad: &Tensor,
        slots: &mut Slots,
        learning_rate: f64,
    ) -> OptimizerResult<()>;

    /// Applies [`Optimizer::apply`] to every target in order, stopping at the
    /// first error.
    fn apply_all(&self, targets: Vec<UpdateTarget<'_>>, learning_rate: f64) -> OptimizerResult<()> {
        for target in targets {
            self.apply(target.param, target.grad, target.slots, learning_rate)?;
        }
        Ok(())
    }

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
}

/// Creates an optimizer from the given configuration.
///
/// # Errors
///
/// Returns [`OptimizerError::InvalidParameter`] if the configuration does not
/// validate.
///
/// # Example
///
/// ```
/// use litecnn_optimizer::{create_optimizer, OptimizerConfig};
///
/// let optimizer = create_optimizer(OptimizerConfig::adagrad()).unwrap();
/// assert_eq!(optimizer.config().name(), "Adagrad");
/// ```
pub fn create_optimizer(config: OptimizerConfig) -> OptimizerResult<Box<dyn Optimizer>> {
    Ok(match config {
        OptimizerConfig::Sgd => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adagrad { .. } => Box::new(Adagrad::new(config)?),
        OptimizerConfig::Ftrl { .. } => Box::new(Ftrl::new(config)?),
    })
}

/// Fails unless `param` and `grad` have the same shape.
pub(crate) fn check_same_shape(param: &Tensor, grad: &Tensor) -> OptimizerResult<()> {
    if param.shape() != grad.shape() {
        return Err(TensorError::ShapeMismatch {
            expected: param.shape(),
            got: grad.shape(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        assert_eq!(OptimizerConfig::Sgd.name(), "Sgd");
        assert_eq!(OptimizerConfig::adagrad().name(), "Adagrad");
        assert_eq!(OptimizerConfig::default().name(), "Ftrl");
        assert!(!OptimizerConfig::default().uses_learning_rate());
    }

    #[test]
    fn test_validate() {
        assert!(OptimizerConfig::default().validate().is_ok());
        assert!(OptimizerConfig::Adagrad { epsilon: 0.0 }.validate().is_err());
        let bad = OptimizerConfig::Ftrl {
            alpha: 0.0,
            beta: 0.001,
            lambda1: 0.0,
            lambda2: 0.0,
        };
        assert!(matches!(
            bad.validate(),
            Err(OptimizerError::InvalidParameter(_))
        ));
        let bad = OptimizerConfig::Ftrl {
            alpha: 1.0,
            beta: 0.0,
            lambda1: -1.0,
            lambda2: 0.0,
        };
        assert!(bad.validate().is_err());
        assert!(create_optimizer(bad).is_err());
    }

    #[test]
    fn test_create_all_optimizer_types() {
        let configs = [
            OptimizerConfig::Sgd,
            OptimizerConfig::adagrad(),
            OptimizerConfig::default(),
        ];
        for config in configs {
            let optimizer = create_optimizer(config).unwrap();
            assert_eq!(optimizer.config(), &config);

            let mut param = Tensor::from_vec(&[2], vec![1.0, 2.0]).unwrap();
            let grad = Tensor::from_vec(&[2], vec![1.0, 1.0]).unwrap();
            let mut slots = Slots::new();
            optimizer.apply(&mut param, &grad, &mut slots, 0.1).unwrap();
            assert!(param.at(&[0]).unwrap() < 1.0);
            assert!(param.at(&[1]).unwrap() < 2.0);
        }
    }

    #[test]
    fn test_apply_all() {
        let optimizer = create_optimizer(OptimizerConfig::Sgd).unwrap();
        let mut w = Tensor::from_vec(&[2, 2], vec![1.0; 4]).unwrap();
        let mut b = Tensor::from_vec(&[2], vec![0.0; 2]).unwrap();
        let gw = Tensor::from_vec(&[2, 2], vec![1.0; 4]).unwrap();
        let gb = Tensor::from_vec(&[2], vec![-1.0; 2]).unwrap();
        let (mut sw, mut sb) = (Slots::new(), Slots::new());

        let targets = vec![
            UpdateTarget::new(&mut w, &mut sw, &gw),
            UpdateTarget::new(&mut b, &mut sb, &gb),
        ];
        optimizer.apply_all(targets, 0.5).unwrap();
        assert_eq!(w.to_vec(), vec![0.5; 4]);
        assert_eq!(b.to_vec(), vec![0.5; 2]);
    }

    #[test]
    fn test_config_serde() {
        let config = OptimizerConfig::Ftrl {
            alpha: 0.5,
            beta: 1.0,
            lambda1: 0.1,
            lambda2: 0.2,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: OptimizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);

        let sgd: OptimizerConfig = serde_json::from_str("\"Sgd\"").unwrap();
        assert_eq!(sgd, OptimizerConfig::Sgd);
    }
}

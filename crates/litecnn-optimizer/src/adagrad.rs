//! Adagrad (Adaptive Gradient) optimizer.
//!
//! Adagrad scales the step of every coordinate by the inverse root of the
//! squared gradients seen so far, so frequently updated coordinates take
//! smaller steps.

use litecnn_tensor::Tensor;

use crate::{check_same_shape, Optimizer, OptimizerConfig, OptimizerError, OptimizerResult, Slots};

/// Adagrad optimizer.
///
/// Per element:
/// ```text
/// n = n + g^2
/// w = w - learning_rate * g / (sqrt(n) + epsilon)
/// ```
#[derive(Debug, Clone)]
pub struct Adagrad {
    epsilon: f64,
    config: OptimizerConfig,
}

impl Adagrad {
    /// Creates an Adagrad optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] for any other variant and
    /// [`OptimizerError::InvalidParameter`] for a non-positive `epsilon`.
    pub fn new(config: OptimizerConfig) -> OptimizerResult<Self> {
        match config {
            OptimizerConfig::Adagrad { epsilon } => {
                config.validate()?;
                Ok(Self { epsilon, config })
            }
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adagrad".to_string(),
                got: config.name().to_string(),
            }),
        }
    }
}

impl Optimizer for Adagrad {
    fn apply(
        &self,
        param: &mut Tensor,
        grad: &Tensor,
        slots: &mut Slots,
        learning_rate: f64,
    ) -> OptimizerResult<()> {
        check_same_shape(param, grad)?;
        let n = slots.accumulator_for(grad)?;
        n.zip_with_assign(grad, |n, g| n + g * g)?;

        let g = grad.to_vec();
        let n = n.to_vec();
        let w: Vec<f64> = param
            .to_vec()
            .iter()
            .zip(g.iter().zip(&n))
            .map(|(&w, (&g, &n))| w - learning_rate * g / (n.sqrt() + self.epsilon))
            .collect();
        param.copy_from_slice(&w)?;
        Ok(())
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adagrad_basic_update() {
        let adagrad = Adagrad::new(OptimizerConfig::Adagrad { epsilon: 1e-8 }).unwrap();
        let mut param = Tensor::from_vec(&[2], vec![1.0, 1.0]).unwrap();
        let grad = Tensor::from_vec(&[2], vec![0.5, -2.0]).unwrap();
        let mut slots = Slots::new();

        adagrad.apply(&mut param, &grad, &mut slots, 0.1).unwrap();

        // the first step moves every coordinate by about the learning rate
        let w = param.to_vec();
        assert!((w[0] - 0.9).abs() < 1e-6);
        assert!((w[1] - 1.1).abs() < 1e-6);
        assert_eq!(slots.accumulator().unwrap().to_vec(), vec![0.25, 4.0]);
    }

    #[test]
    fn test_adagrad_accumulates() {
        let adagrad = Adagrad::new(OptimizerConfig::adagrad()).unwrap();
        let mut param = Tensor::from_vec(&[1], vec![0.0]).unwrap();
        let grad = Tensor::from_vec(&[1], vec![1.0]).unwrap();
        let mut slots = Slots::new();

        adagrad.apply(&mut param, &grad, &mut slots, 1.0).unwrap();
        let first = param.at(&[0]).unwrap();
        adagrad.apply(&mut param, &grad, &mut slots, 1.0).unwrap();
        let second = param.at(&[0]).unwrap() - first;

        assert!((first + 1.0).abs() < 1e-6);
        assert!((second + 1.0 / 2f64.sqrt()).abs() < 1e-6);
        assert_eq!(slots.accumulator().unwrap().to_vec(), vec![2.0]);
    }

    #[test]
    fn test_adagrad_zero_gradient_is_finite() {
        let adagrad = Adagrad::new(OptimizerConfig::adagrad()).unwrap();
        let mut param = Tensor::from_vec(&[2], vec![3.0, 4.0]).unwrap();
        let grad = Tensor::zeros(&[2]).unwrap();
        adagrad
            .apply(&mut param, &grad, &mut Slots::new(), 0.1)
            .unwrap();
        assert_eq!(param.to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_adagrad_config_mismatch() {
        assert!(matches!(
            Adagrad::new(OptimizerConfig::Sgd),
            Err(OptimizerError::ConfigMismatch { .. })
        ));
        assert!(matches!(
            Adagrad::new(OptimizerConfig::Adagrad { epsilon: -1.0 }),
            Err(OptimizerError::InvalidParameter(_))
        ));
    }
}

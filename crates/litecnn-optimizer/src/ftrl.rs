//! FTRL-Proximal (Follow The Regularized Leader) optimizer.
//!
//! FTRL keeps a linear term `z` and a squared-gradient accumulator `n` per
//! coordinate and recomputes the weight from them in closed form on every
//! step. With `lambda1 > 0` coordinates whose `|z|` stays below the threshold
//! are pinned to exactly zero. The per-step learning rate is not used;
//! `alpha` plays that role.
//!
//! Reference: McMahan et al., "Ad Click Prediction: a View from the Trenches"

use litecnn_tensor::Tensor;

use crate::{check_same_shape, Optimizer, OptimizerConfig, OptimizerError, OptimizerResult, Slots};

/// FTRL-Proximal optimizer.
///
/// Per element, with `g` the gradient:
/// ```text
/// sigma = (sqrt(n + g^2) - sqrt(n)) / alpha
/// z = z + g - sigma * w
/// n = n + g^2
/// w = 0                                                    if |z| <= lambda1
/// w = -(z - sign(z) * lambda1) / ((beta + sqrt(n)) / alpha + lambda2)   otherwise
/// ```
#[derive(Debug, Clone)]
pub struct Ftrl {
    alpha: f64,
    beta: f64,
    lambda1: f64,
    lambda2: f64,
    config: OptimizerConfig,
}

impl Ftrl {
    /// Creates an FTRL optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] for any other variant and
    /// [`OptimizerError::InvalidParameter`] if the constants do not validate.
    pub fn new(config: OptimizerConfig) -> OptimizerResult<Self> {
        match config {
            OptimizerConfig::Ftrl {
                alpha,
                beta,
                lambda1,
                lambda2,
            } => {
                config.validate()?;
                Ok(Self {
                    alpha,
                    beta,
                    lambda1,
                    lambda2,
                    config,
                })
            }
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Ftrl".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn step(&self, w: f64, g: f64, n: &mut f64, z: &mut f64) -> f64 {
        let n_new = *n + g * g;
        let sigma = (n_new.sqrt() - n.sqrt()) / self.alpha;
        *z += g - sigma * w;
        *n = n_new;

        if z.abs() <= self.lambda1 {
            0.0
        } else {
            -(*z - z.signum() * self.lambda1)
                / ((self.beta + n.sqrt()) / self.alpha + self.lambda2)
        }
    }
}

impl Optimizer for Ftrl {
    fn apply(
        &self,
        param: &mut Tensor,
        grad: &Tensor,
        slots: &mut Slots,
        _learning_rate: f64,
    ) -> OptimizerResult<()> {
        check_same_shape(param, grad)?;
        let (n, z) = slots.both_for(grad)?;

        let g = grad.to_vec();
        let mut w = param.to_vec();
        let mut nv = n.to_vec();
        let mut zv = z.to_vec();
        for i in 0..w.len() {
            w[i] = self.step(w[i], g[i], &mut nv[i], &mut zv[i]);
        }

        n.copy_from_slice(&nv)?;
        z.copy_from_slice(&zv)?;
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

    fn ftrl(alpha: f64, beta: f64, lambda1: f64, lambda2: f64) -> Ftrl {
        Ftrl::new(OptimizerConfig::Ftrl {
            alpha,
            beta,
            lambda1,
            lambda2,
        })
        .unwrap()
    }

    #[test]
    fn test_ftrl_basic_update() {
        let opt = ftrl(0.5, 1.0, 0.0, 0.0);
        let mut param = Tensor::zeros(&[1]).unwrap();
        let grad = Tensor::from_vec(&[1], vec![1.0]).unwrap();
        let mut slots = Slots::new();

        opt.apply(&mut param, &grad, &mut slots, 123.0).unwrap();

        // z = 1, n = 1, w = -1 / ((1 + 1) / 0.5) = -0.25
        assert!((param.at(&[0]).unwrap() + 0.25).abs() < 1e-12);
        assert_eq!(slots.accumulator().unwrap().to_vec(), vec![1.0]);
        assert_eq!(slots.linear().unwrap().to_vec(), vec![1.0]);
    }

    #[test]
    fn test_ftrl_second_step() {
        let opt = ftrl(0.5, 1.0, 0.0, 0.0);
        let mut param = Tensor::zeros(&[1]).unwrap();
        let grad = Tensor::from_vec(&[1], vec![1.0]).unwrap();
        let mut slots = Slots::new();

        opt.apply(&mut param, &grad, &mut slots, 0.0).unwrap();
        opt.apply(&mut param, &grad, &mut slots, 0.0).unwrap();

        let n: f64 = 2.0;
        let sigma = (n.sqrt() - 1.0) / 0.5;
        let z = 1.0 + 1.0 - sigma * -0.25;
        let expected = -z / ((1.0 + n.sqrt()) / 0.5);
        assert!((param.at(&[0]).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_ftrl_sparsity_with_l1() {
        let opt = ftrl(0.5, 1.0, 2.0, 0.0);
        let mut param = Tensor::from_vec(&[2], vec![0.7, -0.3]).unwrap();
        let grad = Tensor::from_vec(&[2], vec![1.0, 0.0]).unwrap();
        let mut slots = Slots::new();

        opt.apply(&mut param, &grad, &mut slots, 0.1).unwrap();
        assert_eq!(param.to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_ftrl_l2_shrinks_step() {
        let plain = ftrl(0.5, 1.0, 0.0, 0.0);
        let ridge = ftrl(0.5, 1.0, 0.0, 4.0);
        let grad = Tensor::from_vec(&[1], vec![1.0]).unwrap();

        let mut a = Tensor::zeros(&[1]).unwrap();
        let mut b = Tensor::zeros(&[1]).unwrap();
        plain.apply(&mut a, &grad, &mut Slots::new(), 0.0).unwrap();
        ridge.apply(&mut b, &grad, &mut Slots::new(), 0.0).unwrap();

        // -1 / (4 + 4)
        assert!((b.at(&[0]).unwrap() + 0.125).abs() < 1e-12);
        assert!(b.at(&[0]).unwrap().abs() < a.at(&[0]).unwrap().abs());
    }

    #[test]
    fn test_ftrl_config_mismatch() {
        assert!(matches!(
            Ftrl::new(OptimizerConfig::Sgd),
            Err(OptimizerError::ConfigMismatch { .. })
        ));
    }
}

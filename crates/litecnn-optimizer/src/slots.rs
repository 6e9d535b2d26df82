//! Per-parameter optimizer state.

use litecnn_tensor::{Tensor, TensorError};

use crate::OptimizerResult;

/// State an optimizer keeps for one parameter tensor.
///
/// Both slots start empty and are created as zeros shaped like the first
/// gradient that needs them. `accumulator` holds the running sum of squared
/// gradients (`n`), read by Adagrad and FTRL; `linear` holds the FTRL `z`
/// term.
#[derive(Debug, Default, Clone)]
pub struct Slots {
    accumulator: Option<Tensor>,
    linear: Option<Tensor>,
}

impl Slots {
    /// Creates empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Squared-gradient accumulator, if initialized.
    pub fn accumulator(&self) -> Option<&Tensor> {
        self.accumulator.as_ref()
    }

    /// FTRL linear term, if initialized.
    pub fn linear(&self) -> Option<&Tensor> {
        self.linear.as_ref()
    }

    /// Returns `true` while no slot has been created.
    pub fn is_empty(&self) -> bool {
        self.accumulator.is_none() && self.linear.is_none()
    }

    /// Drops all state.
    pub fn reset(&mut self) {
        self.accumulator = None;
        self.linear = None;
    }

    /// Deep copy whose tensors share no storage with `self`.
    pub fn snapshot(&self) -> Slots {
        Slots {
            accumulator: self.accumulator.as_ref().map(Tensor::fork),
            linear: self.linear.as_ref().map(Tensor::fork),
        }
    }

    pub(crate) fn accumulator_for(&mut self, grad: &Tensor) -> OptimizerResult<&mut Tensor> {
        slot_for(&mut self.accumulator, grad)
    }

    /// Both slots at once, accumulator first.
    pub(crate) fn both_for(&mut self, grad: &Tensor) -> OptimizerResult<(&mut Tensor, &mut Tensor)> {
        let n = slot_for(&mut self.accumulator, grad)?;
        let z = slot_for(&mut self.linear, grad)?;
        Ok((n, z))
    }
}

fn slot_for<'a>(slot: &'a mut Option<Tensor>, grad: &Tensor) -> OptimizerResult<&'a mut Tensor> {
    if let Some(existing) = slot.as_ref() {
        if existing.shape() != grad.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: existing.shape(),
                got: grad.shape(),
            }
            .into());
        }
    }
    Ok(slot.get_or_insert_with(|| grad.zeros_like()))
}

/// One parameter update: the parameter, its slots and its gradient.
#[derive(Debug)]
pub struct UpdateTarget<'a> {
    /// Parameter updated in place.
    pub param: &'a mut Tensor,
    /// Optimizer state belonging to `param`.
    pub slots: &'a mut Slots,
    /// Gradient of the loss with respect to `param`.
    pub grad: &'a Tensor,
}

impl<'a> UpdateTarget<'a> {
    /// Bundles a parameter with its state and gradient.
    pub fn new(param: &'a mut Tensor, slots: &'a mut Slots, grad: &'a Tensor) -> Self {
        Self { param, slots, grad }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_lazy_init() {
        let grad = Tensor::from_vec(&[2, 2], vec![1.0; 4]).unwrap();
        let mut slots = Slots::new();
        assert!(slots.is_empty());

        slots.accumulator_for(&grad).unwrap();
        assert_eq!(slots.accumulator().unwrap().to_vec(), vec![0.0; 4]);
        assert!(slots.linear().is_none());

        let (n, z) = slots.both_for(&grad).unwrap();
        assert_eq!(n.shape(), vec![2, 2]);
        assert_eq!(z.shape(), vec![2, 2]);
        assert!(!slots.is_empty());

        slots.reset();
        assert!(slots.is_empty());
    }

    #[test]
    fn test_slots_shape_mismatch() {
        let mut slots = Slots::new();
        slots
            .accumulator_for(&Tensor::zeros(&[3]).unwrap())
            .unwrap();
        assert!(slots
            .accumulator_for(&Tensor::zeros(&[4]).unwrap())
            .is_err());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let grad = Tensor::zeros(&[2]).unwrap();
        let mut slots = Slots::new();
        slots.accumulator_for(&grad).unwrap();
        let copy = slots.snapshot();
        slots.accumulator_for(&grad).unwrap().fill(7.0);
        assert_eq!(copy.accumulator().unwrap().to_vec(), vec![0.0, 0.0]);
    }
}

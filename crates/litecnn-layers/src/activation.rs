//! Rectified linear unit.

use litecnn_tensor::Tensor;

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;

/// ReLU activation: `max(x, 0)`, shape-preserving for any rank.
///
/// # Example
///
/// ```
/// use litecnn_layers::{Layer, Relu};
/// use litecnn_tensor::Tensor;
///
/// let relu = Relu::new();
/// let x = Tensor::from_vec(&[3], vec![-2.0, 0.5, 3.0]).unwrap();
/// assert_eq!(relu.forward(&x).unwrap().to_vec(), vec![0.0, 0.5, 3.0]);
/// ```
#[derive(Debug, Default)]
pub struct Relu {
    cached_input: Option<Tensor>,
}

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self { cached_input: None }
    }
}

impl Layer for Relu {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.map(|v| if v > 0.0 { v } else { 0.0 }))
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
        if grad.shape() != input.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: input.shape(),
                actual: grad.shape(),
            });
        }
        Ok(input.zip_with(grad, |x, g| if x > 0.0 { g } else { 0.0 })?)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "Relu"
    }

    fn snapshot(&self) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_mask() {
        let mut relu = Relu::new();
        let x = Tensor::from_vec(&[2, 2], vec![-1.0, 1.0, 0.0, 2.0]).unwrap();
        let y = relu.forward_train(&x).unwrap();
        assert_eq!(y.to_vec(), vec![0.0, 1.0, 0.0, 2.0]);

        let dout = Tensor::from_vec(&[2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let dx = relu.backward(&dout).unwrap();
        assert_eq!(dx.to_vec(), vec![0.0, 6.0, 0.0, 8.0]);
    }

    #[test]
    fn test_relu_idempotent() {
        let relu = Relu::new();
        let x = Tensor::from_vec(&[5], vec![-3.0, -0.5, 0.0, 0.5, 3.0]).unwrap();
        let once = relu.forward(&x).unwrap();
        let twice = relu.forward(&once).unwrap();
        assert_eq!(once, twice);
        assert!(once.to_vec().iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_relu_forward_does_not_mutate_input() {
        let relu = Relu::new();
        let x = Tensor::from_vec(&[2], vec![-1.0, 1.0]).unwrap();
        relu.forward(&x).unwrap();
        assert_eq!(x.to_vec(), vec![-1.0, 1.0]);
    }

    #[test]
    fn test_relu_backward_errors() {
        let mut relu = Relu::new();
        let dout = Tensor::zeros(&[2]).unwrap();
        assert!(matches!(
            relu.backward(&dout),
            Err(LayerError::NotInitialized)
        ));

        relu.forward_train(&Tensor::zeros(&[3]).unwrap()).unwrap();
        assert!(matches!(
            relu.backward(&dout),
            Err(LayerError::ShapeMismatch { .. })
        ));
    }
}

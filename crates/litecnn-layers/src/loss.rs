//! Softmax cross-entropy loss.

use litecnn_tensor::Tensor;

use crate::error::{LayerError, LayerResult};

/// Computes the mean softmax cross-entropy of `scores` (`[N, C]`) against
/// `labels` and its gradient with respect to the scores.
///
/// Each row is shifted by its maximum before exponentiation. The gradient is
/// `(softmax(scores) - onehot(labels)) / N`.
///
/// # Errors
///
/// Returns [`LayerError::ShapeMismatch`] if `scores` is not rank 2 or
/// `labels.len()` differs from the row count, and
/// [`LayerError::InvalidLabel`] for a label outside `[0, C)`.
///
/// # Example
///
/// ```
/// use litecnn_layers::softmax_loss;
/// use litecnn_tensor::Tensor;
///
/// let scores = Tensor::from_vec(&[1, 3], vec![0.0, 0.0, 0.0]).unwrap();
/// let (loss, dscores) = softmax_loss(&scores, &[1]).unwrap();
/// assert!((loss - 3f64.ln()).abs() < 1e-12);
/// assert_eq!(dscores.shape(), vec![1, 3]);
/// ```
pub fn softmax_loss(scores: &Tensor, labels: &[usize]) -> LayerResult<(f64, Tensor)> {
    if scores.ndim() != 2 || labels.len() != scores.dim(0) {
        return Err(LayerError::ShapeMismatch {
            expected: vec![labels.len(), scores.dim(1)],
            actual: scores.shape(),
        });
    }
    let (rows, classes) = (scores.dim(0), scores.dim(1));
    if let Some((row, &label)) = labels.iter().enumerate().find(|&(_, &l)| l >= classes) {
        return Err(LayerError::InvalidLabel {
            row,
            label,
            num_classes: classes,
        });
    }

    let mut probs = scores.to_vec();
    let mut loss = 0.0;
    for (row, &label) in probs.chunks_mut(classes).zip(labels) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut total = 0.0;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            total += *v;
        }
        for v in row.iter_mut() {
            *v /= total;
        }
        loss -= row[label].ln();
        row[label] -= 1.0;
    }

    let n = rows as f64;
    let grad = Tensor::from_vec(&[rows, classes], probs)?.div_scalar(n);
    Ok((loss / n, grad))
}

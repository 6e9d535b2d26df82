//! Error types for the litecnn-layers crate.

use litecnn_tensor::TensorError;
use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Error raised by the underlying tensor engine.
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Layer has not seen a training forward pass yet.
    #[error("Layer not initialized: forward pass must be called before backward pass")]
    NotInitialized,

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Error during forward pass computation.
    #[error("Forward pass error: {message}")]
    ForwardError {
        /// Description of the forward pass error
        message: String,
    },

    /// Class label outside of `[0, num_classes)`.
    #[error("Invalid label {label} at row {row}: expected a class in [0, {num_classes})")]
    InvalidLabel {
        /// Row of the offending label
        row: usize,
        /// The label value
        label: usize,
        /// Number of classes in the scores
        num_classes: usize,
    },
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;

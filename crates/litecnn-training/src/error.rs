//! Error types for the litecnn-training crate.

use litecnn_layers::LayerError;
use litecnn_optimizer::OptimizerError;
use litecnn_tensor::TensorError;
use thiserror::Error;

/// Errors that can occur while building or training a network.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// A hyperparameter is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Training or evaluation data is inconsistent with itself or the network.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A layer failed during forward or backward propagation.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// A parameter update failed.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// A tensor operation failed outside of a layer.
    #[error("Tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// A configuration document could not be parsed or written.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A training worker thread panicked.
    #[error("Training worker {worker} panicked")]
    WorkerPanicked {
        /// Index of the worker.
        worker: usize,
    },
}

/// Result type alias for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;

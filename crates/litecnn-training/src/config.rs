//! Network and training-run configuration.
//!
//! Both configs are plain serde structs with builder-style setters. Missing
//! fields in a JSON document fall back to the defaults, which describe a
//! 28x28 grayscale ten-class problem.

use litecnn_optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{TrainingError, TrainingResult};

/// Hyperparameters of the conv -> relu -> pool -> affine -> relu -> affine
/// network.
///
/// # Example
///
/// ```
/// use litecnn_training::ConvNetConfig;
///
/// let config = ConvNetConfig::default()
///     .with_input(8, 8, 1)
///     .with_num_filters(4)
///     .with_hidden_dim(16);
/// assert!(config.validate().is_ok());
///
/// let json = config.to_json().unwrap();
/// let back = ConvNetConfig::from_json(&json).unwrap();
/// assert_eq!(back, config);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvNetConfig {
    /// Input height in pixels.
    pub input_height: usize,
    /// Input width in pixels.
    pub input_width: usize,
    /// Input channels.
    pub input_depth: usize,
    /// Number of convolution filters.
    pub num_filters: usize,
    /// Square filter extent.
    pub filter_size: usize,
    /// Width of the hidden affine layer.
    pub hidden_dim: usize,
    /// Number of output classes.
    pub num_classes: usize,
    /// Standard deviation of the Gaussian weight initializer.
    pub weight_scale: f64,
    /// L2 coefficient applied to every weight tensor (not biases).
    pub reg: f64,
    /// Update rule shared by all layers.
    pub optimizer: OptimizerConfig,
}

impl Default for ConvNetConfig {
    fn default() -> Self {
        Self {
            input_height: 28,
            input_width: 28,
            input_depth: 1,
            num_filters: 10,
            filter_size: 5,
            hidden_dim: 50,
            num_classes: 10,
            weight_scale: 1e-2,
            reg: 0.5,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl ConvNetConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> TrainingResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty-printed JSON.
    pub fn to_json(&self) -> TrainingResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Sets the input geometry.
    pub fn with_input(mut self, height: usize, width: usize, depth: usize) -> Self {
        self.input_height = height;
        self.input_width = width;
        self.input_depth = depth;
        self
    }

    /// Sets the number of convolution filters.
    pub fn with_num_filters(mut self, num_filters: usize) -> Self {
        self.num_filters = num_filters;
        self
    }

    /// Sets the filter extent.
    pub fn with_filter_size(mut self, filter_size: usize) -> Self {
        self.filter_size = filter_size;
        self
    }

    /// Sets the hidden layer width.
    pub fn with_hidden_dim(mut self, hidden_dim: usize) -> Self {
        self.hidden_dim = hidden_dim;
        self
    }

    /// Sets the number of classes.
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Sets the weight initialization scale.
    pub fn with_weight_scale(mut self, weight_scale: f64) -> Self {
        self.weight_scale = weight_scale;
        self
    }

    /// Sets the L2 coefficient.
    pub fn with_reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    /// Sets the update rule.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Checks that every extent and the weight scale are positive and the
    /// L2 coefficient is a finite non-negative number.
    pub fn validate(&self) -> TrainingResult<()> {
        let extents = [
            ("input_height", self.input_height),
            ("input_width", self.input_width),
            ("input_depth", self.input_depth),
            ("num_filters", self.num_filters),
            ("filter_size", self.filter_size),
            ("hidden_dim", self.hidden_dim),
            ("num_classes", self.num_classes),
        ];
        if let Some((name, _)) = extents.iter().find(|(_, v)| *v == 0) {
            return Err(TrainingError::InvalidConfiguration(format!(
                "{} must be positive",
                name
            )));
        }
        if !(self.weight_scale > 0.0 && self.weight_scale.is_finite()) {
            return Err(TrainingError::InvalidConfiguration(format!(
                "weight_scale must be a positive number, got {}",
                self.weight_scale
            )));
        }
        if !(self.reg >= 0.0 && self.reg.is_finite()) {
            return Err(TrainingError::InvalidConfiguration(format!(
                "reg must be a non-negative number, got {}",
                self.reg
            )));
        }
        self.optimizer.validate()?;
        Ok(())
    }

    /// Shape of one input example, `[depth, height, width]`.
    pub fn input_shape(&self) -> [usize; 3] {
        [self.input_depth, self.input_height, self.input_width]
    }
}

/// Settings of one call to [`crate::SimpleConvNet::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Passes over the training slice.
    pub epochs: usize,
    /// Examples per mini-batch; the last batch of an epoch may be smaller.
    pub batch_size: usize,
    /// Step size handed to the update rule; ignored and unchecked for FTRL.
    pub learning_rate: f64,
    /// Log the batch loss every N global iterations; 0 disables.
    pub log_every: u64,
    /// Evaluate on the validation set every N global iterations; 0 disables.
    pub eval_every: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 1,
            batch_size: 100,
            learning_rate: 0.005,
            log_every: 10,
            eval_every: 100,
        }
    }
}

impl TrainConfig {
    /// Sets the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the logging interval.
    pub fn with_log_every(mut self, log_every: u64) -> Self {
        self.log_every = log_every;
        self
    }

    /// Sets the evaluation interval.
    pub fn with_eval_every(mut self, eval_every: u64) -> Self {
        self.eval_every = eval_every;
        self
    }

    /// Rejects zero epochs or batch size. The learning rate must be
    /// positive unless `optimizer` ignores it.
    pub fn validate(&self, optimizer: &OptimizerConfig) -> TrainingResult<()> {
        if self.epochs == 0 {
            return Err(TrainingError::InvalidConfiguration(
                "epochs must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidConfiguration(
                "batch_size must be positive".to_string(),
            ));
        }
        if optimizer.uses_learning_rate()
            && !(self.learning_rate > 0.0 && self.learning_rate.is_finite())
        {
            return Err(TrainingError::InvalidConfiguration(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

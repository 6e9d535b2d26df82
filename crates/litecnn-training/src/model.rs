//! Single-owner convolutional network.

use litecnn_layers::{
    softmax_loss, Affine, Conv, ConvConfig, Initializer, Layer, LayerError, MaxPool,
    MaxPoolConfig, Regularizer, Relu,
};
use litecnn_tensor::Tensor;

use crate::config::ConvNetConfig;
use crate::error::{TrainingError, TrainingResult};

/// The fixed pipeline
/// `conv -> relu -> 2x2 max-pool -> affine -> relu -> affine`, scored with
/// softmax cross-entropy.
///
/// Inputs are `[N, depth, height, width]`; scores are `[N, num_classes]`.
/// The convolution uses stride 1 and padding `(filter_size - 1) / 2`; the
/// width of the first affine layer is derived from the actual pooled size.
///
/// A `ConvNet` is owned by one thread at a time. For shared, concurrent
/// training see [`crate::SimpleConvNet`], which hands each worker a
/// [`ConvNet::snapshot`].
///
/// # Example
///
/// ```
/// use litecnn_training::{ConvNet, ConvNetConfig};
/// use litecnn_tensor::Tensor;
///
/// let config = ConvNetConfig::default()
///     .with_input(6, 6, 1)
///     .with_num_filters(2)
///     .with_hidden_dim(8)
///     .with_num_classes(3);
/// let mut net = ConvNet::new(&config).unwrap();
/// let x = Tensor::zeros(&[2, 1, 6, 6]).unwrap();
///
/// let loss = net.loss(&x, &[0, 2]).unwrap();
/// assert!(loss > 0.0);
/// assert_eq!(net.predict(&x).unwrap().len(), 2);
/// ```
#[derive(Debug)]
pub struct ConvNet {
    conv: Conv,
    relu1: Relu,
    pool: MaxPool,
    affine1: Affine,
    relu2: Relu,
    affine2: Affine,
    /// Pooled activation shape from the last training forward pass.
    pooled_shape: Option<Vec<usize>>,
}

impl ConvNet {
    /// Builds a freshly initialized network.
    ///
    /// Weights are drawn from `N(0, weight_scale)`, biases start at zero and
    /// every weight tensor carries an L2 regularizer of strength `reg`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfiguration`] if the config does not
    /// validate or the filter does not fit the input.
    pub fn new(config: &ConvNetConfig) -> TrainingResult<Self> {
        config.validate()?;
        let reg = Regularizer::l2(config.reg);
        let init = Initializer::Gaussian(config.weight_scale);

        let conv_config = ConvConfig::same(config.filter_size, config.input_depth, config.num_filters);
        let (conv_h, conv_w) = conv_config
            .output_size(config.input_height, config.input_width)
            .ok_or_else(|| {
                TrainingError::InvalidConfiguration(format!(
                    "filter of size {} does not fit a {}x{} input",
                    config.filter_size, config.input_height, config.input_width
                ))
            })?;
        let conv = Conv::new(conv_config, init)?.with_kernel_regularizer(reg);

        let pool = MaxPool::new(MaxPoolConfig::default())?;
        let flat = config.num_filters * pool.output_size(conv_h) * pool.output_size(conv_w);

        let affine1 = Affine::new_with_initializer(flat, config.hidden_dim, init, Initializer::Zeros)?
            .with_kernel_regularizer(reg);
        let affine2 =
            Affine::new_with_initializer(config.hidden_dim, config.num_classes, init, Initializer::Zeros)?
                .with_kernel_regularizer(reg);

        Ok(Self::from_layers(conv, pool, affine1, affine2))
    }

    /// Assembles a network around existing layers; activations start fresh.
    pub(crate) fn from_layers(conv: Conv, pool: MaxPool, affine1: Affine, affine2: Affine) -> Self {
        Self {
            conv,
            relu1: Relu::new(),
            pool,
            affine1,
            relu2: Relu::new(),
            affine2,
            pooled_shape: None,
        }
    }

    /// Splits the network into its parameterized layers.
    pub(crate) fn into_layers(self) -> (Conv, MaxPool, Affine, Affine) {
        (self.conv, self.pool, self.affine1, self.affine2)
    }

    /// The convolution layer.
    pub fn conv(&self) -> &Conv {
        &self.conv
    }

    /// The pooling layer.
    pub fn pool(&self) -> &MaxPool {
        &self.pool
    }

    /// The hidden affine layer.
    pub fn affine1(&self) -> &Affine {
        &self.affine1
    }

    /// The output affine layer.
    pub fn affine2(&self) -> &Affine {
        &self.affine2
    }

    /// Class scores for `input`, without caching anything.
    pub fn forward(&self, input: &Tensor) -> TrainingResult<Tensor> {
        let h = self.conv.forward(input)?;
        let h = self.relu1.forward(&h)?;
        let pooled = self.pool.forward(&h)?;
        let flat = flatten(&pooled)?;
        let h = self.affine1.forward(&flat)?;
        let h = self.relu2.forward(&h)?;
        Ok(self.affine2.forward(&h)?)
    }

    /// Class scores for `input`, caching every stage for [`ConvNet::backward`].
    pub fn forward_train(&mut self, input: &Tensor) -> TrainingResult<Tensor> {
        let h = self.conv.forward_train(input)?;
        let h = self.relu1.forward_train(&h)?;
        let pooled = self.pool.forward_train(&h)?;
        let flat = flatten(&pooled)?;
        self.pooled_shape = Some(pooled.shape());
        let h = self.affine1.forward_train(&flat)?;
        let h = self.relu2.forward_train(&h)?;
        Ok(self.affine2.forward_train(&h)?)
    }

    /// Propagates `dscores` back through the pipeline, leaving parameter
    /// gradients on each layer, and returns the gradient with respect to the
    /// input.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`] (wrapped) if no training forward
    /// pass has happened.
    pub fn backward(&mut self, dscores: &Tensor) -> TrainingResult<Tensor> {
        let pooled_shape = self
            .pooled_shape
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let unflatten: Vec<isize> = pooled_shape.iter().map(|&d| d as isize).collect();

        let d = self.affine2.backward(dscores)?;
        let d = self.relu2.backward(&d)?;
        let d = self.affine1.backward(&d)?;
        let d = d.reshape(&unflatten)?;
        let d = self.pool.backward(&d)?;
        let d = self.relu1.backward(&d)?;
        Ok(self.conv.backward(&d)?)
    }

    /// Runs a training forward and backward pass on one batch and returns the
    /// regularized loss. Gradients are left on the layers.
    pub fn loss(&mut self, input: &Tensor, labels: &[usize]) -> TrainingResult<f64> {
        let scores = self.forward_train(input)?;
        let (data_loss, dscores) = softmax_loss(&scores, labels)?;
        self.backward(&dscores)?;
        Ok(data_loss + self.regularization_loss())
    }

    /// Regularized loss without caching or gradients.
    pub fn loss_value(&self, input: &Tensor, labels: &[usize]) -> TrainingResult<f64> {
        let scores = self.forward(input)?;
        let (data_loss, _) = softmax_loss(&scores, labels)?;
        Ok(data_loss + self.regularization_loss())
    }

    /// Sum of the L2 penalties of every weight tensor.
    pub fn regularization_loss(&self) -> f64 {
        self.conv.regularization_loss()
            + self.affine1.regularization_loss()
            + self.affine2.regularization_loss()
    }

    /// Arg-max class per row; the first maximum wins ties.
    pub fn predict(&self, input: &Tensor) -> TrainingResult<Vec<usize>> {
        let scores = self.forward(input)?;
        let classes = scores.dim(1);
        Ok(scores
            .to_vec()
            .chunks(classes)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold(0, |best, (j, &v)| if v > row[best] { j } else { best })
            })
            .collect())
    }

    /// Parameters in update order: conv weights and bias, then each affine
    /// layer's weights and bias.
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.conv.parameters();
        params.extend(self.affine1.parameters());
        params.extend(self.affine2.parameters());
        params
    }

    /// Gradients in the order of [`ConvNet::parameters`]. Empty before the
    /// first backward pass.
    pub fn gradients(&self) -> Vec<&Tensor> {
        let mut grads = self.conv.gradients();
        grads.extend(self.affine1.gradients());
        grads.extend(self.affine2.gradients());
        grads
    }

    /// A copy with forked parameters and empty caches.
    pub fn snapshot(&self) -> ConvNet {
        Self::from_layers(
            self.conv.snapshot(),
            self.pool.snapshot(),
            self.affine1.snapshot(),
            self.affine2.snapshot(),
        )
    }
}

fn flatten(pooled: &Tensor) -> TrainingResult<Tensor> {
    let rows = pooled.dim(0) as isize;
    Ok(pooled.reshape(&[rows, -1])?)
}

//! Shared network with lock-per-layer updates and concurrent training.
//!
//! [`SimpleConvNet`] owns the live parameters. Each trainable layer sits in
//! its own mutex together with the optimizer state of its parameters. A
//! training step never holds a lock while computing: it forks the current
//! parameters into a thread-local [`ConvNet`], computes the loss and
//! gradients there, and then locks one layer at a time to apply the update.
//!
//! Readers (prediction, evaluation, snapshots) may therefore observe a state
//! where some layers already carry an update that others do not yet have,
//! but never a half-updated layer.

use std::thread;

use litecnn_layers::{Affine, Conv, Layer, LayerError, MaxPool};
use litecnn_optimizer::{create_optimizer, Optimizer, Slots, UpdateTarget};
use litecnn_tensor::Tensor;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::{ConvNetConfig, TrainConfig};
use crate::counter::IterationCounter;
use crate::error::{TrainingError, TrainingResult};
use crate::model::ConvNet;

/// A layer together with one slot set per parameter.
#[derive(Debug)]
struct Trainable<L> {
    layer: L,
    slots: Vec<Slots>,
}

impl<L: Layer> Trainable<L> {
    fn new(layer: L) -> Self {
        let slots = layer.parameters().iter().map(|_| Slots::new()).collect();
        Self { layer, slots }
    }

    /// Applies `grads` (in parameter order) to the live parameters.
    fn apply(
        &mut self,
        optimizer: &dyn Optimizer,
        grads: &[&Tensor],
        learning_rate: f64,
    ) -> TrainingResult<()> {
        let params = self.layer.parameters_mut();
        if params.len() != grads.len() {
            return Err(LayerError::NotInitialized.into());
        }
        let targets = params
            .into_iter()
            .zip(self.slots.iter_mut())
            .zip(grads.iter().copied())
            .map(|((param, slots), grad)| UpdateTarget::new(param, slots, grad))
            .collect();
        optimizer.apply_all(targets, learning_rate)?;
        Ok(())
    }
}

/// Summary of one [`SimpleConvNet::train`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainResult {
    /// Loss of the last mini-batch, including the regularization penalty.
    pub final_loss: f64,
    /// Accuracy on the validation set after the last step.
    pub val_accuracy: f64,
    /// Mini-batches processed by this call.
    pub steps: u64,
    /// Value of the shared iteration counter after the last step.
    pub global_step: u64,
}

/// A convolutional network that several threads can train at once.
///
/// # Example
///
/// ```
/// use litecnn_training::{ConvNetConfig, SimpleConvNet, TrainConfig};
/// use litecnn_optimizer::OptimizerConfig;
/// use litecnn_tensor::Tensor;
///
/// let config = ConvNetConfig::default()
///     .with_input(6, 6, 1)
///     .with_num_filters(2)
///     .with_hidden_dim(8)
///     .with_num_classes(2)
///     .with_optimizer(OptimizerConfig::Sgd);
/// let net = SimpleConvNet::new(config).unwrap();
///
/// let mut x = Tensor::zeros(&[4, 1, 6, 6]).unwrap();
/// x.gaussian(1.0).unwrap();
/// let labels = [0, 1, 0, 1];
///
/// let train = TrainConfig::default().with_batch_size(2).with_learning_rate(0.01);
/// let result = net.train(&x, &labels, &x, &labels, &train).unwrap();
/// assert_eq!(result.steps, 2);
/// assert_eq!(net.iteration(), 2);
/// ```
#[derive(Debug)]
pub struct SimpleConvNet {
    config: ConvNetConfig,
    conv: Mutex<Trainable<Conv>>,
    pool: MaxPool,
    affine1: Mutex<Trainable<Affine>>,
    affine2: Mutex<Trainable<Affine>>,
    optimizer: Box<dyn Optimizer>,
    counter: IterationCounter,
}

impl SimpleConvNet {
    /// Builds a freshly initialized network with the update rule named in
    /// `config.optimizer`.
    pub fn new(config: ConvNetConfig) -> TrainingResult<Self> {
        let net = ConvNet::new(&config)?;
        let optimizer = create_optimizer(config.optimizer)?;
        Ok(Self::from_model(config, net, optimizer))
    }

    fn from_model(config: ConvNetConfig, net: ConvNet, optimizer: Box<dyn Optimizer>) -> Self {
        let (conv, pool, affine1, affine2) = net.into_layers();
        info!(
            optimizer = optimizer.config().name(),
            num_filters = config.num_filters,
            hidden_dim = config.hidden_dim,
            "Created network"
        );
        Self {
            config,
            conv: Mutex::new(Trainable::new(conv)),
            pool,
            affine1: Mutex::new(Trainable::new(affine1)),
            affine2: Mutex::new(Trainable::new(affine2)),
            optimizer,
            counter: IterationCounter::new(),
        }
    }

    /// The configuration the network was built from.
    pub fn config(&self) -> &ConvNetConfig {
        &self.config
    }

    /// The shared update rule.
    pub fn optimizer(&self) -> &dyn Optimizer {
        self.optimizer.as_ref()
    }

    /// A handle to the shared iteration counter.
    pub fn counter(&self) -> &IterationCounter {
        &self.counter
    }

    /// Number of updates applied so far by all workers.
    pub fn iteration(&self) -> u64 {
        self.counter.get()
    }

    /// Forks the live parameters into a thread-local network.
    ///
    /// Each layer is locked only while its parameters are copied.
    pub fn snapshot(&self) -> ConvNet {
        let conv = self.conv.lock().layer.snapshot();
        let affine1 = self.affine1.lock().layer.snapshot();
        let affine2 = self.affine2.lock().layer.snapshot();
        ConvNet::from_layers(conv, self.pool.snapshot(), affine1, affine2)
    }

    /// Arg-max class for every row of `input`.
    pub fn predict(&self, input: &Tensor) -> TrainingResult<Vec<usize>> {
        self.snapshot().predict(input)
    }

    /// Fraction of rows of `input` whose predicted class equals the label.
    pub fn eval(&self, input: &Tensor, labels: &[usize]) -> TrainingResult<f64> {
        check_labels(input, labels)?;
        let predictions = self.predict(input)?;
        let matches = predictions
            .iter()
            .zip(labels)
            .filter(|(p, l)| p == l)
            .count();
        Ok(matches as f64 / labels.len() as f64)
    }

    /// Regularized loss of the current parameters on one batch.
    pub fn loss(&self, input: &Tensor, labels: &[usize]) -> TrainingResult<f64> {
        self.snapshot().loss_value(input, labels)
    }

    /// Trains on `input`/`labels` in mini-batches against the shared
    /// parameters.
    ///
    /// Every batch runs on a fresh snapshot; its gradients are then applied
    /// layer by layer (conv, hidden affine, output affine) under each layer's
    /// lock. The shared counter drives logging and periodic validation, and a
    /// final validation runs after the last epoch.
    pub fn train(
        &self,
        input: &Tensor,
        labels: &[usize],
        val_input: &Tensor,
        val_labels: &[usize],
        train: &TrainConfig,
    ) -> TrainingResult<TrainResult> {
        train.validate(&self.config.optimizer)?;
        check_labels(input, labels)?;
        check_labels(val_input, val_labels)?;

        let rows = labels.len();
        let mut final_loss = f64::NAN;
        let mut steps = 0;
        for epoch in 0..train.epochs {
            for start in (0..rows).step_by(train.batch_size) {
                let len = train.batch_size.min(rows - start);
                let batch = input.slice(start, len)?;
                let loss = self.step(&batch, &labels[start..start + len], train.learning_rate)?;
                if !loss.is_finite() {
                    warn!(loss, epoch, row = start, "Non-finite batch loss");
                }
                final_loss = loss;
                steps += 1;

                let step = self.counter.increment();
                if train.log_every > 0 && step % train.log_every == 0 {
                    info!(iteration = step, loss, "Training loss");
                }
                if train.eval_every > 0 && step % train.eval_every == 0 {
                    let accuracy = self.eval(val_input, val_labels)?;
                    info!(iteration = step, accuracy, "Validation accuracy");
                }
            }
        }

        let val_accuracy = self.eval(val_input, val_labels)?;
        let global_step = self.counter.get();
        info!(
            steps,
            global_step,
            loss = final_loss,
            accuracy = val_accuracy,
            "Training finished"
        );
        Ok(TrainResult {
            final_loss,
            val_accuracy,
            steps,
            global_step,
        })
    }

    /// Splits the training set into `workers` contiguous slices and trains on
    /// them from that many threads at once, all updating this network.
    ///
    /// Returns one result per worker that received data, in slice order.
    ///
    /// # Errors
    ///
    /// Returns the first worker error, or [`TrainingError::WorkerPanicked`]
    /// if a worker thread panicked.
    pub fn train_workers(
        &self,
        input: &Tensor,
        labels: &[usize],
        val_input: &Tensor,
        val_labels: &[usize],
        train: &TrainConfig,
        workers: usize,
    ) -> TrainingResult<Vec<TrainResult>> {
        if workers == 0 {
            return Err(TrainingError::InvalidConfiguration(
                "workers must be positive".to_string(),
            ));
        }
        train.validate(&self.config.optimizer)?;
        check_labels(input, labels)?;

        let rows = labels.len();
        let chunk = (rows + workers - 1) / workers;
        let mut shards = Vec::with_capacity(workers);
        for start in (0..rows).step_by(chunk.max(1)) {
            let len = chunk.min(rows - start);
            shards.push((input.slice(start, len)?, &labels[start..start + len]));
        }
        info!(
            workers = shards.len(),
            examples = rows,
            per_worker = chunk,
            "Starting worker threads"
        );

        let joined: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = shards
                .into_iter()
                .enumerate()
                .map(|(worker, (x, y))| {
                    let handle = scope.spawn(move || {
                        debug!(worker, examples = y.len(), "Worker starting");
                        self.train(&x, y, val_input, val_labels, train)
                    });
                    (worker, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(worker, handle)| (worker, handle.join()))
                .collect()
        });

        joined
            .into_iter()
            .map(|(worker, outcome)| {
                outcome.map_err(|_| TrainingError::WorkerPanicked { worker })?
            })
            .collect()
    }

    /// One mini-batch: snapshot, loss and gradients, then locked updates.
    fn step(&self, input: &Tensor, labels: &[usize], learning_rate: f64) -> TrainingResult<f64> {
        let mut local = self.snapshot();
        let loss = local.loss(input, labels)?;

        let optimizer = self.optimizer.as_ref();
        self.conv
            .lock()
            .apply(optimizer, &local.conv().gradients(), learning_rate)?;
        self.affine1
            .lock()
            .apply(optimizer, &local.affine1().gradients(), learning_rate)?;
        self.affine2
            .lock()
            .apply(optimizer, &local.affine2().gradients(), learning_rate)?;
        debug!(optimizer = optimizer.config().name(), loss, "Applied update");
        Ok(loss)
    }
}

fn check_labels(input: &Tensor, labels: &[usize]) -> TrainingResult<()> {
    if input.ndim() != 4 || input.dim(0) != labels.len() {
        return Err(TrainingError::InvalidInput(format!(
            "expected {} examples of rank 4, got input of shape {:?}",
            labels.len(),
            input.shape()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use litecnn_optimizer::OptimizerConfig;

    fn config() -> ConvNetConfig {
        ConvNetConfig::default()
            .with_input(6, 6, 1)
            .with_num_filters(2)
            .with_filter_size(3)
            .with_hidden_dim(8)
            .with_num_classes(3)
            .with_weight_scale(0.1)
            .with_reg(0.0)
    }

    fn data(n: usize, seed: u64) -> (Tensor, Vec<usize>) {
        let mut x = Tensor::zeros(&[n, 1, 6, 6]).unwrap();
        x.gaussian_with_seed(1.0, seed).unwrap();
        let labels = (0..n).map(|i| i % 3).collect();
        (x, labels)
    }

    #[test]
    fn test_snapshot_matches_live_parameters() {
        let net = SimpleConvNet::new(config()).unwrap();
        let a = net.snapshot();
        let b = net.snapshot();
        assert_eq!(a.parameters(), b.parameters());
        assert!(!a.parameters()[0].shares_buffer(b.parameters()[0]));
    }

    #[test]
    fn test_training_step_changes_parameters() {
        let net = SimpleConvNet::new(config().with_optimizer(OptimizerConfig::Sgd)).unwrap();
        let (x, labels) = data(4, 1);
        let before = net.snapshot();

        let train = TrainConfig::default()
            .with_batch_size(4)
            .with_learning_rate(0.1);
        let result = net.train(&x, &labels, &x, &labels, &train).unwrap();

        assert_eq!(result.steps, 1);
        assert_eq!(result.global_step, 1);
        assert!(result.final_loss.is_finite());
        assert!((0.0..=1.0).contains(&result.val_accuracy));
        let after = net.snapshot();
        assert_ne!(before.parameters()[0], after.parameters()[0]);
    }

    #[test]
    fn test_optimizer_follows_config() {
        let adagrad = OptimizerConfig::adagrad();
        let net = SimpleConvNet::new(config().with_optimizer(adagrad)).unwrap();
        assert_eq!(*net.optimizer().config(), adagrad);
        assert_eq!(&net.config().optimizer, net.optimizer().config());

        let net = SimpleConvNet::new(config()).unwrap();
        assert_eq!(net.optimizer().config().name(), "Ftrl");
    }

    #[test]
    fn test_ftrl_trains_without_learning_rate() {
        let net = SimpleConvNet::new(config()).unwrap();
        let (x, labels) = data(4, 3);
        let before = net.snapshot();

        let train = TrainConfig::default()
            .with_batch_size(2)
            .with_learning_rate(0.0);
        let result = net.train(&x, &labels, &x, &labels, &train).unwrap();
        assert_eq!(result.steps, 2);
        assert_ne!(before.parameters()[0], net.snapshot().parameters()[0]);

        let sgd = SimpleConvNet::new(config().with_optimizer(OptimizerConfig::Sgd)).unwrap();
        assert!(matches!(
            sgd.train(&x, &labels, &x, &labels, &train),
            Err(TrainingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_last_batch_may_be_short() {
        let net = SimpleConvNet::new(config()).unwrap();
        let (x, labels) = data(5, 2);
        let train = TrainConfig::default().with_batch_size(2).with_epochs(2);
        let result = net.train(&x, &labels, &x, &labels, &train).unwrap();
        assert_eq!(result.steps, 6);
        assert_eq!(net.iteration(), 6);
    }

    #[test]
    fn test_train_rejects_mismatched_labels() {
        let net = SimpleConvNet::new(config()).unwrap();
        let (x, labels) = data(4, 3);
        let train = TrainConfig::default();
        assert!(matches!(
            net.train(&x, &labels[..3], &x, &labels, &train),
            Err(TrainingError::InvalidInput(_))
        ));
        assert!(matches!(
            net.train_workers(&x, &labels, &x, &labels, &train, 0),
            Err(TrainingError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_eval_and_loss() {
        let net = SimpleConvNet::new(config()).unwrap();
        let (x, labels) = data(6, 4);
        let accuracy = net.eval(&x, &labels).unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        assert_eq!(net.predict(&x).unwrap().len(), 6);
        assert!(net.loss(&x, &labels).unwrap() > 0.0);
        assert_eq!(net.iteration(), 0);
    }

    #[test]
    fn test_more_workers_than_examples() {
        let net = SimpleConvNet::new(config()).unwrap();
        let (x, labels) = data(3, 5);
        let train = TrainConfig::default().with_batch_size(1);
        let results = net
            .train_workers(&x, &labels, &x, &labels, &train, 8)
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(net.iteration(), 3);
    }
}

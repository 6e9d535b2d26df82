//! Trains the convolutional network on a synthetic image set with several
//! worker threads sharing one set of parameters.
//!
//! Each class is a bright square at its own position on a noisy background,
//! so a few epochs are enough to see validation accuracy climb.
//!
//! ```text
//! RUST_LOG=info cargo run -p litecnn-examples --bin demo_train -- --threads 4
//! ```

use anyhow::{ensure, Result};
use clap::{Parser, ValueEnum};
use litecnn_optimizer::OptimizerConfig;
use litecnn_tensor::Tensor;
use litecnn_training::{ConvNetConfig, SimpleConvNet, TrainConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OptimizerKind {
    Sgd,
    Adagrad,
    Ftrl,
}

#[derive(Parser, Debug)]
struct Args {
    /// Worker threads for the main training phase.
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Epochs of the main training phase.
    #[arg(long, default_value_t = 2)]
    epochs: usize,

    /// Examples per mini-batch.
    #[arg(long, default_value_t = 20)]
    batch_size: usize,

    /// Learning rate of the main phase (ignored by FTRL).
    #[arg(long, default_value_t = 0.005)]
    learning_rate: f64,

    /// Training examples to generate; a quarter as many are held out.
    #[arg(long, default_value_t = 800)]
    samples: usize,

    /// Update rule.
    #[arg(long, value_enum, default_value = "adagrad")]
    optimizer: OptimizerKind,

    /// FTRL alpha.
    #[arg(long, default_value_t = 5.0)]
    ftrl_alpha: f64,

    /// Single-threaded epochs over each worker slice before the main phase.
    #[arg(long, default_value_t = 1)]
    warmup_epochs: usize,

    /// Learning rate of the warm-up phase.
    #[arg(long, default_value_t = 0.01)]
    warmup_learning_rate: f64,

    /// Log the batch loss every N iterations.
    #[arg(long, default_value_t = 10)]
    log_every: u64,

    /// Evaluate on the held-out set every N iterations.
    #[arg(long, default_value_t = 50)]
    eval_every: u64,

    /// Image side length.
    #[arg(long, default_value_t = 12)]
    image_size: usize,

    /// Number of classes.
    #[arg(long, default_value_t = 4)]
    classes: usize,

    /// Seed of the synthetic data.
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

impl OptimizerKind {
    fn config(self, ftrl_alpha: f64) -> OptimizerConfig {
        match self {
            OptimizerKind::Sgd => OptimizerConfig::Sgd,
            OptimizerKind::Adagrad => OptimizerConfig::adagrad(),
            OptimizerKind::Ftrl => OptimizerConfig::Ftrl {
                alpha: ftrl_alpha,
                beta: 0.001,
                lambda1: 0.0,
                lambda2: 0.0,
            },
        }
    }
}

/// `n` single-channel images, class `c` drawn as a bright square whose
/// position depends on `c`.
fn synthetic(
    n: usize,
    size: usize,
    classes: usize,
    rng: &mut StdRng,
) -> Result<(Tensor, Vec<usize>)> {
    ensure!(size > 0, "image size must be positive");
    ensure!(classes > 0, "at least one class is required");
    let noise = Normal::new(0.0, 0.3)?;
    let side = (size / 3).max(1);
    let per_row = ((size - side) / side + 1).max(1);

    let mut data = Vec::with_capacity(n * size * size);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let label = i % classes;
        let cell = label % (per_row * per_row);
        let (top, left) = ((cell / per_row) * side, (cell % per_row) * side);
        for r in 0..size {
            for c in 0..size {
                let inside = (top..top + side).contains(&r) && (left..left + side).contains(&c);
                let base = if inside { 1.0 } else { 0.0 };
                data.push(base + noise.sample(rng));
            }
        }
        labels.push(label);
    }
    Ok((Tensor::from_vec(&[n, 1, size, size], data)?, labels))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
    let args = Args::parse();
    ensure!(args.threads > 0, "--threads must be positive");
    ensure!(args.samples > 0, "--samples must be positive");
    ensure!(args.classes > 1, "--classes must be at least 2");
    ensure!(args.image_size > 0, "--image-size must be positive");

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (x_train, y_train) = synthetic(args.samples, args.image_size, args.classes, &mut rng)?;
    let (x_val, y_val) = synthetic(
        (args.samples / 4).max(1),
        args.image_size,
        args.classes,
        &mut rng,
    )?;

    let config = ConvNetConfig::default()
        .with_input(args.image_size, args.image_size, 1)
        .with_num_filters(6)
        .with_filter_size(3)
        .with_hidden_dim(32)
        .with_num_classes(args.classes)
        .with_weight_scale(0.1)
        .with_reg(1e-3)
        .with_optimizer(args.optimizer.config(args.ftrl_alpha));
    info!("Network config: {}", config.to_json()?);
    let net = SimpleConvNet::new(config)?;

    if args.warmup_epochs > 0 {
        let warmup = TrainConfig::default()
            .with_epochs(args.warmup_epochs)
            .with_batch_size(args.batch_size)
            .with_learning_rate(args.warmup_learning_rate)
            .with_log_every(0)
            .with_eval_every(0);
        let chunk = (args.samples + args.threads - 1) / args.threads;
        for (worker, start) in (0..args.samples).step_by(chunk).enumerate() {
            let len = chunk.min(args.samples - start);
            let result = net.train(
                &x_train.slice(start, len)?,
                &y_train[start..start + len],
                &x_val,
                &y_val,
                &warmup,
            )?;
            info!(
                slice = worker,
                loss = result.final_loss,
                accuracy = result.val_accuracy,
                "Warm-up finished"
            );
        }
    }

    let train = TrainConfig::default()
        .with_epochs(args.epochs)
        .with_batch_size(args.batch_size)
        .with_learning_rate(args.learning_rate)
        .with_log_every(args.log_every)
        .with_eval_every(args.eval_every);
    let results = net.train_workers(&x_train, &y_train, &x_val, &y_val, &train, args.threads)?;
    for (worker, result) in results.iter().enumerate() {
        info!(
            worker,
            steps = result.steps,
            loss = result.final_loss,
            "Worker finished"
        );
    }

    let accuracy = net.eval(&x_val, &y_val)?;
    info!(
        global_step = net.iteration(),
        accuracy,
        "demo_train finished"
    );
    Ok(())
}

//! Network assembly and training for litecnn.
//!
//! This crate wires the layers of `litecnn-layers` into a fixed
//! convolutional topology and trains it with an update rule from
//! `litecnn-optimizer`:
//!
//! - [`ConvNet`]: a single-owner network with forward, backward, loss and
//!   prediction.
//! - [`SimpleConvNet`]: the shared network. Any number of threads may call
//!   [`SimpleConvNet::train`] at once; [`SimpleConvNet::train_workers`] does
//!   the splitting and thread management.
//! - [`ConvNetConfig`] / [`TrainConfig`]: serde-backed hyperparameters.
//! - [`IterationCounter`]: the step counter shared by all workers.
//!
//! Progress is reported through `tracing`; installing a subscriber is up to
//! the binary.
//!
//! # Example
//!
//! ```
//! use litecnn_training::{ConvNetConfig, SimpleConvNet, TrainConfig};
//! use litecnn_tensor::Tensor;
//!
//! let config = ConvNetConfig::default()
//!     .with_input(8, 8, 1)
//!     .with_num_filters(2)
//!     .with_hidden_dim(10)
//!     .with_num_classes(2);
//! let net = SimpleConvNet::new(config).unwrap();
//!
//! let mut x = Tensor::zeros(&[8, 1, 8, 8]).unwrap();
//! x.gaussian(1.0).unwrap();
//! let labels = [0, 1, 1, 0, 0, 1, 1, 0];
//!
//! let train = TrainConfig::default().with_batch_size(2);
//! let results = net.train_workers(&x, &labels, &x, &labels, &train, 2).unwrap();
//! assert_eq!(results.len(), 2);
//! assert_eq!(net.iteration(), 4);
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod counter;
pub mod error;
pub mod model;
pub mod network;

pub use config::{ConvNetConfig, TrainConfig};
pub use counter::IterationCounter;
pub use error::{TrainingError, TrainingResult};
pub use model::ConvNet;
pub use network::{SimpleConvNet, TrainResult};

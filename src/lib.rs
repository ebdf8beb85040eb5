//! # Pintor: text-conditioned image GAN
//!
//! Pintor trains a generator that turns a noise vector and a sentence
//! embedding into an image, against a critic that judges image/text pairs.
//!
//! ## Architecture
//!
//! - **autograd**: reverse-mode automatic differentiation over `ndarray`
//! - **nn**: dense, convolution, transposed convolution and normalization layers
//! - **model**: generator, discriminator, losses and gradient penalty
//! - **optim**: Adam
//! - **data**: in-memory text/image datasets
//! - **train**: alternating discriminator/generator training loop
//! - **io**: checkpoints, sample grids and captions
//! - **monitor**: scalar, histogram and image summaries
//! - **config**: YAML specs, validation and the command line

pub mod autograd;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod monitor;
pub mod nn;
pub mod optim;
pub mod train;

pub use autograd::Tensor;
pub use error::{Error, Result};

//! Normalization layers

use super::{init, scoped, Mode, Module};
use crate::autograd::{batch_norm, batch_norm_inference, layer_norm, BatchStats};
use crate::Tensor;
use ndarray::Array1;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

const EPSILON: f32 = 1e-5;

/// Batch normalization over every axis but the channel axis
///
/// Running statistics follow `running = momentum * running + (1 - momentum) * batch`
/// in [`Mode::Train`] and replace the batch statistics in [`Mode::Eval`].
/// [`Mode::Frozen`] normalizes with batch statistics and leaves the running ones alone.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    pub gamma: Tensor,
    pub beta: Tensor,
    running: RefCell<BatchStats>,
    momentum: f32,
}

impl BatchNorm {
    /// `gamma ~ N(1, 0.02²)`, zero `beta`, momentum 0.9
    pub fn new<R: Rng>(channels: usize, rng: &mut R) -> Self {
        Self {
            gamma: init::normal(&[channels], 1.0, 0.02, rng),
            beta: Tensor::zeros(&[channels], true),
            running: RefCell::new(BatchStats {
                mean: Array1::zeros(channels),
                var: Array1::ones(channels),
            }),
            momentum: 0.9,
        }
    }

    pub fn running_stats(&self) -> BatchStats {
        self.running.borrow().clone()
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        match mode {
            Mode::Train => {
                let (y, stats) = batch_norm(x, &self.gamma, &self.beta, EPSILON);
                let mut running = self.running.borrow_mut();
                let m = self.momentum;
                running.mean = &running.mean * m + &stats.mean * (1.0 - m);
                running.var = &running.var * m + &stats.var * (1.0 - m);
                y
            }
            Mode::Frozen => batch_norm(x, &self.gamma, &self.beta, EPSILON).0,
            Mode::Eval => {
                batch_norm_inference(x, &self.gamma, &self.beta, &self.running.borrow(), EPSILON)
            }
        }
    }
}

impl Module for BatchNorm {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![(scoped(prefix, "gamma"), &self.gamma), (scoped(prefix, "beta"), &self.beta)]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![(scoped(prefix, "gamma"), &mut self.gamma), (scoped(prefix, "beta"), &mut self.beta)]
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        let running = self.running.borrow();
        vec![
            (scoped(prefix, "moving_mean"), running.mean.clone()),
            (scoped(prefix, "moving_variance"), running.var.clone()),
        ]
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        let running = self.running.get_mut();
        vec![
            (scoped(prefix, "moving_mean"), &mut running.mean),
            (scoped(prefix, "moving_variance"), &mut running.var),
        ]
    }
}

/// Per-sample normalization over height, width and channels with a
/// per-channel affine transform
#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub gamma: Tensor,
    pub beta: Tensor,
}

impl LayerNorm {
    pub fn new<R: Rng>(channels: usize, rng: &mut R) -> Self {
        Self {
            gamma: init::normal(&[channels], 1.0, 0.02, rng),
            beta: Tensor::zeros(&[channels], true),
        }
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        layer_norm(x, &self.gamma, &self.beta, EPSILON)
    }
}

impl Module for LayerNorm {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![(scoped(prefix, "gamma"), &self.gamma), (scoped(prefix, "beta"), &self.beta)]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![(scoped(prefix, "gamma"), &mut self.gamma), (scoped(prefix, "beta"), &mut self.beta)]
    }
}

/// Which normalization a network uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormKind {
    Batch,
    #[default]
    Layer,
}

/// A normalization layer chosen by [`NormKind`]
#[derive(Debug, Clone)]
pub enum Norm {
    Batch(BatchNorm),
    Layer(LayerNorm),
}

impl Norm {
    pub fn new<R: Rng>(kind: NormKind, channels: usize, rng: &mut R) -> Self {
        match kind {
            NormKind::Batch => Norm::Batch(BatchNorm::new(channels, rng)),
            NormKind::Layer => Norm::Layer(LayerNorm::new(channels, rng)),
        }
    }

    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        match self {
            Norm::Batch(bn) => bn.forward(x, mode),
            Norm::Layer(ln) => ln.forward(x),
        }
    }
}

impl Module for Norm {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        match self {
            Norm::Batch(bn) => bn.named_parameters(prefix),
            Norm::Layer(ln) => ln.named_parameters(prefix),
        }
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        match self {
            Norm::Batch(bn) => bn.named_parameters_mut(prefix),
            Norm::Layer(ln) => ln.named_parameters_mut(prefix),
        }
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        match self {
            Norm::Batch(bn) => bn.named_buffers(prefix),
            Norm::Layer(_) => Vec::new(),
        }
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        match self {
            Norm::Batch(bn) => bn.named_buffers_mut(prefix),
            Norm::Layer(_) => Vec::new(),
        }
    }
}

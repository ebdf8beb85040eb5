//! Fully connected layer

use super::{init, scoped, Module};
use crate::autograd::dense;
use crate::Tensor;
use rand::Rng;

/// Dense layer `x @ kernel + bias`
#[derive(Debug, Clone)]
pub struct Dense {
    /// Kernel (in_features x out_features)
    pub kernel: Tensor,
    /// Bias (out_features)
    pub bias: Tensor,
}

impl Dense {
    /// Kernel drawn from `N(0, 0.02²)`, zero bias
    pub fn new<R: Rng>(in_features: usize, out_features: usize, rng: &mut R) -> Self {
        Self {
            kernel: init::normal(&[in_features, out_features], 0.0, 0.02, rng),
            bias: Tensor::zeros(&[out_features], true),
        }
    }

    pub fn in_features(&self) -> usize {
        self.kernel.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.kernel.shape()[1]
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        dense(x, &self.kernel, &self.bias)
    }
}

impl Module for Dense {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        vec![(scoped(prefix, "kernel"), &self.kernel), (scoped(prefix, "bias"), &self.bias)]
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        vec![(scoped(prefix, "kernel"), &mut self.kernel), (scoped(prefix, "bias"), &mut self.bias)]
    }
}

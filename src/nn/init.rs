//! Weight initializers

use crate::Tensor;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Trainable tensor drawn from `N(mean, std²)`
pub fn normal<R: Rng>(shape: &[usize], mean: f32, std: f32, rng: &mut R) -> Tensor {
    let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        let z: f32 = StandardNormal.sample(rng);
        mean + std * z
    });
    Tensor::new(data, true)
}

/// Constant tensor drawn uniformly from `[low, high)`
pub fn uniform<R: Rng>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> Tensor {
    let data = ArrayD::from_shape_simple_fn(IxDyn(shape), || rng.random_range(low..high));
    Tensor::new(data, false)
}

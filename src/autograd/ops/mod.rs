//! Autograd operations with backward passes
//!
//! This module provides differentiable operations for automatic differentiation.
//! Image tensors are laid out NHWC (`[batch, height, width, channels]`).

mod activations;
mod basic;
mod conv;
mod linear;
mod loss;
mod normalize;
mod shape;

// Re-export all public operations
pub use activations::{leaky_relu, relu, sigmoid, tanh};
pub use basic::{add, add_scalar, exp, mean, mul, scale, sub, sum};
pub use conv::{conv2d, conv_transpose2d, ConvGeometry, Padding};
pub use linear::dense;
pub use loss::{bce_with_logits, kl_divergence};
pub use normalize::{batch_norm, batch_norm_inference, layer_norm, BatchStats};
pub use shape::{concat_last, reshape, slice_last, tile_spatial};

use ndarray::{Array, Array2, ArrayD, Dimension, IxDyn};

/// Copy an array into a row-major matrix view of `rows x cols`
pub(crate) fn to_matrix(a: &ArrayD<f32>, rows: usize, cols: usize) -> Array2<f32> {
    let data: Vec<f32> = a.iter().copied().collect();
    Array2::from_shape_vec((rows, cols), data).expect("element count matches rows * cols")
}

/// Reshape an owned array into `shape`, preserving logical element order
pub(crate) fn reshape_array<D: Dimension>(a: Array<f32, D>, shape: &[usize]) -> ArrayD<f32> {
    let a = if a.is_standard_layout() { a } else { a.as_standard_layout().into_owned() };
    a.into_dyn()
        .into_shape_with_order(IxDyn(shape))
        .expect("reshape preserves element count")
}

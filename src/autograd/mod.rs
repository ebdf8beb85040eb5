//! Tape-based autograd engine
//!
//! Provides automatic differentiation over n-dimensional `ndarray` tensors.
//! Every differentiable operation returns a [`Tensor`] carrying a
//! [`BackwardOp`]; [`backward`] walks the recorded graph once in reverse
//! topological order, so tensors consumed by several operations (residual
//! skips, shared discriminator weights) receive the sum of all their
//! gradient contributions.
//!
//! ```
//! use pintor::autograd::{backward, mean, mul, Tensor};
//!
//! let x = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
//! let mut loss = mean(&mul(&x, &x));
//! backward(&mut loss, None);
//!
//! let grad = x.grad().expect("x requires grad");
//! assert!((grad[[2]] - 2.0).abs() < 1e-6);
//! ```

mod backward;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::{GradCell, Tensor};

use ndarray::ArrayD;

/// Perform backward pass on a tensor
///
/// Seeds the tensor's gradient with `grad_output` (ones when `None`) and
/// propagates through every op that produced it.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ArrayD<f32>>) {
    let seed = grad_output.unwrap_or_else(|| ArrayD::ones(tensor.data().raw_dim()));
    tensor.set_grad(seed);

    if let Some(op) = tensor.backward_op() {
        backward::run_backward(op);
    }
}

//! Fully connected layer operation

use super::{reshape_array, to_matrix};
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array2, Axis};
use std::rc::Rc;

/// Dense projection `x @ w + b`
///
/// `x` is `[batch, in]`, `w` is `[in, out]`, `b` is `[out]`; the result is
/// `[batch, out]`.
pub fn dense(x: &Tensor, w: &Tensor, b: &Tensor) -> Tensor {
    assert_eq!(x.shape().len(), 2, "dense: input must be [batch, features]");
    let (batch, in_dim) = (x.shape()[0], x.shape()[1]);
    assert!(
        w.shape().len() == 2 && w.shape()[0] == in_dim,
        "dense: kernel {:?} does not accept {in_dim} input features",
        w.shape()
    );
    let out_dim = w.shape()[1];
    assert_eq!(b.shape(), &[out_dim], "dense: bias must be [out]");

    let x_mat = to_matrix(x.data(), batch, in_dim);
    let w_mat = to_matrix(w.data(), in_dim, out_dim);
    let b_row = b.data().view().into_shape_with_order(out_dim).expect("bias is 1-d");
    let out = x_mat.dot(&w_mat) + &b_row;

    let requires_grad = x.requires_grad() || w.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(out.into_dyn(), requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DenseBackward {
            x: x.clone(),
            w: w.clone(),
            b: b.clone(),
            x_mat,
            w_mat,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DenseBackward {
    x: Tensor,
    w: Tensor,
    b: Tensor,
    x_mat: Array2<f32>,
    w_mat: Array2<f32>,
    result_grad: GradCell,
}

impl BackwardOp for DenseBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (batch, out_dim) = (self.x_mat.nrows(), self.w_mat.ncols());
            let grad_mat = to_matrix(grad, batch, out_dim);

            if self.x.requires_grad() {
                // ∂L/∂x = ∂L/∂y @ wᵀ
                let grad_x = grad_mat.dot(&self.w_mat.t());
                self.x.accumulate_grad(reshape_array(grad_x, self.x.shape()));
            }
            if self.w.requires_grad() {
                // ∂L/∂w = xᵀ @ ∂L/∂y
                let grad_w = self.x_mat.t().dot(&grad_mat);
                self.w.accumulate_grad(reshape_array(grad_w, self.w.shape()));
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad_mat.sum_axis(Axis(0)).into_dyn());
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.w.clone(), self.b.clone()]
    }
}

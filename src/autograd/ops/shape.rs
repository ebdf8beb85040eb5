//! Shape autograd operations: reshape, concat, slice, spatial tiling

use super::{reshape_array, to_matrix};
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{concatenate, s, Array2, Axis};
use std::rc::Rc;

/// View a tensor with a new shape of the same element count
pub fn reshape(a: &Tensor, shape: &[usize]) -> Tensor {
    assert_eq!(
        shape.iter().product::<usize>(),
        a.len(),
        "reshape: {:?} cannot hold {:?}",
        shape,
        a.shape()
    );
    let data = reshape_array(a.data().clone(), shape);
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ReshapeBackward { a: a.clone(), result_grad: result.grad_cell() });
        result.set_backward_op(backward_op);
    }

    result
}

struct ReshapeBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for ReshapeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(reshape_array(grad.clone(), self.a.shape()));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

fn split_last(t: &Tensor) -> (usize, usize) {
    let last = *t.shape().last().expect("tensor has at least one axis");
    (t.len() / last.max(1), last)
}

/// Concatenate two tensors along their last axis
///
/// All leading axes must agree.
pub fn concat_last(a: &Tensor, b: &Tensor) -> Tensor {
    let rank = a.shape().len();
    assert_eq!(rank, b.shape().len(), "concat_last: ranks differ");
    assert_eq!(
        &a.shape()[..rank - 1],
        &b.shape()[..rank - 1],
        "concat_last: leading axes differ"
    );
    let (rows, a_cols) = split_last(a);
    let (_, b_cols) = split_last(b);
    let joined = concatenate(
        Axis(1),
        &[to_matrix(a.data(), rows, a_cols).view(), to_matrix(b.data(), rows, b_cols).view()],
    )
    .expect("row counts agree");

    let mut shape = a.shape().to_vec();
    shape[rank - 1] = a_cols + b_cols;
    let data = reshape_array(joined, &shape);

    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(ConcatBackward {
            a: a.clone(),
            b: b.clone(),
            split: a_cols,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ConcatBackward {
    a: Tensor,
    b: Tensor,
    split: usize,
    result_grad: GradCell,
}

impl BackwardOp for ConcatBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (rows, cols) = (grad.len() / grad.shape()[grad.ndim() - 1], grad.shape()[grad.ndim() - 1]);
            let grad2 = to_matrix(grad, rows, cols);
            if self.a.requires_grad() {
                let part = grad2.slice(s![.., ..self.split]).to_owned();
                self.a.accumulate_grad(reshape_array(part, self.a.shape()));
            }
            if self.b.requires_grad() {
                let part = grad2.slice(s![.., self.split..]).to_owned();
                self.b.accumulate_grad(reshape_array(part, self.b.shape()));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

/// Columns `start..end` of the last axis
pub fn slice_last(a: &Tensor, start: usize, end: usize) -> Tensor {
    let (rows, cols) = split_last(a);
    assert!(start < end && end <= cols, "slice_last: {start}..{end} outside 0..{cols}");
    let part = to_matrix(a.data(), rows, cols).slice(s![.., start..end]).to_owned();

    let mut shape = a.shape().to_vec();
    let rank = shape.len();
    shape[rank - 1] = end - start;
    let data = reshape_array(part, &shape);

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SliceBackward {
            a: a.clone(),
            start,
            end,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SliceBackward {
    a: Tensor,
    start: usize,
    end: usize,
    result_grad: GradCell,
}

impl BackwardOp for SliceBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let (rows, cols) = split_last(&self.a);
                let mut full = Array2::zeros((rows, cols));
                full.slice_mut(s![.., self.start..self.end])
                    .assign(&to_matrix(grad, rows, self.end - self.start));
                self.a.accumulate_grad(reshape_array(full, self.a.shape()));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Replicate a `[batch, channels]` tensor over a `height x width` grid
///
/// Returns `[batch, height, width, channels]`.
pub fn tile_spatial(a: &Tensor, height: usize, width: usize) -> Tensor {
    assert_eq!(a.shape().len(), 2, "tile_spatial: input must be [batch, channels]");
    let (batch, channels) = (a.shape()[0], a.shape()[1]);
    let data = to_matrix(a.data(), batch, channels)
        .into_shape_with_order((batch, 1, 1, channels))
        .expect("rank-2 input gains two unit axes")
        .broadcast((batch, height, width, channels))
        .expect("unit axes broadcast")
        .to_owned()
        .into_dyn();

    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(TileBackward { a: a.clone(), result_grad: result.grad_cell() });
        result.set_backward_op(backward_op);
    }

    result
}

struct TileBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for TileBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                let summed = grad.sum_axis(Axis(1)).sum_axis(Axis(1));
                self.a.accumulate_grad(summed);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

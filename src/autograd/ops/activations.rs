//! Activation function autograd operations: relu, leaky_relu, tanh, sigmoid

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::ArrayD;
use std::rc::Rc;

/// Element-wise activation whose derivative is a precomputed mask/slope
fn pointwise(a: &Tensor, data: ArrayD<f32>, derivative: ArrayD<f32>) -> Tensor {
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(PointwiseBackward {
            a: a.clone(),
            derivative,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct PointwiseBackward {
    a: Tensor,
    derivative: ArrayD<f32>,
    result_grad: GradCell,
}

impl BackwardOp for PointwiseBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.derivative);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// ReLU activation
pub fn relu(a: &Tensor) -> Tensor {
    leaky_relu(a, 0.0)
}

/// Leaky ReLU: `x` for positive inputs, `alpha * x` otherwise
pub fn leaky_relu(a: &Tensor, alpha: f32) -> Tensor {
    let data = a.data().mapv(|x| if x > 0.0 { x } else { alpha * x });
    let derivative = a.data().mapv(|x| if x > 0.0 { 1.0 } else { alpha });
    pointwise(a, data, derivative)
}

/// Hyperbolic tangent, bounding outputs to `[-1, 1]`
pub fn tanh(a: &Tensor) -> Tensor {
    let data = a.data().mapv(f32::tanh);
    // ∂tanh/∂x = 1 - tanh²(x)
    let derivative = data.mapv(|t| 1.0 - t * t);
    pointwise(a, data, derivative)
}

/// Logistic sigmoid, bounding outputs to `(0, 1)`
pub fn sigmoid(a: &Tensor) -> Tensor {
    let data = a.data().mapv(stable_sigmoid);
    // ∂σ/∂x = σ(x)(1 - σ(x))
    let derivative = data.mapv(|s| s * (1.0 - s));
    pointwise(a, data, derivative)
}

/// Sigmoid that does not overflow for large negative inputs
pub(crate) fn stable_sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

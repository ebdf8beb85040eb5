//! Loss autograd operations: binary cross-entropy on logits, Gaussian KL

use super::activations::stable_sigmoid;
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::ArrayD;
use std::rc::Rc;

/// Mean binary cross-entropy between `sigmoid(logits)` and a constant label
///
/// Uses `max(x, 0) - x*t + ln(1 + e^{-|x|})`, which stays finite for large
/// logits.
pub fn bce_with_logits(logits: &Tensor, target: f32) -> Tensor {
    let n = logits.len().max(1) as f32;
    let total: f32 = logits
        .data()
        .iter()
        .map(|&x| x.max(0.0) - x * target + (-x.abs()).exp().ln_1p())
        .sum();
    let data = ArrayD::from_elem(vec![1], total / n);

    let requires_grad = logits.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(BceBackward {
            logits: logits.clone(),
            target,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct BceBackward {
    logits: Tensor,
    target: f32,
    result_grad: GradCell,
}

impl BackwardOp for BceBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.logits.requires_grad() {
                let upstream = grad.iter().next().copied().unwrap_or(0.0);
                let n = self.logits.len().max(1) as f32;
                // ∂L/∂x = (σ(x) - t) / n
                let grad_logits = self
                    .logits
                    .data()
                    .mapv(|x| (stable_sigmoid(x) - self.target) * upstream / n);
                self.logits.accumulate_grad(grad_logits);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.logits.clone()]
    }
}

/// KL divergence of `N(mu, exp(log_sigma)^2)` from the standard normal,
/// averaged over every element
///
/// `mean(-log_sigma + 0.5 * (-1 + exp(2 log_sigma) + mu^2))`
pub fn kl_divergence(mu: &Tensor, log_sigma: &Tensor) -> Tensor {
    assert_eq!(mu.shape(), log_sigma.shape(), "kl_divergence: mu and log_sigma differ in shape");
    let n = mu.len().max(1) as f32;
    let total: f32 = mu
        .data()
        .iter()
        .zip(log_sigma.data().iter())
        .map(|(&m, &ls)| -ls + 0.5 * (-1.0 + (2.0 * ls).exp() + m * m))
        .sum();
    let data = ArrayD::from_elem(vec![1], total / n);

    let requires_grad = mu.requires_grad() || log_sigma.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(KlBackward {
            mu: mu.clone(),
            log_sigma: log_sigma.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct KlBackward {
    mu: Tensor,
    log_sigma: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for KlBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let scale = grad.iter().next().copied().unwrap_or(0.0) / self.mu.len().max(1) as f32;
            if self.mu.requires_grad() {
                self.mu.accumulate_grad(self.mu.data() * scale);
            }
            if self.log_sigma.requires_grad() {
                // ∂/∂ls = -1 + exp(2 ls)
                let grad_ls = self.log_sigma.data().mapv(|ls| ((2.0 * ls).exp() - 1.0) * scale);
                self.log_sigma.accumulate_grad(grad_ls);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.mu.clone(), self.log_sigma.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bce_at_zero_logit_is_ln2() {
        let logits = Tensor::from_vec(vec![0.0, 0.0], false);
        assert_abs_diff_eq!(bce_with_logits(&logits, 1.0).item(), std::f32::consts::LN_2, epsilon = 1e-6);
        assert_abs_diff_eq!(bce_with_logits(&logits, 0.0).item(), std::f32::consts::LN_2, epsilon = 1e-6);
    }

    #[test]
    fn test_bce_is_finite_for_extreme_logits() {
        let logits = Tensor::from_vec(vec![-500.0, 500.0], false);
        let loss = bce_with_logits(&logits, 1.0).item();
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, 250.0, epsilon = 1e-3);
    }

    #[test]
    fn test_kl_is_zero_for_standard_normal() {
        let mu = Tensor::zeros(&[2, 3], false);
        let log_sigma = Tensor::zeros(&[2, 3], false);
        assert_abs_diff_eq!(kl_divergence(&mu, &log_sigma).item(), 0.0, epsilon = 1e-7);
    }

    #[test]
    fn test_kl_grows_with_mean_offset() {
        let mu = Tensor::from_vec(vec![1.0, -1.0], false);
        let log_sigma = Tensor::zeros(&[2], false);
        assert_abs_diff_eq!(kl_divergence(&mu, &log_sigma).item(), 0.5, epsilon = 1e-6);
    }
}

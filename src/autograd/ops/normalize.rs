//! Normalization autograd operations: batch_norm, layer_norm
//!
//! Both normalize NHWC activations and apply a per-channel affine
//! transform `gamma * x̂ + beta` over the last axis.

use super::{reshape_array, to_matrix};
use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::{Array1, Array2, Array3, Axis};
use std::rc::Rc;

/// Per-channel statistics of a training batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub mean: Array1<f32>,
    /// Biased variance
    pub var: Array1<f32>,
}

fn channels(op: &str, x: &Tensor, gamma: &Tensor, beta: &Tensor) -> usize {
    let c = *x.shape().last().unwrap_or_else(|| panic!("{op}: input has no channel axis"));
    assert_eq!(gamma.shape(), &[c], "{op}: gamma must be [channels]");
    assert_eq!(beta.shape(), &[c], "{op}: beta must be [channels]");
    c
}

fn channel_row(t: &Tensor) -> Array1<f32> {
    Array1::from_iter(t.data().iter().copied())
}

/// Batch normalization using the statistics of the current batch
///
/// Every axis except the last is reduced. Returns the output together with
/// the batch statistics so the caller can update running averages.
pub fn batch_norm(x: &Tensor, gamma: &Tensor, beta: &Tensor, epsilon: f32) -> (Tensor, BatchStats) {
    let c = channels("batch_norm", x, gamma, beta);
    let rows = x.len() / c;
    let x2 = to_matrix(x.data(), rows, c);

    let mean = x2.mean_axis(Axis(0)).expect("batch_norm over a non-empty batch");
    let centered = &x2 - &mean;
    let var = centered.mapv(|v| v * v).mean_axis(Axis(0)).expect("batch_norm over a non-empty batch");
    let inv_std = var.mapv(|v| 1.0 / (v + epsilon).sqrt());
    let normalized = &centered * &inv_std;

    let out = channel_affine(x, gamma, beta, normalized, inv_std, true);
    (out, BatchStats { mean, var })
}

/// Batch normalization with fixed (running) statistics
pub fn batch_norm_inference(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    stats: &BatchStats,
    epsilon: f32,
) -> Tensor {
    let c = channels("batch_norm_inference", x, gamma, beta);
    assert_eq!(stats.mean.len(), c, "batch_norm_inference: statistics must be [channels]");
    let x2 = to_matrix(x.data(), x.len() / c, c);
    let inv_std = stats.var.mapv(|v| 1.0 / (v + epsilon).sqrt());
    let normalized = (&x2 - &stats.mean) * &inv_std;
    channel_affine(x, gamma, beta, normalized, inv_std, false)
}

fn channel_affine(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
    batch_statistics: bool,
) -> Tensor {
    let out = &normalized * &channel_row(gamma) + &channel_row(beta);
    let data = reshape_array(out, x.shape());

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(BatchNormBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            normalized,
            inv_std,
            batch_statistics,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct BatchNormBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
    batch_statistics: bool,
    result_grad: GradCell,
}

impl BackwardOp for BatchNormBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let (rows, c) = self.normalized.dim();
            let grad2 = to_matrix(grad, rows, c);

            if self.beta.requires_grad() {
                self.beta.accumulate_grad(grad2.sum_axis(Axis(0)).into_dyn());
            }
            if self.gamma.requires_grad() {
                let grad_gamma = (&grad2 * &self.normalized).sum_axis(Axis(0));
                self.gamma.accumulate_grad(grad_gamma.into_dyn());
            }
            if self.x.requires_grad() {
                let grad_norm = &grad2 * &channel_row(&self.gamma);
                let grad_x = if self.batch_statistics {
                    // (1/σ)(ĝ - mean(ĝ) - x̂·mean(ĝ·x̂)) per channel
                    let m1 = grad_norm.mean_axis(Axis(0)).expect("non-empty batch");
                    let m2 = (&grad_norm * &self.normalized)
                        .mean_axis(Axis(0))
                        .expect("non-empty batch");
                    (&grad_norm - &m1 - &self.normalized * &m2) * &self.inv_std
                } else {
                    grad_norm * &self.inv_std
                };
                self.x.accumulate_grad(reshape_array(grad_x, self.x.shape()));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.gamma.clone(), self.beta.clone()]
    }
}

/// Layer normalization over every non-batch element of each sample
///
/// LayerNorm(x) = gamma * (x - mean) / sqrt(var + epsilon) + beta, where the
/// statistics are per sample and `gamma`/`beta` are per channel.
pub fn layer_norm(x: &Tensor, gamma: &Tensor, beta: &Tensor, epsilon: f32) -> Tensor {
    let c = channels("layer_norm", x, gamma, beta);
    let batch = x.shape()[0];
    let per_sample = x.len() / batch.max(1);
    let positions = per_sample / c;
    let x3 = to_matrix(x.data(), batch, per_sample)
        .into_shape_with_order((batch, positions, c))
        .expect("per-sample elements split into positions x channels");

    let mean = sample_mean(&x3);
    let centered = &x3 - &mean;
    let var = sample_mean(&centered.mapv(|v| v * v));
    let inv_std = var.mapv(|v| 1.0 / (v + epsilon).sqrt());
    let normalized = &centered * &inv_std;

    let out = &normalized * &channel_row(gamma) + &channel_row(beta);
    let data = reshape_array(out, x.shape());

    let requires_grad = x.requires_grad() || gamma.requires_grad() || beta.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LayerNormBackward {
            x: x.clone(),
            gamma: gamma.clone(),
            beta: beta.clone(),
            normalized,
            inv_std,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Mean over positions and channels, kept as `[batch, 1, 1]` for broadcasting
fn sample_mean(a: &Array3<f32>) -> Array3<f32> {
    let batch = a.dim().0;
    let mean = a
        .mean_axis(Axis(2))
        .and_then(|m| m.mean_axis(Axis(1)))
        .expect("layer_norm over non-empty samples");
    mean.into_shape_with_order((batch, 1, 1)).expect("one statistic per sample")
}

struct LayerNormBackward {
    x: Tensor,
    gamma: Tensor,
    beta: Tensor,
    normalized: Array3<f32>,
    inv_std: Array3<f32>,
    result_grad: GradCell,
}

impl BackwardOp for LayerNormBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let dim = self.normalized.dim();
            let grad3 = to_matrix(grad, dim.0, dim.1 * dim.2)
                .into_shape_with_order(dim)
                .expect("gradient matches forward output");

            if self.beta.requires_grad() {
                let grad_beta = grad3.sum_axis(Axis(0)).sum_axis(Axis(0));
                self.beta.accumulate_grad(grad_beta.into_dyn());
            }
            if self.gamma.requires_grad() {
                let grad_gamma = (&grad3 * &self.normalized).sum_axis(Axis(0)).sum_axis(Axis(0));
                self.gamma.accumulate_grad(grad_gamma.into_dyn());
            }
            if self.x.requires_grad() {
                let grad_norm = &grad3 * &channel_row(&self.gamma);
                let m1 = sample_mean(&grad_norm);
                let m2 = sample_mean(&(&grad_norm * &self.normalized));
                let grad_x = (&grad_norm - &m1 - &self.normalized * &m2) * &self.inv_std;
                self.x.accumulate_grad(reshape_array(grad_x, self.x.shape()));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.gamma.clone(), self.beta.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_affine(c: usize) -> (Tensor, Tensor) {
        (Tensor::ones(&[c], false), Tensor::zeros(&[c], false))
    }

    fn sample_input() -> Tensor {
        let values: Vec<f32> = (0..24).map(|i| (i as f32 * 0.7).sin() * 3.0 + 1.0).collect();
        Tensor::from_shape_vec(&[2, 2, 3, 2], values, false).expect("valid shape")
    }

    #[test]
    fn test_batch_norm_centers_each_channel() {
        let (gamma, beta) = unit_affine(2);
        let (y, stats) = batch_norm(&sample_input(), &gamma, &beta, 1e-5);
        let y2 = to_matrix(y.data(), 12, 2);
        for c in 0..2 {
            let column = y2.column(c);
            let mean = column.sum() / 12.0;
            let var = column.mapv(|v| (v - mean).powi(2)).sum() / 12.0;
            assert!(mean.abs() < 1e-5, "channel {c} mean {mean}");
            assert!((var - 1.0).abs() < 1e-3, "channel {c} var {var}");
        }
        assert_eq!(stats.mean.len(), 2);
    }

    #[test]
    fn test_batch_norm_inference_uses_given_stats() {
        let (gamma, beta) = unit_affine(1);
        let x = Tensor::from_vec(vec![3.0, 5.0], false);
        let x = Tensor::new(x.data().clone().into_shape_with_order(vec![2, 1]).expect("reshape"), false);
        let stats = BatchStats { mean: Array1::from(vec![1.0]), var: Array1::from(vec![4.0]) };
        let y = batch_norm_inference(&x, &gamma, &beta, &stats, 0.0);
        assert_eq!(y.data().iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_layer_norm_normalizes_each_sample() {
        let (gamma, beta) = unit_affine(2);
        let y = layer_norm(&sample_input(), &gamma, &beta, 1e-5);
        let y2 = to_matrix(y.data(), 2, 12);
        for row in y2.rows() {
            let mean = row.sum() / 12.0;
            let var = row.mapv(|v| (v - mean).powi(2)).sum() / 12.0;
            assert!(mean.abs() < 1e-5);
            assert!((var - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_layer_norm_applies_channel_affine() {
        let gamma = Tensor::from_vec(vec![2.0, 0.0], false);
        let beta = Tensor::from_vec(vec![0.0, 7.0], false);
        let y = layer_norm(&sample_input(), &gamma, &beta, 1e-5);
        let y2 = to_matrix(y.data(), 12, 2);
        assert!(y2.column(1).iter().all(|&v| (v - 7.0).abs() < 1e-6));
    }
}

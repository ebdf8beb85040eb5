//! Test utilities for gradient checking

use crate::autograd::{backward, mul, sum, Tensor};

/// Finite difference gradient checker
///
/// Computes numerical gradient using central difference:
/// f'(x) ≈ (f(x + h) - f(x - h)) / (2h)
pub fn finite_difference<F>(f: F, x: &[f32], epsilon: f32) -> Vec<f32>
where
    F: Fn(&[f32]) -> f32,
{
    let mut grad = vec![0.0; x.len()];
    let mut x_plus = x.to_vec();
    let mut x_minus = x.to_vec();

    for i in 0..x.len() {
        x_plus[i] = x[i] + epsilon;
        x_minus[i] = x[i] - epsilon;

        let f_plus = f(&x_plus);
        let f_minus = f(&x_minus);

        grad[i] = (f_plus - f_minus) / (2.0 * epsilon);

        x_plus[i] = x[i];
        x_minus[i] = x[i];
    }

    grad
}

/// Fixed, non-uniform weights so `sum(w * f(x))` exercises every output
pub fn output_weights(len: usize) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * 0.7 + 0.3).sin()).collect()
}

/// Analytical and numerical gradients of `sum(w ⊙ f(x))` w.r.t. `x`
pub fn gradient_pair<F>(f: F, shape: &[usize], x: &[f32], epsilon: f32) -> (Vec<f32>, Vec<f32>)
where
    F: Fn(&Tensor) -> Tensor,
{
    let input = Tensor::from_shape_vec(shape, x.to_vec(), true).expect("shape matches data");
    let out = f(&input);
    let weights = output_weights(out.len());
    let w = Tensor::from_shape_vec(out.shape(), weights.clone(), false)
        .expect("weights match output");
    let mut loss = sum(&mul(&out, &w));
    backward(&mut loss, None);
    let analytical = input
        .grad()
        .expect("gradient should be available")
        .iter()
        .copied()
        .collect();

    let numerical = finite_difference(
        |values| {
            let t = Tensor::from_shape_vec(shape, values.to_vec(), false).expect("shape");
            f(&t).data().iter().zip(&weights).map(|(a, w)| a * w).sum()
        },
        x,
        epsilon,
    );

    (analytical, numerical)
}

/// Largest relative mismatch `|a - n| / (1 + |n|)`
pub fn max_relative_error(analytical: &[f32], numerical: &[f32]) -> f32 {
    analytical
        .iter()
        .zip(numerical)
        .map(|(a, n)| (a - n).abs() / (1.0 + n.abs()))
        .fold(0.0, f32::max)
}

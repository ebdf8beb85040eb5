//! Property-based tests for elementwise, reduction, dense and loss operations

use super::test_utils::{finite_difference, gradient_pair, max_relative_error};
use crate::autograd::{
    add, backward, bce_with_logits, dense, exp, kl_divergence, leaky_relu, mean, mul, relu,
    sigmoid, tanh, Tensor,
};
use proptest::prelude::*;

fn away_from_zero() -> impl Strategy<Value = f32> {
    (-5.0f32..5.0).prop_map(|v| if v.abs() < 0.1 { if v >= 0.0 { 0.2 } else { -0.2 } } else { v })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_add_backward_gradient_check(
        xy in prop::collection::vec((-10.0f32..10.0, -10.0f32..10.0), 2..20)
    ) {
        let (x, y): (Vec<f32>, Vec<f32>) = xy.into_iter().unzip();

        let a = Tensor::from_vec(x.clone(), true);
        let b = Tensor::from_vec(y.clone(), true);
        let mut c = add(&a, &b);

        let c_len = c.len();
        backward(&mut c, Some(ndarray::Array1::ones(c_len).into_dyn()));

        let analytical_a = a.grad().expect("gradient should be available");
        let numerical_a = finite_difference(
            |x_val| {
                let t_a = Tensor::from_vec(x_val.to_vec(), false);
                let t_b = Tensor::from_vec(y.clone(), false);
                add(&t_a, &t_b).data().sum()
            },
            &x,
            1e-3,
        );

        for i in 0..x.len() {
            let diff = (analytical_a[[i]] - numerical_a[i]).abs();
            prop_assert!(diff < 0.1, "Gradient mismatch at index {}: analytical={}, numerical={}",
                        i, analytical_a[[i]], numerical_a[i]);
        }
    }

    #[test]
    fn prop_mul_backward_gradient_check(
        xy in prop::collection::vec((-5.0f32..5.0, -5.0f32..5.0), 2..20)
    ) {
        let (x, y): (Vec<f32>, Vec<f32>) = xy.into_iter().unzip();
        let other = Tensor::from_vec(y, false);
        let (analytical, numerical) =
            gradient_pair(|t| mul(t, &other), &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_relu_backward_gradient_check(x in prop::collection::vec(away_from_zero(), 1..50)) {
        let (analytical, numerical) = gradient_pair(relu, &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_leaky_relu_backward_gradient_check(x in prop::collection::vec(away_from_zero(), 1..50)) {
        let (analytical, numerical) =
            gradient_pair(|t| leaky_relu(t, 0.2), &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_tanh_backward_gradient_check(x in prop::collection::vec(-3.0f32..3.0, 2..20)) {
        let (analytical, numerical) = gradient_pair(tanh, &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_sigmoid_backward_gradient_check(x in prop::collection::vec(-6.0f32..6.0, 2..20)) {
        let (analytical, numerical) = gradient_pair(sigmoid, &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_exp_backward_gradient_check(x in prop::collection::vec(-2.0f32..2.0, 2..20)) {
        let (analytical, numerical) = gradient_pair(exp, &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_dense_input_gradient_check(
        x in prop::collection::vec(-2.0f32..2.0, 6),
        w in prop::collection::vec(-1.0f32..1.0, 12),
    ) {
        let kernel = Tensor::from_shape_vec(&[3, 4], w, false).expect("shape");
        let bias = Tensor::from_vec(vec![0.1, -0.2, 0.3, 0.0], false);
        let (analytical, numerical) =
            gradient_pair(|t| dense(t, &kernel, &bias), &[2, 3], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_dense_kernel_gradient_check(
        x in prop::collection::vec(-2.0f32..2.0, 6),
        w in prop::collection::vec(-1.0f32..1.0, 12),
    ) {
        let input = Tensor::from_shape_vec(&[2, 3], x, false).expect("shape");
        let bias = Tensor::zeros(&[4], false);
        let (analytical, numerical) =
            gradient_pair(|k| dense(&input, k, &bias), &[3, 4], &w, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_bce_backward_gradient_check(x in prop::collection::vec(-4.0f32..4.0, 2..16), target in 0u8..2) {
        let t = f32::from(target);
        let (analytical, numerical) =
            gradient_pair(|l| bce_with_logits(l, t), &[x.len()], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_kl_log_sigma_gradient_check(
        ls in prop::collection::vec(-1.0f32..1.0, 4),
        mu in prop::collection::vec(-1.0f32..1.0, 4),
    ) {
        let mu = Tensor::from_shape_vec(&[2, 2], mu, false).expect("shape");
        let (analytical, numerical) =
            gradient_pair(|l| kl_divergence(&mu, l), &[2, 2], &ls, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_mean_spreads_gradient_evenly(x in prop::collection::vec(-5.0f32..5.0, 1..30)) {
        let a = Tensor::from_vec(x.clone(), true);
        let mut m = mean(&a);
        backward(&mut m, None);
        let grad = a.grad().expect("gradient should be available");
        let expected = 1.0 / x.len() as f32;
        prop_assert!(grad.iter().all(|g| (g - expected).abs() < 1e-6));
    }
}

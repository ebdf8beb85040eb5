//! Property-based gradient checks for batch and layer normalization

use super::test_utils::{gradient_pair, max_relative_error};
use crate::autograd::{batch_norm, batch_norm_inference, layer_norm, BatchStats, Tensor};
use ndarray::Array1;
use proptest::prelude::*;

/// Random values on top of a fixed ramp so no channel or sample is constant
fn spread(len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-0.5f32..0.5, len).prop_map(|noise| {
        noise
            .into_iter()
            .enumerate()
            .map(|(i, n)| (i as f32 * 1.3).sin() * 2.0 + n)
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_batch_norm_input_gradient_check(x in spread(4 * 2 * 2 * 3)) {
        let gamma = Tensor::from_vec(vec![1.0, 0.5, 2.0], false);
        let beta = Tensor::from_vec(vec![0.0, 0.1, -0.3], false);
        let (analytical, numerical) = gradient_pair(
            |t| batch_norm(t, &gamma, &beta, 1e-5).0,
            &[4, 2, 2, 3],
            &x,
            1e-2,
        );
        prop_assert!(max_relative_error(&analytical, &numerical) < 5e-2);
    }

    #[test]
    fn prop_batch_norm_gamma_gradient_check(x in spread(6 * 2), g in prop::collection::vec(0.5f32..1.5, 2)) {
        let input = Tensor::from_shape_vec(&[6, 2], x, false).expect("shape");
        let beta = Tensor::zeros(&[2], false);
        let (analytical, numerical) =
            gradient_pair(|gamma| batch_norm(&input, gamma, &beta, 1e-5).0, &[2], &g, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_batch_norm_inference_gradient_check(x in spread(3 * 2)) {
        let gamma = Tensor::from_vec(vec![1.5, -0.5], false);
        let beta = Tensor::zeros(&[2], false);
        let stats = BatchStats { mean: Array1::from(vec![0.2, -0.1]), var: Array1::from(vec![0.8, 1.7]) };
        let (analytical, numerical) = gradient_pair(
            |t| batch_norm_inference(t, &gamma, &beta, &stats, 1e-5),
            &[3, 2],
            &x,
            1e-2,
        );
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }

    #[test]
    fn prop_layer_norm_input_gradient_check(x in spread(2 * 2 * 2 * 3)) {
        let gamma = Tensor::from_vec(vec![1.0, 0.7, 1.3], false);
        let beta = Tensor::from_vec(vec![0.2, 0.0, -0.2], false);
        let (analytical, numerical) =
            gradient_pair(|t| layer_norm(t, &gamma, &beta, 1e-5), &[2, 2, 2, 3], &x, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 5e-2);
    }

    #[test]
    fn prop_layer_norm_beta_gradient_check(x in spread(2 * 4), b in prop::collection::vec(-1.0f32..1.0, 2)) {
        let input = Tensor::from_shape_vec(&[2, 2, 2], x, false).expect("shape");
        let gamma = Tensor::ones(&[2], false);
        let (analytical, numerical) =
            gradient_pair(|beta| layer_norm(&input, &gamma, beta, 1e-5), &[2], &b, 1e-2);
        prop_assert!(max_relative_error(&analytical, &numerical) < 1e-2);
    }
}

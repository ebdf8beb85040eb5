//! Property-based tests for configuration validation

use super::tests::create_valid_spec;
use super::validator::{validate_model, validate_spec};
use crate::model::{ImageShape, ModelConfig};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_multiples_of_16_are_valid(k in 1usize..16, c in prop::sample::select(vec![1usize, 3])) {
        let size = 16 * k;
        let config = ModelConfig {
            output_size: size,
            image_shape: ImageShape { h: size, w: size, c },
            ..ModelConfig::default()
        };
        prop_assert!(validate_model(&config).is_ok());
    }

    #[test]
    fn prop_other_sizes_are_rejected(size in 1usize..512) {
        prop_assume!(size % 16 != 0);
        let config = ModelConfig {
            output_size: size,
            image_shape: ImageShape { h: size, w: size, c: 3 },
            ..ModelConfig::default()
        };
        prop_assert!(validate_model(&config).is_err());
    }

    #[test]
    fn prop_valid_training_ranges_pass(
        batch_size in 1usize..256,
        n_critic in 1usize..10,
        period in 1usize..1000,
        lr in 1e-6f32..1.0,
        lambda in 0.0f32..100.0,
    ) {
        let mut spec = create_valid_spec();
        spec.training.batch_size = batch_size;
        spec.training.n_critic = n_critic;
        spec.training.checkpoint_period = period;
        spec.training.checkpoint_offset = period / 2;
        spec.training.gradient_penalty = lambda;
        spec.optimizer.generator.lr = lr;
        prop_assert!(validate_spec(&spec).is_ok());
    }
}

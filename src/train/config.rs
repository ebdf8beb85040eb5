//! Training loop configuration

use crate::model::LossKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hyperparameters and output locations of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub batch_size: usize,
    /// Images in each sample grid; need not equal `batch_size`
    pub sample_num: usize,
    /// Exclusive upper bound of the step counter
    pub max_steps: usize,
    /// Discriminator updates per generator update
    pub n_critic: usize,
    pub sample_period: usize,
    /// Checkpoint when `step % checkpoint_period == checkpoint_offset`
    pub checkpoint_period: usize,
    pub checkpoint_offset: usize,
    /// Retained checkpoint files; 0 keeps all
    pub checkpoints_to_keep: usize,
    pub loss: LossKind,
    /// Gradient penalty weight `lambda`; 0 disables the penalty
    pub gradient_penalty: f32,
    /// Weight of the conditioning-augmentation KL term
    pub kl_coeff: f32,
    /// Caption embeddings averaged per training image
    pub caption_window: usize,
    /// Seed for weights, noise and batch order; OS entropy when absent
    pub seed: Option<u64>,
    pub sample_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            sample_num: 64,
            max_steps: 600_000,
            n_critic: 5,
            sample_period: 100,
            checkpoint_period: 500,
            checkpoint_offset: 2,
            checkpoints_to_keep: 5,
            loss: LossKind::Wasserstein,
            gradient_penalty: 10.0,
            kl_coeff: 2.0,
            caption_window: 4,
            seed: None,
            sample_dir: PathBuf::from("output/samples"),
            checkpoint_dir: PathBuf::from("output/checkpoints"),
            logs_dir: PathBuf::from("output/logs"),
        }
    }
}

impl TrainConfig {
    /// Place the sample, checkpoint and log directories under `root`
    pub fn with_output_dir(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.sample_dir = root.join("samples");
        self.checkpoint_dir = root.join("checkpoints");
        self.logs_dir = root.join("logs");
        self
    }

    pub fn is_generator_step(&self, step: usize) -> bool {
        step % self.n_critic == 0
    }

    pub fn is_sample_step(&self, step: usize) -> bool {
        step % self.sample_period == 0
    }

    pub fn is_checkpoint_step(&self, step: usize) -> bool {
        step % self.checkpoint_period == self.checkpoint_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cadence() {
        let config = TrainConfig::default();
        assert!(config.is_generator_step(10));
        assert!(!config.is_generator_step(11));
        assert!(config.is_checkpoint_step(502));
        assert!(!config.is_checkpoint_step(500));
        assert!(config.is_sample_step(0));
    }

    #[test]
    fn test_output_dir_moves_all_outputs() {
        let config = TrainConfig::default().with_output_dir("/tmp/run");
        assert_eq!(config.sample_dir, PathBuf::from("/tmp/run/samples"));
        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/run/checkpoints"));
        assert_eq!(config.logs_dir, PathBuf::from("/tmp/run/logs"));
    }

    #[test]
    fn test_yaml_overrides_subset() {
        let config: TrainConfig =
            serde_yaml::from_str("batch_size: 8\nloss: cls\nseed: 3\n").expect("valid yaml");
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.loss, LossKind::Cls);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.n_critic, 5);
    }
}

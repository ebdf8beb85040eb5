//! YAML schema of a training run

use crate::model::ModelConfig;
use crate::optim::AdamConfig;
use crate::train::TrainConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete description of a training run
///
/// ```yaml
/// model:
///   output_size: 64
///   embed_dim: 1024
/// training:
///   batch_size: 64
///   loss: wasserstein
/// optimizer:
///   generator: { lr: 0.0001, beta1: 0.5, beta2: 0.9 }
/// data:
///   path: data/birds.json
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanSpec {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainConfig,
    #[serde(default)]
    pub optimizer: OptimSpec,
    pub data: DataConfig,
}

/// One Adam configuration per network
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimSpec {
    pub generator: AdamConfig,
    pub discriminator: AdamConfig,
}

/// Dataset location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON dataset file
    pub path: PathBuf,
}

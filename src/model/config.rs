//! Network configuration

use crate::nn::NormKind;
use serde::{Deserialize, Serialize};

/// Image height, width and channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub h: usize,
    pub w: usize,
    pub c: usize,
}

impl ImageShape {
    pub fn len(&self) -> usize {
        self.h * self.w * self.c
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self { h: 64, w: 64, c: 3 }
    }
}

/// Generator and discriminator hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Side length of generated images; a multiple of 16
    pub output_size: usize,
    /// Noise vector dimension
    pub z_dim: usize,
    /// Text embedding dimension
    pub embed_dim: usize,
    /// Embedding dimension after compression
    pub compressed_embed_dim: usize,
    /// Base generator filter count
    pub gf_dim: usize,
    /// Base discriminator filter count
    pub df_dim: usize,
    pub image_shape: ImageShape,
    /// Sample the compressed embedding from a learned Gaussian (adds a KL term)
    pub conditioning_augmentation: bool,
    /// Normalization used inside the discriminator
    pub discriminator_norm: NormKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            output_size: 64,
            z_dim: 100,
            embed_dim: 1024,
            compressed_embed_dim: 128,
            gf_dim: 128,
            df_dim: 64,
            image_shape: ImageShape::default(),
            conditioning_augmentation: true,
            discriminator_norm: NormKind::Layer,
        }
    }
}

impl ModelConfig {
    /// Side length of the deepest feature map
    pub fn s16(&self) -> usize {
        self.output_size / 16
    }

    pub fn channels(&self) -> usize {
        self.image_shape.c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.s16(), 4);
        assert_eq!(config.channels(), 3);
        assert_eq!(config.image_shape.len(), 64 * 64 * 3);
        assert_eq!(config.discriminator_norm, NormKind::Layer);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: ModelConfig = serde_yaml::from_str("output_size: 32\ndiscriminator_norm: batch\n")
            .expect("valid yaml");
        assert_eq!(config.output_size, 32);
        assert_eq!(config.z_dim, 100);
        assert_eq!(config.discriminator_norm, NormKind::Batch);
    }
}

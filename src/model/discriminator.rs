//! Discriminator (critic) network: (image, text embedding) -> score

use super::blocks::{Activation, ResidualBlock};
use super::config::ModelConfig;
use crate::autograd::{concat_last, leaky_relu, reshape, sigmoid, tile_spatial, Padding};
use crate::nn::{scoped, Conv2d, Dense, Mode, Module, Norm};
use crate::Tensor;
use ndarray::Array1;
use rand::Rng;

const LEAK: f32 = 0.2;

/// Per-image scores of one critic call
#[derive(Debug, Clone)]
pub struct CriticOutput {
    /// `sigmoid(logits)`, `[batch]`
    pub scores: Tensor,
    /// Pre-activation logits, `[batch]`
    pub logits: Tensor,
}

/// Strided conv with optional normalization
#[derive(Debug, Clone)]
struct DownStage {
    conv: Conv2d,
    norm: Option<Norm>,
}

impl DownStage {
    fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let h = self.conv.forward(x);
        match &self.norm {
            Some(norm) => norm.forward(&h, mode),
            None => h,
        }
    }
}

impl Module for DownStage {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.conv.named_parameters(&scoped(prefix, "conv2d"));
        if let Some(norm) = &self.norm {
            params.extend(norm.named_parameters(&scoped(prefix, "norm")));
        }
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.conv.named_parameters_mut(&scoped(prefix, "conv2d"));
        if let Some(norm) = &mut self.norm {
            params.extend(norm.named_parameters_mut(&scoped(prefix, "norm")));
        }
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        self.norm
            .as_ref()
            .map(|norm| norm.named_buffers(&scoped(prefix, "norm")))
            .unwrap_or_default()
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        match &mut self.norm {
            Some(norm) => norm.named_buffers_mut(&scoped(prefix, "norm")),
            None => Vec::new(),
        }
    }
}

/// Text-conditioned critic
///
/// Four stride-2 convolutions take the image to `s16 x s16 x df*8`, a
/// residual block refines it, the compressed embedding is tiled over the map
/// and concatenated in depth, and a final `s16 x s16` valid convolution
/// yields one logit per image.
///
/// There is exactly one parameter set; every scoring call (synthetic,
/// matching real, mismatching real) borrows the same value.
#[derive(Debug, Clone)]
pub struct Discriminator {
    config: ModelConfig,
    h0: DownStage,
    h1: DownStage,
    h2: DownStage,
    h3: DownStage,
    h4: ResidualBlock,
    embed: Dense,
    h4_concat: DownStage,
    logits: Conv2d,
}

impl Discriminator {
    pub fn new<R: Rng>(config: &ModelConfig, rng: &mut R) -> Self {
        let df = config.df_dim;
        let norm = config.discriminator_norm;
        let s16 = config.s16();
        let down = |cin: usize, cout: usize, normalized: bool, rng: &mut R| DownStage {
            conv: Conv2d::new(cin, cout, 4, 2, Padding::Same, rng),
            norm: normalized.then(|| Norm::new(norm, cout, rng)),
        };

        let h0 = down(config.channels(), df, false, rng);
        let h1 = down(df, df * 2, true, rng);
        let h2 = down(df * 2, df * 4, true, rng);
        let h3 = down(df * 4, df * 8, true, rng);

        Self {
            config: config.clone(),
            h0,
            h1,
            h2,
            h3,
            h4: ResidualBlock::new(df * 8, df * 2, norm, Activation::LeakyRelu(LEAK), rng),
            embed: Dense::new(config.embed_dim, config.compressed_embed_dim, rng),
            h4_concat: DownStage {
                conv: Conv2d::new(df * 8 + config.compressed_embed_dim, df * 8, 1, 1, Padding::Valid, rng),
                norm: Some(Norm::new(norm, df * 8, rng)),
            },
            logits: Conv2d::new(df * 8, 1, s16, s16, Padding::Valid, rng),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Score a batch of images against their embeddings
    pub fn forward(&self, images: &Tensor, phi: &Tensor, mode: Mode) -> CriticOutput {
        let batch = images.shape()[0];
        let shape = self.config.image_shape;
        assert_eq!(
            images.shape(),
            &[batch, shape.h, shape.w, shape.c],
            "discriminator: images must be [batch, H, W, C]"
        );
        assert_eq!(
            phi.shape(),
            &[batch, self.config.embed_dim],
            "discriminator: embedding must be [batch, embed_dim]"
        );

        let h0 = leaky_relu(&self.h0.forward(images, mode), LEAK);
        let h1 = leaky_relu(&self.h1.forward(&h0, mode), LEAK);
        let h2 = leaky_relu(&self.h2.forward(&h1, mode), LEAK);
        let h3 = self.h3.forward(&h2, mode);
        let h4 = self.h4.forward(&h3, mode);

        let s16 = self.config.s16();
        let embed = leaky_relu(&self.embed.forward(phi), LEAK);
        let fused = concat_last(&h4, &tile_spatial(&embed, s16, s16));
        let h4 = leaky_relu(&self.h4_concat.forward(&fused, mode), LEAK);

        let logits = reshape(&self.logits.forward(&h4), &[batch]);
        let scores = sigmoid(&logits);
        CriticOutput { scores, logits }
    }
}

impl Module for Discriminator {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.h0.named_parameters(&scoped(prefix, "d_h0"));
        params.extend(self.h1.named_parameters(&scoped(prefix, "d_h1")));
        params.extend(self.h2.named_parameters(&scoped(prefix, "d_h2")));
        params.extend(self.h3.named_parameters(&scoped(prefix, "d_h3")));
        params.extend(self.h4.named_parameters(&scoped(prefix, "d_h4_res")));
        params.extend(self.embed.named_parameters(&scoped(prefix, "d_net_embed/dense")));
        params.extend(self.h4_concat.named_parameters(&scoped(prefix, "d_h4_concat")));
        params.extend(self.logits.named_parameters(&scoped(prefix, "d_net_logits/conv2d")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.h0.named_parameters_mut(&scoped(prefix, "d_h0"));
        params.extend(self.h1.named_parameters_mut(&scoped(prefix, "d_h1")));
        params.extend(self.h2.named_parameters_mut(&scoped(prefix, "d_h2")));
        params.extend(self.h3.named_parameters_mut(&scoped(prefix, "d_h3")));
        params.extend(self.h4.named_parameters_mut(&scoped(prefix, "d_h4_res")));
        params.extend(self.embed.named_parameters_mut(&scoped(prefix, "d_net_embed/dense")));
        params.extend(self.h4_concat.named_parameters_mut(&scoped(prefix, "d_h4_concat")));
        params.extend(self.logits.named_parameters_mut(&scoped(prefix, "d_net_logits/conv2d")));
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        let mut buffers = self.h1.named_buffers(&scoped(prefix, "d_h1"));
        buffers.extend(self.h2.named_buffers(&scoped(prefix, "d_h2")));
        buffers.extend(self.h3.named_buffers(&scoped(prefix, "d_h3")));
        buffers.extend(self.h4.named_buffers(&scoped(prefix, "d_h4_res")));
        buffers.extend(self.h4_concat.named_buffers(&scoped(prefix, "d_h4_concat")));
        buffers
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        let mut buffers = self.h1.named_buffers_mut(&scoped(prefix, "d_h1"));
        buffers.extend(self.h2.named_buffers_mut(&scoped(prefix, "d_h2")));
        buffers.extend(self.h3.named_buffers_mut(&scoped(prefix, "d_h3")));
        buffers.extend(self.h4.named_buffers_mut(&scoped(prefix, "d_h4_res")));
        buffers.extend(self.h4_concat.named_buffers_mut(&scoped(prefix, "d_h4_concat")));
        buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, sum};
    use crate::model::config::ImageShape;
    use crate::nn::NormKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(norm: NormKind) -> ModelConfig {
        ModelConfig {
            output_size: 32,
            embed_dim: 6,
            compressed_embed_dim: 3,
            df_dim: 2,
            image_shape: ImageShape { h: 32, w: 32, c: 3 },
            discriminator_norm: norm,
            ..ModelConfig::default()
        }
    }

    fn inputs(batch: usize) -> (Tensor, Tensor) {
        let images = (0..batch * 32 * 32 * 3).map(|i| (i as f32 * 0.05).sin()).collect();
        let phi = (0..batch * 6).map(|i| (i as f32 * 0.4).cos()).collect();
        (
            Tensor::from_shape_vec(&[batch, 32, 32, 3], images, false).expect("shape"),
            Tensor::from_shape_vec(&[batch, 6], phi, false).expect("shape"),
        )
    }

    #[test]
    fn test_one_score_per_image() {
        for norm in [NormKind::Batch, NormKind::Layer] {
            let critic = Discriminator::new(&config(norm), &mut StdRng::seed_from_u64(0));
            let (images, phi) = inputs(3);
            let out = critic.forward(&images, &phi, Mode::Train);
            assert_eq!(out.logits.shape(), &[3]);
            assert!(out.scores.data().iter().all(|&s| s > 0.0 && s < 1.0));
        }
    }

    #[test]
    fn test_layer_norm_scores_are_per_sample() {
        let critic = Discriminator::new(&config(NormKind::Layer), &mut StdRng::seed_from_u64(1));
        let (images, phi) = inputs(2);
        let both = critic.forward(&images, &phi, Mode::Train).logits;

        let first = Tensor::new(images.data().slice(ndarray::s![0..1, .., .., ..]).to_owned().into_dyn(), false);
        let first_phi = Tensor::new(phi.data().slice(ndarray::s![0..1, ..]).to_owned().into_dyn(), false);
        let alone = critic.forward(&first, &first_phi, Mode::Train).logits;
        assert!((both.data()[[0]] - alone.data()[[0]]).abs() < 1e-5);
    }

    #[test]
    fn test_every_parameter_receives_gradient() {
        let critic = Discriminator::new(&config(NormKind::Layer), &mut StdRng::seed_from_u64(2));
        let (images, phi) = inputs(2);
        let mut total = sum(&critic.forward(&images, &phi, Mode::Train).logits);
        backward(&mut total, None);
        for (name, param) in critic.named_parameters("") {
            assert!(param.grad().is_some(), "{name} has no gradient");
        }
    }

    #[test]
    fn test_buffers_only_with_batch_norm() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(Discriminator::new(&config(NormKind::Layer), &mut rng).named_buffers("").is_empty());
        let batch = Discriminator::new(&config(NormKind::Batch), &mut rng);
        let names: Vec<String> = batch.named_buffers("").into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"d_h1/norm/moving_mean".to_string()));
        assert!(names.contains(&"d_h4_concat/norm/moving_variance".to_string()));
    }
}

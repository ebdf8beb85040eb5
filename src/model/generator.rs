//! Generator network: (noise, text embedding) -> image

use super::blocks::{Activation, ResidualBlock};
use super::config::ModelConfig;
use crate::autograd::{
    add, concat_last, exp, kl_divergence, leaky_relu, mul, relu, reshape, slice_last, tanh, Padding,
};
use crate::nn::{scoped, BatchNorm, Conv2d, ConvTranspose2d, Dense, Mode, Module, NormKind};
use crate::Tensor;
use ndarray::{Array1, ArrayD, IxDyn};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};

/// Images plus the conditioning-augmentation KL term of one forward pass
#[derive(Debug, Clone)]
pub struct GeneratorOutput {
    /// `[batch, output_size, output_size, channels]`, values in `[-1, 1]`
    pub images: Tensor,
    /// Scalar `[1]`; zero without conditioning augmentation
    pub kl: Tensor,
}

/// Transposed conv doubling the resolution, 3x3 conv, batch norm
#[derive(Debug, Clone)]
struct UpStage {
    deconv: ConvTranspose2d,
    conv: Conv2d,
    norm: Option<BatchNorm>,
}

impl UpStage {
    fn new<R: Rng>(in_channels: usize, out_channels: usize, norm: bool, rng: &mut R) -> Self {
        Self {
            deconv: ConvTranspose2d::new(in_channels, out_channels, 4, 2, Padding::Same, rng),
            conv: Conv2d::new(out_channels, out_channels, 3, 1, Padding::Same, rng),
            norm: norm.then(|| BatchNorm::new(out_channels, rng)),
        }
    }

    fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let h = self.conv.forward(&self.deconv.forward(x));
        match &self.norm {
            Some(norm) => norm.forward(&h, mode),
            None => h,
        }
    }
}

impl Module for UpStage {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.deconv.named_parameters(&scoped(prefix, "deconv2d"));
        params.extend(self.conv.named_parameters(&scoped(prefix, "conv2d")));
        if let Some(norm) = &self.norm {
            params.extend(norm.named_parameters(&scoped(prefix, "batch_norm")));
        }
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.deconv.named_parameters_mut(&scoped(prefix, "deconv2d"));
        params.extend(self.conv.named_parameters_mut(&scoped(prefix, "conv2d")));
        if let Some(norm) = &mut self.norm {
            params.extend(norm.named_parameters_mut(&scoped(prefix, "batch_norm")));
        }
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        self.norm
            .as_ref()
            .map(|norm| norm.named_buffers(&scoped(prefix, "batch_norm")))
            .unwrap_or_default()
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        match &mut self.norm {
            Some(norm) => norm.named_buffers_mut(&scoped(prefix, "batch_norm")),
            None => Vec::new(),
        }
    }
}

/// Text-conditioned image generator
///
/// ```text
/// phi ─► embed ─► c ─┐
///                    ├─► concat ─► dense+BN ─► reshape s16² ─► residual
/// z ─────────────────┘
///   ─► up(gf*4) ─► residual ─► up(gf*2)+ReLU ─► up(gf)+ReLU ─► up(C) ─► tanh
/// ```
#[derive(Debug, Clone)]
pub struct Generator {
    config: ModelConfig,
    embed: Dense,
    h0: Dense,
    h0_norm: BatchNorm,
    h1: ResidualBlock,
    h2: UpStage,
    h3: ResidualBlock,
    h4: UpStage,
    h5: UpStage,
    logits: UpStage,
}

impl Generator {
    pub fn new<R: Rng>(config: &ModelConfig, rng: &mut R) -> Self {
        let gf = config.gf_dim;
        let s16 = config.s16();
        let embed_out = if config.conditioning_augmentation {
            2 * config.compressed_embed_dim
        } else {
            config.compressed_embed_dim
        };
        let h0_features = gf * 8 * s16 * s16;

        Self {
            config: config.clone(),
            embed: Dense::new(config.embed_dim, embed_out, rng),
            h0: Dense::new(config.z_dim + config.compressed_embed_dim, h0_features, rng),
            h0_norm: BatchNorm::new(h0_features, rng),
            h1: ResidualBlock::new(gf * 8, gf * 2, NormKind::Batch, Activation::Relu, rng),
            h2: UpStage::new(gf * 8, gf * 4, true, rng),
            h3: ResidualBlock::new(gf * 4, gf, NormKind::Batch, Activation::Relu, rng),
            h4: UpStage::new(gf * 4, gf * 2, true, rng),
            h5: UpStage::new(gf * 2, gf, true, rng),
            logits: UpStage::new(gf, config.channels(), false, rng),
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Forward pass; in train mode with conditioning augmentation the
    /// compressed embedding is sampled using `rng`
    pub fn forward(&self, z: &Tensor, phi: &Tensor, mode: Mode, rng: &mut dyn RngCore) -> GeneratorOutput {
        let noise = (mode == Mode::Train && self.config.conditioning_augmentation).then(|| {
            let shape = [phi.shape()[0], self.config.compressed_embed_dim];
            let data = ArrayD::from_shape_simple_fn(IxDyn(&shape), || StandardNormal.sample(&mut *rng));
            Tensor::new(data, false)
        });
        self.forward_with_noise(z, phi, mode, noise.as_ref())
    }

    /// Forward pass with explicit conditioning-augmentation noise; `None`
    /// uses the mean of the learned Gaussian
    pub fn forward_with_noise(
        &self,
        z: &Tensor,
        phi: &Tensor,
        mode: Mode,
        noise: Option<&Tensor>,
    ) -> GeneratorOutput {
        let batch = z.shape()[0];
        assert_eq!(z.shape(), &[batch, self.config.z_dim], "generator: z must be [batch, z_dim]");
        assert_eq!(
            phi.shape(),
            &[batch, self.config.embed_dim],
            "generator: embedding must be [batch, embed_dim]"
        );

        let (c, kl) = self.compress_embedding(phi, noise);

        let s16 = self.config.s16();
        let gf = self.config.gf_dim;
        let h0 = self.h0_norm.forward(&self.h0.forward(&concat_last(z, &c)), mode);
        let h0 = reshape(&h0, &[batch, s16, s16, gf * 8]);

        let h1 = self.h1.forward(&h0, mode);
        let h2 = self.h2.forward(&h1, mode);
        let h3 = self.h3.forward(&h2, mode);
        let h4 = relu(&self.h4.forward(&h3, mode));
        let h5 = relu(&self.h5.forward(&h4, mode));
        let images = tanh(&self.logits.forward(&h5, mode));

        GeneratorOutput { images, kl }
    }

    fn compress_embedding(&self, phi: &Tensor, noise: Option<&Tensor>) -> (Tensor, Tensor) {
        if !self.config.conditioning_augmentation {
            return (self.embed.forward(phi), Tensor::zeros(&[1], false));
        }
        let k = self.config.compressed_embed_dim;
        let h = leaky_relu(&self.embed.forward(phi), 0.2);
        let mu = slice_last(&h, 0, k);
        let log_sigma = slice_last(&h, k, 2 * k);
        let kl = kl_divergence(&mu, &log_sigma);
        let c = match noise {
            // c = mu + sigma * e
            Some(e) => add(&mu, &mul(&exp(&log_sigma), e)),
            None => mu,
        };
        (c, kl)
    }
}

impl Module for Generator {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.embed.named_parameters(&scoped(prefix, "g_net_embed/dense"));
        params.extend(self.h0.named_parameters(&scoped(prefix, "g_h0/dense")));
        params.extend(self.h0_norm.named_parameters(&scoped(prefix, "g_h0/batch_norm")));
        params.extend(self.h1.named_parameters(&scoped(prefix, "g_h1_res")));
        params.extend(self.h2.named_parameters(&scoped(prefix, "g_h2")));
        params.extend(self.h3.named_parameters(&scoped(prefix, "g_h3_res")));
        params.extend(self.h4.named_parameters(&scoped(prefix, "g_h4")));
        params.extend(self.h5.named_parameters(&scoped(prefix, "g_h5")));
        params.extend(self.logits.named_parameters(&scoped(prefix, "g_logits")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.embed.named_parameters_mut(&scoped(prefix, "g_net_embed/dense"));
        params.extend(self.h0.named_parameters_mut(&scoped(prefix, "g_h0/dense")));
        params.extend(self.h0_norm.named_parameters_mut(&scoped(prefix, "g_h0/batch_norm")));
        params.extend(self.h1.named_parameters_mut(&scoped(prefix, "g_h1_res")));
        params.extend(self.h2.named_parameters_mut(&scoped(prefix, "g_h2")));
        params.extend(self.h3.named_parameters_mut(&scoped(prefix, "g_h3_res")));
        params.extend(self.h4.named_parameters_mut(&scoped(prefix, "g_h4")));
        params.extend(self.h5.named_parameters_mut(&scoped(prefix, "g_h5")));
        params.extend(self.logits.named_parameters_mut(&scoped(prefix, "g_logits")));
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        let mut buffers = self.h0_norm.named_buffers(&scoped(prefix, "g_h0/batch_norm"));
        buffers.extend(self.h1.named_buffers(&scoped(prefix, "g_h1_res")));
        buffers.extend(self.h2.named_buffers(&scoped(prefix, "g_h2")));
        buffers.extend(self.h3.named_buffers(&scoped(prefix, "g_h3_res")));
        buffers.extend(self.h4.named_buffers(&scoped(prefix, "g_h4")));
        buffers.extend(self.h5.named_buffers(&scoped(prefix, "g_h5")));
        buffers
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        let mut buffers = self.h0_norm.named_buffers_mut(&scoped(prefix, "g_h0/batch_norm"));
        buffers.extend(self.h1.named_buffers_mut(&scoped(prefix, "g_h1_res")));
        buffers.extend(self.h2.named_buffers_mut(&scoped(prefix, "g_h2")));
        buffers.extend(self.h3.named_buffers_mut(&scoped(prefix, "g_h3_res")));
        buffers.extend(self.h4.named_buffers_mut(&scoped(prefix, "g_h4")));
        buffers.extend(self.h5.named_buffers_mut(&scoped(prefix, "g_h5")));
        buffers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::{backward, mean};
    use crate::model::config::ImageShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(conditioning_augmentation: bool) -> ModelConfig {
        ModelConfig {
            output_size: 32,
            z_dim: 5,
            embed_dim: 8,
            compressed_embed_dim: 4,
            gf_dim: 2,
            df_dim: 2,
            image_shape: ImageShape { h: 32, w: 32, c: 1 },
            conditioning_augmentation,
            ..ModelConfig::default()
        }
    }

    fn inputs(batch: usize) -> (Tensor, Tensor) {
        let z = (0..batch * 5).map(|i| (i as f32 * 0.7).sin()).collect();
        let phi = (0..batch * 8).map(|i| (i as f32 * 0.2).cos()).collect();
        (
            Tensor::from_shape_vec(&[batch, 5], z, false).expect("shape"),
            Tensor::from_shape_vec(&[batch, 8], phi, false).expect("shape"),
        )
    }

    #[test]
    fn test_output_resolution_matches_config() {
        let mut rng = StdRng::seed_from_u64(0);
        let generator = Generator::new(&config(true), &mut rng);
        let (z, phi) = inputs(2);
        let out = generator.forward(&z, &phi, Mode::Train, &mut rng);
        assert_eq!(out.images.shape(), &[2, 32, 32, 1]);
        assert!(out.images.data().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_plain_embedding_has_zero_kl() {
        let mut rng = StdRng::seed_from_u64(1);
        let generator = Generator::new(&config(false), &mut rng);
        let (z, phi) = inputs(2);
        let out = generator.forward(&z, &phi, Mode::Train, &mut rng);
        assert_eq!(out.kl.item(), 0.0);
    }

    #[test]
    fn test_eval_ignores_conditioning_noise() {
        let mut rng = StdRng::seed_from_u64(2);
        let generator = Generator::new(&config(true), &mut rng);
        let (z, phi) = inputs(1);
        let a = generator.forward(&z, &phi, Mode::Eval, &mut rng).images;
        let b = generator.forward(&z, &phi, Mode::Eval, &mut rng).images;
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_gradients_reach_embedding_layer() {
        let mut rng = StdRng::seed_from_u64(3);
        let generator = Generator::new(&config(true), &mut rng);
        let (z, phi) = inputs(2);
        let out = generator.forward(&z, &phi, Mode::Train, &mut rng);
        let mut loss = add(&mean(&out.images), &out.kl);
        backward(&mut loss, None);

        for (name, param) in generator.named_parameters("") {
            assert!(param.grad().is_some(), "{name} has no gradient");
        }
    }

    #[test]
    fn test_buffer_names() {
        let generator = Generator::new(&config(true), &mut StdRng::seed_from_u64(4));
        let names: Vec<String> = generator.named_buffers("").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names[0], "g_h0/batch_norm/moving_mean");
        assert!(names.contains(&"g_h2/batch_norm/moving_variance".to_string()));
        assert!(!names.iter().any(|n| n.starts_with("g_logits")));
    }
}

//! Text-to-image GAN: one generator, one critic, and the calls the trainer makes

use super::config::ModelConfig;
use super::discriminator::{CriticOutput, Discriminator};
use super::generator::{Generator, GeneratorOutput};
use super::loss::{gradient_penalty, CriticScores, GradientPenalty};
use crate::config::validate_model;
use crate::nn::{scoped, uniform, Mode, Module};
use crate::{Error, Result, Tensor};
use ndarray::{Array1, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generator and discriminator sharing one configuration
///
/// The sampler is not a separate network: [`TextToImageGan::sample`] runs
/// the same generator parameters in [`Mode::Eval`], at any batch size.
#[derive(Debug, Clone)]
pub struct TextToImageGan {
    pub config: ModelConfig,
    pub generator: Generator,
    pub discriminator: Discriminator,
    rng: StdRng,
}

impl TextToImageGan {
    /// Build both networks from OS entropy
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::build(config, StdRng::from_os_rng())
    }

    /// Build both networks reproducibly
    pub fn with_seed(config: ModelConfig, seed: u64) -> Result<Self> {
        Self::build(config, StdRng::seed_from_u64(seed))
    }

    fn build(config: ModelConfig, mut rng: StdRng) -> Result<Self> {
        validate_model(&config)?;
        let generator = Generator::new(&config, &mut rng);
        let discriminator = Discriminator::new(&config, &mut rng);
        Ok(Self { config, generator, discriminator, rng })
    }

    /// Fresh noise `z ~ U(-1, 1)`, `[batch, z_dim]`
    pub fn sample_noise(&mut self, batch: usize) -> Tensor {
        uniform(&[batch, self.config.z_dim], -1.0, 1.0, &mut self.rng)
    }

    /// Interpolation coefficients `eps ~ U(0, 1)`, one per image
    pub fn sample_epsilon(&mut self, batch: usize) -> Array1<f32> {
        Array1::from_shape_simple_fn(batch, || self.rng.random_range(0.0..1.0))
    }

    /// Verify an image batch and its embeddings match the model
    pub fn check_batch(&self, images: &Tensor, phi: &Tensor) -> Result<()> {
        let batch = images.shape().first().copied().unwrap_or(0);
        let shape = self.config.image_shape;
        let expected = [batch, shape.h, shape.w, shape.c];
        if images.shape() != expected {
            return Err(Error::shape("image batch", &expected, images.shape()));
        }
        let expected = [batch, self.config.embed_dim];
        if phi.shape() != expected {
            return Err(Error::shape("text embeddings", &expected, phi.shape()));
        }
        Ok(())
    }

    /// Training-mode generator pass; conditioning noise comes from the
    /// model's generator
    pub fn generate(&mut self, z: &Tensor, phi: &Tensor) -> GeneratorOutput {
        self.generator.forward(z, phi, Mode::Train, &mut self.rng)
    }

    /// Deterministic inference with shared generator parameters
    pub fn sample(&self, z: &Tensor, phi: &Tensor) -> Result<Tensor> {
        let batch = z.shape().first().copied().unwrap_or(0);
        if batch == 0 {
            return Err(Error::shape("sampler noise", &[1, self.config.z_dim], z.shape()));
        }
        let expected = [batch, self.config.z_dim];
        if z.shape() != expected {
            return Err(Error::shape("sampler noise", &expected, z.shape()));
        }
        let expected = [batch, self.config.embed_dim];
        if phi.shape() != expected {
            return Err(Error::shape("sampler embeddings", &expected, phi.shape()));
        }
        let z = z.detach();
        let phi = phi.detach();
        Ok(self.generator.forward_with_noise(&z, &phi, Mode::Eval, None).images.detach())
    }

    /// One critic call
    pub fn critic(&self, images: &Tensor, phi: &Tensor, mode: Mode) -> CriticOutput {
        self.discriminator.forward(images, phi, mode)
    }

    /// Score fakes, matching reals and (optionally) mismatching reals with
    /// the one discriminator
    pub fn score(
        &self,
        fake: &Tensor,
        real: &Tensor,
        wrong: Option<&Tensor>,
        phi: &Tensor,
        mode: Mode,
    ) -> CriticScores {
        CriticScores {
            fake: self.critic(fake, phi, mode),
            real: self.critic(real, phi, mode),
            mismatch: wrong.map(|w| self.critic(w, phi, mode)),
        }
    }

    /// Gradient penalty between matching reals and detached fakes
    pub fn gradient_penalty(
        &self,
        real: &Tensor,
        fake: &Tensor,
        phi: &Tensor,
        epsilon: &Array1<f32>,
        lambda: f32,
    ) -> GradientPenalty {
        gradient_penalty(&self.discriminator, real, fake, phi, epsilon, lambda, Mode::Train)
    }

    /// Every named buffer, keyed like parameters
    pub fn buffer_map(&self) -> Vec<(String, ArrayD<f32>)> {
        self.named_buffers("")
            .into_iter()
            .map(|(name, buffer)| (name, buffer.into_dyn()))
            .collect()
    }
}

impl Module for TextToImageGan {
    fn named_parameters(&self, prefix: &str) -> Vec<(String, &Tensor)> {
        let mut params = self.generator.named_parameters(&scoped(prefix, "generator"));
        params.extend(self.discriminator.named_parameters(&scoped(prefix, "discriminator")));
        params
    }

    fn named_parameters_mut(&mut self, prefix: &str) -> Vec<(String, &mut Tensor)> {
        let mut params = self.generator.named_parameters_mut(&scoped(prefix, "generator"));
        params.extend(
            self.discriminator
                .named_parameters_mut(&scoped(prefix, "discriminator")),
        );
        params
    }

    fn named_buffers(&self, prefix: &str) -> Vec<(String, Array1<f32>)> {
        let mut buffers = self.generator.named_buffers(&scoped(prefix, "generator"));
        buffers.extend(self.discriminator.named_buffers(&scoped(prefix, "discriminator")));
        buffers
    }

    fn named_buffers_mut(&mut self, prefix: &str) -> Vec<(String, &mut Array1<f32>)> {
        let mut buffers = self.generator.named_buffers_mut(&scoped(prefix, "generator"));
        buffers.extend(
            self.discriminator
                .named_buffers_mut(&scoped(prefix, "discriminator")),
        );
        buffers
    }
}

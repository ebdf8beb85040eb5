//! Text-to-image GAN networks and objectives
//!
//! - [`Generator`]: noise + text embedding -> image in `[-1, 1]`
//! - [`Discriminator`]: image + text embedding -> score in `(0, 1)`
//! - [`TextToImageGan`]: both networks, the eval-mode sampler and the
//!   scoring calls a training step makes
//! - [`loss`]: Wasserstein and matching-aware objectives, gradient penalty

mod blocks;
mod config;
mod discriminator;
mod gan;
mod generator;
pub mod loss;

pub use blocks::{Activation, ResidualBlock};
pub use config::{ImageShape, ModelConfig};
pub use discriminator::{CriticOutput, Discriminator};
pub use gan::TextToImageGan;
pub use generator::{Generator, GeneratorOutput};
pub use loss::{
    discriminator_loss, generator_loss, gradient_penalty, CriticScores, DiscriminatorLoss,
    GeneratorLoss, GradientPenalty, LossKind,
};

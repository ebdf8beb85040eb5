//! GAN training loop
//!
//! - [`TrainConfig`]: step counts, cadences, loss choice and output folders
//! - [`GanTrainer`]: restore, alternate discriminator/generator updates,
//!   sample, summarize and checkpoint
//! - [`SampleSink`]: destination of periodic sample grids

mod config;
mod gan_trainer;
mod sink;
mod stats;

pub use config::TrainConfig;
pub use gan_trainer::{GanTrainer, TrainerState};
pub use sink::{PngSampleSink, SampleSink};
pub use stats::TrainingStats;

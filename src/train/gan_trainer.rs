//! Alternating discriminator/generator training loop

use super::config::TrainConfig;
use super::sink::{PngSampleSink, SampleSink};
use super::stats::TrainingStats;
use crate::autograd::backward;
use crate::cli::{log, LogLevel};
use crate::config::{validate_training, OptimSpec};
use crate::data::{TextImageDataset, TrainBatch};
use crate::io::{save_captions, CheckpointManager, Optimizers, OptimizersMut};
use crate::model::{
    discriminator_loss, generator_loss, DiscriminatorLoss, GeneratorLoss, GradientPenalty, LossKind,
    TextToImageGan,
};
use crate::monitor::SummaryWriter;
use crate::nn::{Mode, Module};
use crate::optim::{Adam, Optimizer};
use crate::{Error, Result, Tensor};
use std::time::Instant;

/// Lifecycle of a [`GanTrainer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainerState {
    /// Restoring the latest checkpoint
    Loading,
    Training,
    Finished,
}

/// Drives a [`TextToImageGan`] over a dataset
///
/// Each step updates the discriminator once; every `n_critic` steps the
/// generator is updated too and summaries are written.
pub struct GanTrainer<D: TextImageDataset> {
    pub gan: TextToImageGan,
    dataset: D,
    config: TrainConfig,
    g_opt: Adam,
    d_opt: Adam,
    checkpoints: CheckpointManager,
    summaries: SummaryWriter,
    sink: Box<dyn SampleSink>,
    log_level: LogLevel,
    state: TrainerState,
    stats: TrainingStats,
}

impl<D: TextImageDataset> GanTrainer<D> {
    /// Create a trainer writing samples, checkpoints and logs under the
    /// directories of `config`
    pub fn new(gan: TextToImageGan, dataset: D, config: TrainConfig, optimizer: OptimSpec) -> Result<Self> {
        validate_training(&config)?;
        let summaries = SummaryWriter::create(&config.logs_dir)?;
        Ok(Self {
            gan,
            dataset,
            g_opt: Adam::new(optimizer.generator),
            d_opt: Adam::new(optimizer.discriminator),
            checkpoints: CheckpointManager::new(&config.checkpoint_dir, config.checkpoints_to_keep),
            summaries,
            sink: Box::new(PngSampleSink::new(&config.sample_dir)),
            log_level: LogLevel::Normal,
            state: TrainerState::Loading,
            stats: TrainingStats::default(),
            config,
        })
    }

    /// Replace the PNG sample writer
    pub fn with_sample_sink(mut self, sink: Box<dyn SampleSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn state(&self) -> TrainerState {
        self.state
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Run from the latest checkpoint (or step 0) up to `max_steps`
    pub fn train(&mut self) -> Result<TrainingStats> {
        let started = Instant::now();
        self.state = TrainerState::Loading;
        let start = self.restore();
        self.stats = TrainingStats { start_step: start, ..TrainingStats::default() };

        let sample_z = self.gan.sample_noise(self.config.sample_num);
        let test = self.dataset.next_batch_test(self.config.sample_num, 0, 1)?;
        let sample_cond = test
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Dataset("held-out batch has no caption embeddings".into()))?;
        save_captions(&self.config.sample_dir, &test.captions)?;

        self.state = TrainerState::Training;
        let steps_per_epoch = (self.dataset.num_examples() / self.config.batch_size).max(1);

        for idx in start + 1..self.config.max_steps {
            let epoch = idx / steps_per_epoch;
            let batch = self.dataset.next_batch(self.config.batch_size, self.config.caption_window)?;
            let rows = batch.images.shape().first().copied().unwrap_or(0);
            if rows != self.config.batch_size {
                return Err(Error::shape("training batch", &[self.config.batch_size], &[rows]));
            }
            self.gan.check_batch(&batch.images, &batch.embeddings)?;
            self.gan.check_batch(&batch.wrong_images, &batch.embeddings)?;

            let z = self.gan.sample_noise(self.config.batch_size);
            let d_loss = self.discriminator_step(&batch, &z);
            self.stats.d_updates += 1;
            self.stats.last_d_loss = Some(d_loss.value);

            if self.config.is_generator_step(idx) {
                let (g_loss, generated) = self.generator_step(&batch, &z);
                self.stats.g_updates += 1;
                self.stats.last_g_loss = Some(g_loss.value);
                self.write_summaries(idx, &batch, &generated, &z, &sample_z, &d_loss, &g_loss)?;
                self.log(
                    LogLevel::Normal,
                    &format!(
                        "Epoch: [{epoch:2}] [{idx:4}] time: {:4.4}, d_loss: {:.8}, g_loss: {:.8}",
                        started.elapsed().as_secs_f64(),
                        d_loss.value,
                        g_loss.value
                    ),
                );
            }

            if self.config.is_sample_step(idx) {
                match self.write_sample(&sample_z, &sample_cond, epoch, idx) {
                    Ok(()) => self.stats.samples_written += 1,
                    Err(e) => {
                        self.stats.sample_failures += 1;
                        self.log(LogLevel::Normal, "Failed to generate sample image");
                        self.log(LogLevel::Normal, &format!("  error: {e}"));
                    }
                }
            }

            if self.config.is_checkpoint_step(idx) {
                let path = self.checkpoints.save(
                    idx,
                    &self.gan,
                    Optimizers { generator: &self.g_opt, discriminator: &self.d_opt },
                )?;
                self.stats.checkpoints_saved += 1;
                self.log(LogLevel::Verbose, &format!(" [*] Saved {}", path.display()));
            }

            self.stats.first_step.get_or_insert(idx);
            self.stats.last_step = Some(idx);
        }

        self.summaries.flush()?;
        self.state = TrainerState::Finished;
        self.stats.elapsed_secs = started.elapsed().as_secs_f64();
        Ok(self.stats.clone())
    }

    /// Step to resume after; any load failure starts fresh
    fn restore(&mut self) -> usize {
        self.log(LogLevel::Normal, " [*] Reading checkpoints...");
        let loaded = self.checkpoints.load(
            &mut self.gan,
            OptimizersMut { generator: &mut self.g_opt, discriminator: &mut self.d_opt },
        );
        match loaded {
            Ok(Some(step)) => {
                self.log(LogLevel::Normal, " [*] Load SUCCESS");
                step
            }
            Ok(None) => {
                self.log(LogLevel::Normal, " [!] Load failed...");
                0
            }
            Err(e) => {
                self.log(LogLevel::Normal, " [!] Load failed...");
                self.log(LogLevel::Verbose, &format!("  error: {e}"));
                0
            }
        }
    }

    fn discriminator_step(&mut self, batch: &TrainBatch, z: &Tensor) -> DiscriminatorLoss {
        let lambda = self.config.gradient_penalty;
        self.gan.zero_grad();

        let fake = self.gan.generate(z, &batch.embeddings).images.detach();
        let penalty = if lambda > 0.0 {
            let eps = self.gan.sample_epsilon(batch.size());
            self.gan.gradient_penalty(&batch.images, &fake, &batch.embeddings, &eps, lambda)
        } else {
            GradientPenalty::disabled()
        };

        let wrong = match self.config.loss {
            LossKind::Cls => Some(&batch.wrong_images),
            LossKind::Wasserstein => None,
        };
        let scores = self.gan.score(&fake, &batch.images, wrong, &batch.embeddings, Mode::Train);
        let mut loss = discriminator_loss(self.config.loss, &scores, &penalty, lambda);

        backward(&mut loss.total, None);
        self.d_opt.step_refs(&mut self.gan.discriminator.parameters_mut());
        loss
    }

    /// Returns the loss and the detached training-mode fakes
    fn generator_step(&mut self, batch: &TrainBatch, z: &Tensor) -> (GeneratorLoss, Tensor) {
        self.gan.zero_grad();

        let out = self.gan.generate(z, &batch.embeddings);
        let critic = self.gan.critic(&out.images, &batch.embeddings, Mode::Train);
        let mut loss = generator_loss(self.config.loss, &critic, &out.kl, self.config.kl_coeff);

        backward(&mut loss.total, None);
        self.g_opt.step_refs(&mut self.gan.generator.parameters_mut());
        // the critic saw the fakes; its gradients belong to no update
        self.gan.discriminator.zero_grad();
        (loss, out.images.detach())
    }

    fn write_sample(&mut self, z: &Tensor, phi: &Tensor, epoch: usize, step: usize) -> Result<()> {
        let images = self.gan.sample(z, phi)?;
        self.sink.write(images.data(), epoch, step)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_summaries(
        &mut self,
        step: usize,
        batch: &TrainBatch,
        generated: &Tensor,
        z: &Tensor,
        sample_z: &Tensor,
        d_loss: &DiscriminatorLoss,
        g_loss: &GeneratorLoss,
    ) -> Result<()> {
        let w = &mut self.summaries;
        w.image("x", step, batch.images.data())?;
        w.image("G_img", step, generated.data())?;
        w.histogram("z", step, z.data());
        w.histogram("z_sample", step, sample_z.data());

        w.scalar("G_loss_wass", step, -d_loss.fake);
        w.scalar("kl_loss", step, g_loss.kl);
        w.scalar("G_loss", step, g_loss.value);
        w.scalar("D_loss_real_match", step, d_loss.real);
        if let Some(mismatch) = d_loss.mismatch {
            w.scalar("D_loss_real_mismatch", step, mismatch);
        }
        w.scalar("D_loss_fake", step, d_loss.fake);
        w.scalar("D_grad_penalty", step, d_loss.gradient_penalty);
        w.scalar("neg_d_loss", step, -d_loss.value);
        w.scalar("D_loss", step, d_loss.value);
        w.flush()
    }

    fn log(&self, required: LogLevel, msg: &str) {
        log(self.log_level, required, msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Example, InMemoryDataset, TestBatch};
    use crate::model::{ImageShape, ModelConfig};
    use crate::nn::NormKind;
    use tempfile::TempDir;

    fn model_config() -> ModelConfig {
        ModelConfig {
            output_size: 16,
            z_dim: 4,
            embed_dim: 3,
            compressed_embed_dim: 2,
            gf_dim: 2,
            df_dim: 2,
            image_shape: ImageShape { h: 16, w: 16, c: 1 },
            conditioning_augmentation: true,
            discriminator_norm: NormKind::Layer,
        }
    }

    fn dataset() -> InMemoryDataset {
        let examples = (0..4)
            .map(|i| Example {
                image: (0..256).map(|p| ((p + i * 7) as f32 * 0.05).sin()).collect(),
                embeddings: vec![vec![i as f32 * 0.1, 0.5, -0.5], vec![0.2, i as f32 * -0.1, 0.0]],
                captions: vec![format!("shape {i}")],
                label: i,
            })
            .collect();
        InMemoryDataset::new(ImageShape { h: 16, w: 16, c: 1 }, examples, Vec::new(), Some(0)).expect("dataset")
    }

    /// Always hands out one more row than requested
    struct OversizedBatches(InMemoryDataset);

    impl TextImageDataset for OversizedBatches {
        fn num_examples(&self) -> usize {
            self.0.num_examples()
        }

        fn next_batch(&mut self, batch_size: usize, window: usize) -> Result<TrainBatch> {
            self.0.next_batch(batch_size + 1, window)
        }

        fn next_batch_test(&self, batch_size: usize, start: usize, max_captions: usize) -> Result<TestBatch> {
            self.0.next_batch_test(batch_size, start, max_captions)
        }
    }

    fn train_config(dir: &TempDir, max_steps: usize) -> TrainConfig {
        TrainConfig {
            batch_size: 2,
            sample_num: 3,
            max_steps,
            n_critic: 2,
            sample_period: 3,
            seed: Some(0),
            ..TrainConfig::default()
        }
        .with_output_dir(dir.path())
    }

    fn trainer(dir: &TempDir, max_steps: usize) -> GanTrainer<InMemoryDataset> {
        let gan = TextToImageGan::with_seed(model_config(), 0).expect("model");
        GanTrainer::new(gan, dataset(), train_config(dir, max_steps), OptimSpec::default())
            .expect("trainer")
            .with_log_level(LogLevel::Quiet)
    }

    #[test]
    fn test_fresh_run_counts_updates() {
        let dir = TempDir::new().expect("temp dir");
        let mut trainer = trainer(&dir, 5);
        let stats = trainer.train().expect("train");

        assert_eq!(stats.start_step, 0);
        assert_eq!(stats.first_step, Some(1));
        assert_eq!(stats.last_step, Some(4));
        assert_eq!(stats.d_updates, 4);
        assert_eq!(stats.g_updates, 2);
        assert_eq!(stats.samples_written, 1);
        assert_eq!(trainer.state(), TrainerState::Finished);
        assert!(dir.path().join("samples/captions.txt").exists());
        assert!(dir.path().join("samples/train_01_0003.png").exists());
        assert!(stats.last_d_loss.is_some_and(f32::is_finite));
    }

    #[test]
    fn test_discriminator_step_leaves_generator_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let mut trainer = trainer(&dir, 2);
        let before: Vec<_> = trainer.gan.generator.parameters().iter().map(|p| p.data().clone()).collect();
        let stats = trainer.train().expect("train");

        assert_eq!(stats.g_updates, 0);
        let after: Vec<_> = trainer.gan.generator.parameters().iter().map(|p| p.data().clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_batch_size_mismatch_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let gan = TextToImageGan::with_seed(model_config(), 0).expect("model");
        let mut trainer = GanTrainer::new(gan, OversizedBatches(dataset()), train_config(&dir, 3), OptimSpec::default())
            .expect("trainer")
            .with_log_level(LogLevel::Quiet);

        let err = trainer.train().expect_err("oversized batch");
        match err {
            Error::ShapeMismatch { expected, actual, .. } => {
                assert_eq!(expected, vec![2]);
                assert_eq!(actual, vec![3]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(trainer.stats().d_updates, 0);
    }

    #[test]
    fn test_new_rejects_zero_cadences() {
        let dir = TempDir::new().expect("temp dir");
        for config in [
            TrainConfig { n_critic: 0, ..train_config(&dir, 3) },
            TrainConfig { sample_period: 0, ..train_config(&dir, 3) },
            TrainConfig { checkpoint_period: 0, checkpoint_offset: 0, ..train_config(&dir, 3) },
        ] {
            let gan = TextToImageGan::with_seed(model_config(), 0).expect("model");
            let result = GanTrainer::new(gan, dataset(), config, OptimSpec::default());
            assert!(matches!(result, Err(Error::ConfigError(_))));
        }
    }
}

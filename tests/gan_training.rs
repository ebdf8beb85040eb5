//! End-to-end training loop tests on a tiny synthetic dataset

use ndarray::ArrayD;
use pintor::cli::LogLevel;
use pintor::config::OptimSpec;
use pintor::data::{Example, InMemoryDataset};
use pintor::io::CheckpointManager;
use pintor::model::{ImageShape, LossKind, ModelConfig, TextToImageGan};
use pintor::monitor::{read_events, SummaryRecord};
use pintor::nn::NormKind;
use pintor::train::{GanTrainer, SampleSink, TrainConfig, TrainerState};
use pintor::{Error, Result};
use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use tempfile::TempDir;

const SHAPE: ImageShape = ImageShape { h: 16, w: 16, c: 1 };

fn model_config() -> ModelConfig {
    ModelConfig {
        output_size: 16,
        z_dim: 4,
        embed_dim: 3,
        compressed_embed_dim: 2,
        gf_dim: 2,
        df_dim: 2,
        image_shape: SHAPE,
        conditioning_augmentation: true,
        discriminator_norm: NormKind::Layer,
    }
}

fn dataset(shape: ImageShape) -> InMemoryDataset {
    let examples = (0..6)
        .map(|i| Example {
            image: (0..shape.len()).map(|p| ((p * (i + 1)) as f32 * 0.01).sin()).collect(),
            embeddings: vec![vec![i as f32 * 0.2, 1.0, -1.0], vec![-0.5, i as f32 * 0.1, 0.3]],
            captions: vec![format!("pattern {i}"), format!("stripes {i}")],
            label: i % 2,
        })
        .collect();
    InMemoryDataset::new(shape, examples, Vec::new(), Some(7)).expect("dataset")
}

fn train_config(dir: &TempDir, max_steps: usize) -> TrainConfig {
    TrainConfig {
        batch_size: 2,
        sample_num: 4,
        max_steps,
        n_critic: 5,
        sample_period: 100,
        checkpoint_period: 500,
        checkpoint_offset: 2,
        seed: Some(11),
        ..TrainConfig::default()
    }
    .with_output_dir(dir.path())
}

fn trainer(config: TrainConfig) -> GanTrainer<InMemoryDataset> {
    let gan = TextToImageGan::with_seed(model_config(), 3).expect("model");
    GanTrainer::new(gan, dataset(SHAPE), config, OptimSpec::default())
        .expect("trainer")
        .with_log_level(LogLevel::Quiet)
}

/// Records the shape of every grid it receives, optionally failing each write
struct RecordingSink {
    shapes: Rc<RefCell<Vec<Vec<usize>>>>,
    fail: bool,
}

impl SampleSink for RecordingSink {
    fn write(&mut self, images: &ArrayD<f32>, _epoch: usize, _step: usize) -> Result<()> {
        self.shapes.borrow_mut().push(images.shape().to_vec());
        if self.fail {
            Err(Error::Image("disk full".into()))
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_one_generator_update_per_n_critic_steps() {
    let dir = TempDir::new().expect("temp dir");
    let mut trainer = trainer(train_config(&dir, 11));
    let stats = trainer.train().expect("train");

    assert_eq!(stats.d_updates, 10);
    assert_eq!(stats.g_updates, 2);
    assert_eq!(trainer.state(), TrainerState::Finished);
}

#[test]
fn test_resume_continues_after_saved_step() {
    let dir = TempDir::new().expect("temp dir");
    let config = TrainConfig { checkpoint_period: 3, ..train_config(&dir, 4) };

    let first = trainer(config.clone()).train().expect("first run");
    assert_eq!(first.checkpoints_saved, 1);
    assert_eq!(first.last_step, Some(3));

    let mut resumed = trainer(TrainConfig { max_steps: 6, ..config });
    let stats = resumed.train().expect("resumed run");
    assert_eq!(stats.start_step, 2);
    assert_eq!(stats.first_step, Some(3));
    assert_eq!(stats.d_updates, 3);

    let index = resumed.checkpoints().index().expect("index");
    assert_eq!(index.latest.as_deref(), Some(CheckpointManager::file_name(5).as_str()));
}

#[test]
fn test_unreadable_checkpoint_starts_fresh() {
    let dir = TempDir::new().expect("temp dir");
    let config = train_config(&dir, 2);
    fs::create_dir_all(&config.checkpoint_dir).expect("dir");
    fs::write(config.checkpoint_dir.join("checkpoint.json"), "{ not json").expect("write");

    let stats = trainer(config).train().expect("train");
    assert_eq!(stats.start_step, 0);
    assert_eq!(stats.first_step, Some(1));
}

#[test]
fn test_sample_failure_does_not_stop_training() {
    let dir = TempDir::new().expect("temp dir");
    let shapes = Rc::new(RefCell::new(Vec::new()));
    let config = TrainConfig { sample_period: 2, ..train_config(&dir, 7) };
    let mut trainer =
        trainer(config).with_sample_sink(Box::new(RecordingSink { shapes: Rc::clone(&shapes), fail: true }));

    let stats = trainer.train().expect("failures are not fatal");
    assert_eq!(stats.sample_failures, 3);
    assert_eq!(stats.samples_written, 0);
    assert_eq!(stats.last_step, Some(6));
    assert_eq!(stats.d_updates, 6);
    assert_eq!(shapes.borrow().len(), 3);
}

#[test]
fn test_sampler_uses_sample_num_not_batch_size() {
    let dir = TempDir::new().expect("temp dir");
    let shapes = Rc::new(RefCell::new(Vec::new()));
    let config = TrainConfig { sample_num: 5, sample_period: 3, ..train_config(&dir, 4) };
    let mut trainer =
        trainer(config).with_sample_sink(Box::new(RecordingSink { shapes: Rc::clone(&shapes), fail: false }));

    let stats = trainer.train().expect("train");
    assert_eq!(stats.samples_written, 1);
    assert_eq!(shapes.borrow().as_slice(), &[vec![5, 16, 16, 1]]);
}

#[test]
fn test_png_samples_and_captions_written() {
    let dir = TempDir::new().expect("temp dir");
    let config = TrainConfig { sample_period: 2, ..train_config(&dir, 3) };
    trainer(config).train().expect("train");

    // 6 examples / batch 2 -> 3 steps per epoch
    assert!(dir.path().join("samples/train_00_0002.png").exists());
    let captions = fs::read_to_string(dir.path().join("samples/captions.txt")).expect("captions");
    assert!(captions.contains("pattern 0"));
}

#[test]
fn test_generator_steps_write_summaries() {
    let dir = TempDir::new().expect("temp dir");
    let config = TrainConfig { n_critic: 2, ..train_config(&dir, 5) };
    trainer(config).train().expect("train");

    let records = read_events(dir.path().join("logs/events.jsonl")).expect("events");
    let d_losses: Vec<usize> = records
        .iter()
        .filter_map(|r| match r {
            SummaryRecord::Scalar { tag, step, .. } if tag == "D_loss" => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(d_losses, vec![2, 4]);
    for tag in ["G_loss", "kl_loss", "D_grad_penalty", "z", "z_sample", "x", "G_img"] {
        assert!(records.iter().any(|r| r.tag() == tag), "missing summary {tag}");
    }
}

#[test]
fn test_matching_aware_loss_scores_mismatched_pairs() {
    let dir = TempDir::new().expect("temp dir");
    let config = TrainConfig { loss: LossKind::Cls, n_critic: 1, gradient_penalty: 0.0, ..train_config(&dir, 3) };
    let stats = trainer(config).train().expect("train");

    assert_eq!(stats.g_updates, 2);
    let records = read_events(dir.path().join("logs/events.jsonl")).expect("events");
    assert!(records.iter().any(|r| r.tag() == "D_loss_real_mismatch"));
    assert!(stats.last_d_loss.is_some_and(|l| l.is_finite() && l > 0.0));
}

#[test]
fn test_wrong_image_shape_is_fatal() {
    let dir = TempDir::new().expect("temp dir");
    let gan = TextToImageGan::with_seed(model_config(), 3).expect("model");
    let rgb = ImageShape { c: 3, ..SHAPE };
    let mut trainer = GanTrainer::new(gan, dataset(rgb), train_config(&dir, 3), OptimSpec::default())
        .expect("trainer")
        .with_log_level(LogLevel::Quiet);

    let err = trainer.train().unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));
}

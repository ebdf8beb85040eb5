//! Sample command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{build_dataset, build_gan, load_spec, SampleArgs};
use crate::data::TextImageDataset;
use crate::io::{image_manifold_size, save_images, CheckpointManager, OptimizersMut};
use crate::optim::Adam;

pub fn run_sample(args: SampleArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;
    let mut gan = build_gan(&spec).map_err(|e| format!("Model error: {e}"))?;
    let dataset = build_dataset(&spec).map_err(|e| format!("Dataset error: {e}"))?;

    // optimizer state is restored but unused
    let mut g_opt = Adam::new(spec.optimizer.generator);
    let mut d_opt = Adam::new(spec.optimizer.discriminator);
    let checkpoints = CheckpointManager::new(&spec.training.checkpoint_dir, 0);
    let step = checkpoints
        .load(&mut gan, OptimizersMut { generator: &mut g_opt, discriminator: &mut d_opt })
        .map_err(|e| format!("Checkpoint error: {e}"))?
        .ok_or_else(|| format!("No checkpoint found in {}", checkpoints.dir().display()))?;
    log(level, LogLevel::Normal, &format!(" [*] Load SUCCESS (step {step})"));

    let num = args.num.unwrap_or(spec.training.sample_num);
    let batch = dataset.next_batch_test(num, args.start, 1).map_err(|e| format!("Dataset error: {e}"))?;
    let phi = batch.embeddings.first().ok_or("held-out batch has no caption embeddings")?;
    let z = gan.sample_noise(num);
    let images = gan.sample(&z, phi).map_err(|e| format!("Sampling error: {e}"))?;

    if let Some(dir) = args.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| format!("IO error: {e}"))?;
    }
    save_images(images.data(), image_manifold_size(num), &args.output).map_err(|e| format!("Image error: {e}"))?;

    for (i, captions) in batch.captions.iter().enumerate() {
        log(level, LogLevel::Verbose, &format!("  {i}: {}", captions.join(" | ")));
    }
    log(level, LogLevel::Normal, &format!("Wrote {num} samples to {}", args.output.display()));
    Ok(())
}

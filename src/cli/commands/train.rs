//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{apply_overrides, build_trainer, load_spec, validate_spec, TrainArgs};

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Pintor: Training from {}", args.config.display()));

    let mut spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_spec(&spec).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Verbose, &format!("  Dataset: {}", spec.data.path.display()));
    log(level, LogLevel::Verbose, &format!("  Checkpoints: {}", spec.training.checkpoint_dir.display()));

    let mut trainer = build_trainer(&spec)
        .map_err(|e| format!("Setup error: {e}"))?
        .with_log_level(level);
    let stats = trainer.train().map_err(|e| format!("Training error: {e}"))?;

    log(
        level,
        LogLevel::Normal,
        &format!(
            "Training complete: {} discriminator / {} generator updates in {:.1}s",
            stats.d_updates, stats.g_updates, stats.elapsed_secs
        ),
    );
    if stats.sample_failures > 0 {
        log(level, LogLevel::Normal, &format!("  {} sample grid(s) failed", stats.sample_failures));
    }
    Ok(())
}

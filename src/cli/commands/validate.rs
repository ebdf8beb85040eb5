//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_spec, GanSpec, ValidateArgs};

/// One-line model summary
pub fn format_model_info(spec: &GanSpec) -> String {
    let m = &spec.model;
    format!(
        "  Model: {}x{}x{} images, z_dim={}, embed_dim={} -> {}, gf_dim={}, df_dim={}, {:?} norm",
        m.output_size,
        m.output_size,
        m.image_shape.c,
        m.z_dim,
        m.embed_dim,
        m.compressed_embed_dim,
        m.gf_dim,
        m.df_dim,
        m.discriminator_norm
    )
}

/// Training loop summary
pub fn format_training_info(spec: &GanSpec) -> String {
    let t = &spec.training;
    [
        format!("  Loss: {:?} (gradient penalty {}, kl_coeff {})", t.loss, t.gradient_penalty, t.kl_coeff),
        format!("  Steps: {} (batch {}, n_critic {})", t.max_steps, t.batch_size, t.n_critic),
        format!("  Samples: {} every {} steps -> {}", t.sample_num, t.sample_period, t.sample_dir.display()),
        format!(
            "  Checkpoints: every {} steps (offset {}), keep {} -> {}",
            t.checkpoint_period,
            t.checkpoint_offset,
            t.checkpoints_to_keep,
            t.checkpoint_dir.display()
        ),
    ]
    .join("\n")
}

/// Optimizer summary
pub fn format_optimizer_info(spec: &GanSpec) -> String {
    let g = &spec.optimizer.generator;
    let d = &spec.optimizer.discriminator;
    format!(
        "  Generator Adam: lr={} betas=({}, {})\n  Discriminator Adam: lr={} betas=({}, {})",
        g.lr, g.beta1, g.beta2, d.lr, d.beta1, d.beta2
    )
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;

    log(level, LogLevel::Normal, &format!("Configuration valid: {}", args.config.display()));
    log(level, LogLevel::Verbose, &format_model_info(&spec));
    log(level, LogLevel::Verbose, &format_training_info(&spec));
    log(level, LogLevel::Verbose, &format_optimizer_info(&spec));
    log(level, LogLevel::Verbose, &format!("  Dataset: {}", spec.data.path.display()));
    Ok(())
}

//! Configuration validation logic

use super::error::ValidationError;
use crate::config::schema::GanSpec;
use crate::model::ModelConfig;
use crate::optim::AdamConfig;
use crate::train::TrainConfig;

/// Validate a complete spec, including that the dataset file exists
pub fn validate_spec(spec: &GanSpec) -> Result<(), ValidationError> {
    if !spec.data.path.exists() {
        return Err(ValidationError::DataPathNotFound(spec.data.path.display().to_string()));
    }
    validate_model(&spec.model)?;
    validate_training(&spec.training)?;
    validate_adam(&spec.optimizer.generator)?;
    validate_adam(&spec.optimizer.discriminator)
}

/// Check that both networks can be built from `config`
pub fn validate_model(config: &ModelConfig) -> Result<(), ValidationError> {
    if config.output_size == 0 || config.output_size % 16 != 0 {
        return Err(ValidationError::InvalidOutputSize(config.output_size));
    }
    let shape = config.image_shape;
    if shape.h != config.output_size || shape.w != config.output_size {
        return Err(ValidationError::ImageSizeMismatch {
            output_size: config.output_size,
            h: shape.h,
            w: shape.w,
        });
    }
    if shape.c != 1 && shape.c != 3 {
        return Err(ValidationError::InvalidChannels(shape.c));
    }

    let dims = [
        ("z_dim", config.z_dim),
        ("embed_dim", config.embed_dim),
        ("compressed_embed_dim", config.compressed_embed_dim),
        ("gf_dim", config.gf_dim),
        ("df_dim", config.df_dim),
    ];
    if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
        return Err(ValidationError::ZeroDimension(name));
    }
    Ok(())
}

/// Check step counts, cadences and loss weights
pub fn validate_training(config: &TrainConfig) -> Result<(), ValidationError> {
    if config.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.batch_size));
    }
    if config.sample_num == 0 {
        return Err(ValidationError::InvalidSampleNum(config.sample_num));
    }
    if config.n_critic == 0 {
        return Err(ValidationError::InvalidCriticRatio(config.n_critic));
    }
    if config.sample_period == 0 {
        return Err(ValidationError::InvalidSamplePeriod(config.sample_period));
    }
    if config.checkpoint_period == 0 {
        return Err(ValidationError::InvalidCheckpointPeriod(config.checkpoint_period));
    }
    if config.checkpoint_offset >= config.checkpoint_period {
        return Err(ValidationError::InvalidCheckpointOffset {
            offset: config.checkpoint_offset,
            period: config.checkpoint_period,
        });
    }
    if config.caption_window == 0 {
        return Err(ValidationError::InvalidCaptionWindow(config.caption_window));
    }
    if config.gradient_penalty.is_nan() || config.gradient_penalty < 0.0 {
        return Err(ValidationError::InvalidGradientPenalty(config.gradient_penalty));
    }
    if config.kl_coeff.is_nan() || config.kl_coeff < 0.0 {
        return Err(ValidationError::InvalidKlCoeff(config.kl_coeff));
    }
    Ok(())
}

fn validate_adam(config: &AdamConfig) -> Result<(), ValidationError> {
    if config.lr.is_nan() || config.lr <= 0.0 || config.lr > 1.0 {
        return Err(ValidationError::InvalidLearningRate(config.lr));
    }
    for beta in [config.beta1, config.beta2] {
        if !(0.0..1.0).contains(&beta) {
            return Err(ValidationError::InvalidBeta(beta));
        }
    }
    if config.epsilon.is_nan() || config.epsilon <= 0.0 {
        return Err(ValidationError::InvalidEpsilon(config.epsilon));
    }
    Ok(())
}

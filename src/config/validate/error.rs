//! Validation error types

/// A spec value outside its allowed range
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Training data path does not exist: {0}")]
    DataPathNotFound(String),

    #[error("Invalid output size: {0} (must be a positive multiple of 16)")]
    InvalidOutputSize(usize),

    #[error("Image shape {h}x{w} does not match output size {output_size}")]
    ImageSizeMismatch { output_size: usize, h: usize, w: usize },

    #[error("Invalid channel count: {0} (must be 1 or 3)")]
    InvalidChannels(usize),

    #[error("Invalid {0}: must be > 0")]
    ZeroDimension(&'static str),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid sample count: {0} (must be > 0)")]
    InvalidSampleNum(usize),

    #[error("Invalid critic ratio: {0} (must be > 0)")]
    InvalidCriticRatio(usize),

    #[error("Invalid sample period: {0} (must be > 0)")]
    InvalidSamplePeriod(usize),

    #[error("Invalid checkpoint period: {0} (must be > 0)")]
    InvalidCheckpointPeriod(usize),

    #[error("Invalid checkpoint offset: {offset} (must be < period {period})")]
    InvalidCheckpointOffset { offset: usize, period: usize },

    #[error("Invalid caption window: {0} (must be > 0)")]
    InvalidCaptionWindow(usize),

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid beta: {0} (must be in [0.0, 1.0))")]
    InvalidBeta(f32),

    #[error("Invalid epsilon: {0} (must be > 0.0)")]
    InvalidEpsilon(f32),

    #[error("Invalid gradient penalty weight: {0} (must be >= 0.0)")]
    InvalidGradientPenalty(f32),

    #[error("Invalid KL coefficient: {0} (must be >= 0.0)")]
    InvalidKlCoeff(f32),
}

impl From<ValidationError> for crate::Error {
    fn from(e: ValidationError) -> Self {
        crate::Error::ConfigError(format!("Invalid config: {e}"))
    }
}

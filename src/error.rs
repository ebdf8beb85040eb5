//! Error types for pintor
//!
//! Training distinguishes two categories of failure: recoverable ones
//! (checkpoint restore, sample rendering) are handled inside the trainer and
//! never surface here as hard errors; everything else is an [`Error`] that
//! propagates out of [`crate::train::GanTrainer::train`].

use thiserror::Error;

/// Result type alias for pintor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by model construction, data loading, checkpointing and training
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error (JSON, YAML, safetensors)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Tensor shape did not match what the model expects
    #[error("Shape mismatch for {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { context: String, expected: Vec<usize>, actual: Vec<usize> },

    /// Checkpoint could not be written or restored
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Dataset could not produce a batch
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Image encoding failed
    #[error("Image error: {0}")]
    Image(String),
}

impl Error {
    /// Build a shape mismatch error
    pub fn shape(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON: {e}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML: {e}"))
    }
}

impl From<safetensors::SafeTensorError> for Error {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(format!("safetensors: {e}"))
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_error_message() {
        let err = Error::shape("generator input z", &[4, 100], &[4, 90]);
        let msg = err.to_string();
        assert!(msg.contains("generator input z"));
        assert!(msg.contains("[4, 100]"));
        assert!(msg.contains("[4, 90]"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = bad.unwrap_err().into();
        assert!(err.to_string().starts_with("Serialization error: JSON"));
    }
}

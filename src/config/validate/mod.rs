//! Configuration validation
//!
//! Rejects specs the model or trainer cannot run before any work starts.

mod error;
mod validator;

#[cfg(test)]
mod proptests;

pub use error::ValidationError;
pub use validator::{validate_model, validate_spec, validate_training};

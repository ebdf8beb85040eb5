//! Optimizers for training neural networks

mod adam;
mod optimizer;

pub use adam::{Adam, AdamConfig};
pub use optimizer::Optimizer;

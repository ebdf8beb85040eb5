//! Declarative configuration
//!
//! A YAML [`GanSpec`] describes the model, the training loop, both
//! optimizers and the dataset. It is validated before anything is built.

mod builder;
mod cli;
mod loader;
mod schema;
mod validate;

pub use builder::{build_dataset, build_gan, build_trainer};
pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, SampleArgs, TrainArgs, ValidateArgs,
};
pub use loader::{load_spec, parse_spec};
pub use schema::{DataConfig, GanSpec, OptimSpec};
pub use validate::{validate_model, validate_spec, validate_training, ValidationError};

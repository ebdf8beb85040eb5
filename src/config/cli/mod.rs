//! CLI argument parsing
//!
//! ```bash
//! pintor train config.yaml
//! pintor train config.yaml --max-steps 2000 --output-dir ./run
//! pintor validate config.yaml
//! pintor info config.yaml --format json
//! pintor sample config.yaml --output grid.png --num 16
//! ```

mod core;
mod types;


pub use self::core::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, SampleArgs, TrainArgs, ValidateArgs,
};
pub use types::OutputFormat;

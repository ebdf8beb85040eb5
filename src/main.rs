//! Pintor CLI
//!
//! ```bash
//! # Train, resuming from the latest checkpoint when one exists
//! pintor train config.yaml
//!
//! # Short run into a scratch directory
//! pintor train config.yaml --max-steps 200 --output-dir /tmp/pintor
//!
//! # Check a config
//! pintor validate config.yaml
//!
//! # Render samples from the latest checkpoint
//! pintor sample config.yaml --output grid.png --num 16
//! ```

use clap::Parser;
use pintor::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! Info command implementation

use super::validate::{format_model_info, format_optimizer_info, format_training_info};
use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{build_gan, load_spec, InfoArgs, OutputFormat};
use crate::nn::Module;

pub fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_spec(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            let gan = build_gan(&spec).map_err(|e| format!("Model error: {e}"))?;
            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("{}", format_model_info(&spec));
            println!(
                "  Parameters: generator {}, discriminator {}",
                gan.generator.num_parameters(),
                gan.discriminator.num_parameters()
            );
            println!("{}", format_training_info(&spec));
            println!("{}", format_optimizer_info(&spec));
            println!("  Dataset: {}", spec.data.path.display());
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec).map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec).map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}

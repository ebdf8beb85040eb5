//! Reading specs from disk

use super::schema::GanSpec;
use super::validate::validate_spec;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;

/// Parse a YAML spec without validating it
pub fn parse_spec(yaml: &str) -> Result<GanSpec> {
    serde_yaml::from_str(yaml).map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}

/// Load and validate a YAML spec
pub fn load_spec<P: AsRef<Path>>(config_path: P) -> Result<GanSpec> {
    let path = config_path.as_ref();
    let yaml = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file {}: {e}", path.display())))?;
    let spec = parse_spec(&yaml)?;
    validate_spec(&spec)?;
    Ok(spec)
}

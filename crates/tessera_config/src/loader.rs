//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{PlacerOptions, TesseraConfig};
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Loads and validates a configuration file.
///
/// `path` may name the file itself or a directory containing `tessera.toml`.
pub fn load_config(path: &Path) -> Result<TesseraConfig, ConfigError> {
    let config_path = if path.is_dir() {
        path.join(CONFIG_FILE_NAME)
    } else {
        path.to_path_buf()
    };
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `tessera.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<TesseraConfig, ConfigError> {
    let config: TesseraConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_placer(&config.placer)?;
    Ok(config)
}

/// Validates the placer options.
///
/// Also used by callers that assemble [`PlacerOptions`] in code or patch a
/// loaded configuration with command-line overrides.
pub fn validate_placer(opts: &PlacerOptions) -> Result<(), ConfigError> {
    if !(opts.effort_level.is_finite() && opts.effort_level > 0.0) {
        return Err(ConfigError::invalid(
            "placer.effort_level",
            "must be a positive number",
        ));
    }
    if !(opts.t_multiplier.is_finite() && opts.t_multiplier > 0.0) {
        return Err(ConfigError::invalid(
            "placer.t_multiplier",
            "must be a positive number",
        ));
    }
    if opts.rlim == Some(0) {
        return Err(ConfigError::invalid("placer.rlim", "must be at least 1"));
    }
    if opts.max_rlim == Some(0) {
        return Err(ConfigError::invalid("placer.max_rlim", "must be at least 1"));
    }
    if opts.max_swap_retries == 0 {
        return Err(ConfigError::invalid(
            "placer.max_swap_retries",
            "must be at least 1",
        ));
    }

    let search = &opts.detailed_search;
    if !(search.coarse_divisor.is_finite() && search.coarse_divisor > 0.0) {
        return Err(ConfigError::invalid(
            "placer.detailed_search.coarse_divisor",
            "must be a positive number",
        ));
    }
    if !(search.tolerance.is_finite() && search.tolerance > 1.0) {
        return Err(ConfigError::invalid(
            "placer.detailed_search.tolerance",
            "must be greater than 1",
        ));
    }
    if search.max_steps == 0 {
        return Err(ConfigError::invalid(
            "placer.detailed_search.max_steps",
            "must be at least 1",
        ));
    }
    Ok(())
}

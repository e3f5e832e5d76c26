//! Parsing and validation of `tessera.toml` placer configuration files.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`TesseraConfig`] whose [`PlacerOptions`] drive the annealing placer.
//! Every option has a default, so an empty file (or no file at all) is a
//! valid configuration.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, validate_placer, CONFIG_FILE_NAME};
pub use types::*;

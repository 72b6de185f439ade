//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML/JSON or does not match the schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but is semantically invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

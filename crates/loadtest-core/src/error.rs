//! Error types for configuration loading.

use std::path::PathBuf;
use thiserror::Error;

/// Invalid or missing configuration. Always fatal, raised before any worker runs.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid size range: min size {min} MB is greater than max size {max} MB")]
    InvalidSizeRange { min: u64, max: u64 },

    #[error("Payload size {0} MB exceeds addressable memory")]
    PayloadTooLarge(u64),

    #[error("Unsupported provider URL: {0}")]
    UnsupportedProvider(String),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, value: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

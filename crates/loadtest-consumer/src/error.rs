//! Error types for the consumer.

use thiserror::Error;

/// Errors that prevent the consumer pool from starting.
///
/// Failures inside a running worker never surface here; they are logged and
/// reported per worker in the [`crate::ConsumeSummary`].
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Configuration error: {0}")]
    Config(#[from] loadtest_core::ConfigError),
}

pub type Result<T> = std::result::Result<T, ConsumerError>;

//! Error types for the sender.

use thiserror::Error;

/// Errors that can occur while running the producer pool.
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Configuration error: {0}")]
    Config(#[from] loadtest_core::ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] queue_client::Error),

    #[error("Payload generation task failed: {0}")]
    Generation(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, SenderError>;

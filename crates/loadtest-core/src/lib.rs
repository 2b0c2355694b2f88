//! Core types for the queue-loadtest harness.
//!
//! This crate sits at the bottom of the workspace and provides:
//!
//! - [`Properties`] - flat key-value configuration loaded from a `.properties` file
//! - [`SenderConfig`] / [`ConsumerConfig`] - resolved, validated run parameters
//! - [`BrokerSettings`] - the broker endpoint description shared by both sides
//! - [`ShutdownCoordinator`] - worker lifecycle, stop signalling and join-all barrier
//!
//! # Architecture
//!
//! ```text
//! loadtest-core (this crate)
//!    │
//!    ├─── queue-client        (broker collaborator, consumes BrokerSettings)
//!    ├─── loadtest-sender     (producer worker pool)
//!    └─── loadtest-consumer   (consumer worker pool, statistics)
//! ```
//!
//! Configuration is resolved exactly once, before any worker starts. Every
//! malformed value surfaces as a [`ConfigError`] at that point.

pub mod args;
pub mod config;
pub mod duration;
pub mod error;
pub mod properties;
pub mod shutdown;

// Re-exports for convenience
pub use args::BrokerArgs;
pub use config::{
    payload_len, size_in_bytes, BrokerSettings, ConsumeMode, ConsumerConfig, ProviderUrl,
    SenderConfig, BYTES_PER_MB, MAX_READ_BUFFER_KB,
};
pub use duration::parse_duration;
pub use error::ConfigError;
pub use properties::Properties;
pub use shutdown::{PoolState, ShutdownCoordinator, StopHandle, WorkerExit};

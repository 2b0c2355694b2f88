//! Producer side of the queue-loadtest harness.
//!
//! A [`ProducerWorkerPool`] splits the configured message count across its
//! workers (see [`allot_messages`]), each of which sends random binary
//! payloads drawn by its own [`PayloadGenerator`].

pub mod args;
pub mod error;
pub mod partition;
pub mod payload;
pub mod pool;

pub use args::SenderArgs;
pub use error::{Result, SenderError};
pub use partition::{allot_messages, describe_allotments, WorkerTask};
pub use payload::{Payload, PayloadGenerator};
pub use pool::{ProducerWorkerPool, RunningProducerPool, SendSummary, WorkerReport};

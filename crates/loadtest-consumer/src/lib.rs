//! Consumer side of the queue-loadtest harness.
//!
//! A [`ConsumerWorkerPool`] drains a destination with N workers in push or
//! pull mode, reading every binary body to the end and discarding it. Counts
//! flow into a shared [`StatisticsAggregator`] that reports throughput every
//! K messages and once at shutdown.

pub mod args;
pub mod drain;
pub mod error;
pub mod pool;
pub mod stats;

pub use args::ConsumerArgs;
pub use drain::{drain_message, DrainOutcome};
pub use error::{ConsumerError, Result};
pub use pool::{ConsumeSummary, ConsumerWorkerPool, ConsumerWorkerReport, RunningConsumerPool};
pub use stats::{
    process_memory_used_mb, spawn_memory_sampler, ReportTrigger, RunningTotals,
    StatisticsAggregator, ThroughputReport,
};

//! queue-loadtest
//!
//! A load generation and consumption harness for message queues.
//!
//! # Features
//!
//! - Sender: a pool of producer workers sending random binary payloads of
//!   configurable size at a configurable pace
//! - Consumer: a pool of consumer workers (push or pull mode) draining a
//!   destination and reporting throughput and memory usage
//! - Loopback: both pools against one broker in a single process
//! - Backends: in-process broker (`memory://`) and Kafka (`kafka://`)
//!
//! # CLI Usage
//!
//! ```bash
//! # Send 100 messages of 1-10 MB with 4 workers
//! queue-loadtest send -c config.properties \
//!   --message-count 100 --min-size-mb 1 --max-size-mb 10 --sender-threads 4
//!
//! # Consume until Enter is pressed, reporting every 50 messages
//! queue-loadtest consume -c config.properties --consumer-threads 4 --stats-interval 50
//!
//! # Self-contained run against the in-process broker
//! queue-loadtest loopback --message-count 20 --max-size-mb 2
//! ```

pub mod connect;
pub mod loopback;
pub mod report;
pub mod stop;

pub use connect::{connect, ensure_destination};
pub use loopback::{run_loopback, LoopbackSummary};
pub use report::write_metrics;
pub use stop::{spawn_stop_triggers, StopTriggers};

//! CLI argument definitions for the consumer.

use clap::Args;
use loadtest_core::config::keys;
use loadtest_core::{BrokerArgs, ConfigError, ConsumeMode, ConsumerConfig};

/// Consumer overrides. Unset flags fall back to the properties file, then defaults.
#[derive(Args, Clone, Debug, Default)]
pub struct ConsumerArgs {
    /// Number of consumer workers
    #[arg(long, env = "CONSUMER_THREAD_COUNT")]
    pub consumer_threads: Option<usize>,

    /// Emit a statistics report every N messages (0 = only at shutdown)
    #[arg(long, env = "CONSUMER_STATS_INTERVAL")]
    pub stats_interval: Option<u64>,

    /// Consumption mode
    #[arg(long, value_enum, env = "CONSUMER_MODE")]
    pub mode: Option<ConsumeMode>,

    /// Bound on a single receive in pull mode, in milliseconds
    #[arg(long, env = "CONSUMER_RECEIVE_TIMEOUT_MS")]
    pub receive_timeout_ms: Option<u64>,

    /// Idle loop tick in push mode, in milliseconds
    #[arg(long, env = "CONSUMER_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Chunk buffer size for reading message bodies, in KB
    #[arg(long, env = "CONSUMER_READ_BUFFER_KB")]
    pub read_buffer_kb: Option<usize>,

    /// Consumer group (Kafka only)
    #[arg(long, env = "CONSUMER_GROUP_ID")]
    pub group_id: Option<String>,

    /// Stop automatically after this long (e.g. "300", "30s", "5m", "1h")
    #[arg(long, env = "CONSUMER_RUN_DURATION")]
    pub run_duration: Option<String>,
}

impl ConsumerArgs {
    /// Resolve the consumer configuration from the properties file plus overrides.
    pub fn resolve(&self, broker: &BrokerArgs) -> Result<ConsumerConfig, ConfigError> {
        let mut props = broker.load_properties()?;
        let overrides = [
            (keys::CONSUMER_THREAD_COUNT, self.consumer_threads.map(|v| v.to_string())),
            (keys::CONSUMER_STATS_INTERVAL, self.stats_interval.map(|v| v.to_string())),
            (keys::CONSUMER_MODE, self.mode.map(|v| v.to_string())),
            (keys::CONSUMER_RECEIVE_TIMEOUT_MS, self.receive_timeout_ms.map(|v| v.to_string())),
            (keys::CONSUMER_POLL_INTERVAL_MS, self.poll_interval_ms.map(|v| v.to_string())),
            (keys::CONSUMER_READ_BUFFER_KB, self.read_buffer_kb.map(|v| v.to_string())),
            (keys::CONSUMER_GROUP_ID, self.group_id.clone()),
            (keys::CONSUMER_RUN_DURATION, self.run_duration.clone()),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                props.set(key, value);
            }
        }
        ConsumerConfig::from_properties(&props)
    }
}

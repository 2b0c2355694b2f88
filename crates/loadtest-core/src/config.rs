//! Resolved run configuration for the sender and consumer.
//!
//! Values are read from [`Properties`] once at startup, validated, and never
//! mutated afterwards. Workers receive them by shared reference or clone.

use crate::duration::parse_duration;
use crate::error::ConfigError;
use crate::properties::Properties;
use serde::Serialize;
use std::time::Duration;

/// 1 MB = 1,048,576 bytes (binary megabyte).
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Largest accepted consumer read buffer, in KB.
pub const MAX_READ_BUFFER_KB: usize = 64 * 1024;

/// Convert a size in MB to bytes, or `None` if it does not fit in a `u64`.
pub fn size_in_bytes(size_mb: u64) -> Option<u64> {
    size_mb.checked_mul(BYTES_PER_MB)
}

/// Byte length of a `size_mb` payload held in memory, if addressable.
pub fn payload_len(size_mb: u64) -> Option<usize> {
    size_in_bytes(size_mb).and_then(|bytes| usize::try_from(bytes).ok())
}

/// Recognized property keys.
pub mod keys {
    pub const PROVIDER_URL: &[&str] = &["provider.url", "weblogic.provider.url"];
    pub const SECURITY_PRINCIPAL: &[&str] =
        &["security.principal", "weblogic.security.principal"];
    pub const SECURITY_CREDENTIALS: &[&str] =
        &["security.credentials", "weblogic.security.credentials"];
    pub const CONNECTION_FACTORY: &[&str] = &["connection.factory", "jms.connection.factory"];
    pub const DESTINATION: &[&str] = &["destination.name", "jms.queue"];

    pub const SENDER_MESSAGE_COUNT: &str = "sender.message.count";
    pub const SENDER_MIN_SIZE_MB: &str = "sender.min.size.mb";
    pub const SENDER_MAX_SIZE_MB: &str = "sender.max.size.mb";
    pub const SENDER_PAUSE_MS: &str = "sender.pause.ms";
    pub const SENDER_THREAD_COUNT: &str = "sender.thread.count";
    pub const SENDER_SEED: &str = "sender.seed";

    pub const CONSUMER_THREAD_COUNT: &str = "consumer.thread.count";
    pub const CONSUMER_STATS_INTERVAL: &str = "consumer.stats.interval";
    pub const CONSUMER_MODE: &str = "consumer.mode";
    pub const CONSUMER_RECEIVE_TIMEOUT_MS: &str = "consumer.receive.timeout.ms";
    pub const CONSUMER_POLL_INTERVAL_MS: &str = "consumer.poll.interval.ms";
    pub const CONSUMER_READ_BUFFER_KB: &str = "consumer.read.buffer.kb";
    pub const CONSUMER_GROUP_ID: &str = "consumer.group.id";
    pub const CONSUMER_RUN_DURATION: &str = "consumer.run.duration";
}

const DEFAULT_CLIENT_ID: &str = "queue-loadtest";

/// Broker backend selected by the provider URL scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUrl {
    /// In-process broker, `memory://<name>`
    Memory(String),
    /// Kafka bootstrap servers, `kafka://h:p[,h:p]` or bare `h:p[,h:p]`
    Kafka(String),
}

impl std::str::FromStr for ProviderUrl {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("memory://") {
            let name = if name.is_empty() { "default" } else { name };
            return Ok(ProviderUrl::Memory(name.to_string()));
        }
        let brokers = s.strip_prefix("kafka://").unwrap_or(s);
        if brokers.is_empty() || brokers.contains("://") {
            return Err(ConfigError::UnsupportedProvider(s.to_string()));
        }
        Ok(ProviderUrl::Kafka(brokers.to_string()))
    }
}

impl std::fmt::Display for ProviderUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderUrl::Memory(name) => write!(f, "memory://{name}"),
            ProviderUrl::Kafka(brokers) => write!(f, "kafka://{brokers}"),
        }
    }
}

/// Broker endpoint description shared by sender and consumer.
#[derive(Clone)]
pub struct BrokerSettings {
    pub provider: ProviderUrl,
    pub principal: Option<String>,
    pub credentials: Option<String>,
    /// Connection factory name, used as the client id
    pub client_id: String,
    /// Queue or topic name
    pub destination: String,
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("provider", &self.provider)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("destination", &self.destination)
            .finish()
    }
}

impl BrokerSettings {
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let provider = props.require_any(keys::PROVIDER_URL)?.parse()?;
        let destination = props.require_any(keys::DESTINATION)?;
        let client_id = props
            .get_any(keys::CONNECTION_FACTORY)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CLIENT_ID)
            .to_string();

        Ok(Self {
            provider,
            principal: non_empty(props.get_any(keys::SECURITY_PRINCIPAL)),
            credentials: non_empty(props.get_any(keys::SECURITY_CREDENTIALS)),
            client_id,
            destination,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

/// Consumer operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConsumeMode {
    /// Per-message callback plus an idle loop checking the stop flag
    Push,
    /// Bounded blocking receive in a loop
    Pull,
}

impl std::fmt::Display for ConsumeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsumeMode::Push => write!(f, "push"),
            ConsumeMode::Pull => write!(f, "pull"),
        }
    }
}

impl std::str::FromStr for ConsumeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" | "listener" => Ok(ConsumeMode::Push),
            "pull" | "receive" => Ok(ConsumeMode::Pull),
            _ => Err(format!("Unknown consumer mode: {s}")),
        }
    }
}

/// Resolved sender parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub broker: BrokerSettings,
    pub thread_count: usize,
    pub message_count: u64,
    pub min_size_mb: u64,
    pub max_size_mb: u64,
    pub pause: Duration,
    /// Base seed for deterministic payloads; worker `i` uses `seed + i`
    pub seed: Option<u64>,
}

impl SenderConfig {
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let config = Self {
            broker: BrokerSettings::from_properties(props)?,
            thread_count: props.parse_or(keys::SENDER_THREAD_COUNT, 1)?,
            message_count: props.parse_or(keys::SENDER_MESSAGE_COUNT, 10)?,
            min_size_mb: props.parse_or(keys::SENDER_MIN_SIZE_MB, 1)?,
            max_size_mb: props.parse_or(keys::SENDER_MAX_SIZE_MB, 250)?,
            pause: Duration::from_millis(props.parse_or(keys::SENDER_PAUSE_MS, 100)?),
            seed: props.parse_opt(keys::SENDER_SEED)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::invalid(
                keys::SENDER_THREAD_COUNT,
                "0",
                "at least one thread is required",
            ));
        }
        if self.min_size_mb > self.max_size_mb {
            return Err(ConfigError::InvalidSizeRange {
                min: self.min_size_mb,
                max: self.max_size_mb,
            });
        }
        if payload_len(self.max_size_mb).is_none() {
            return Err(ConfigError::PayloadTooLarge(self.max_size_mb));
        }
        Ok(())
    }
}

/// Resolved consumer parameters.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub broker: BrokerSettings,
    pub thread_count: usize,
    /// Report every K messages; 0 disables periodic reports
    pub stats_interval: u64,
    pub mode: ConsumeMode,
    /// Bound on a single blocking receive in pull mode
    pub receive_timeout: Duration,
    /// Idle loop tick in push mode
    pub poll_interval: Duration,
    /// Size of the reusable chunk buffer for body reads
    pub read_buffer_bytes: usize,
    pub group_id: String,
    /// Optional deadline after which the consumer stops by itself
    pub run_duration: Option<Duration>,
}

impl ConsumerConfig {
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        let mode = match props.get(keys::CONSUMER_MODE).filter(|v| !v.is_empty()) {
            Some(value) => value
                .parse()
                .map_err(|e: String| ConfigError::invalid(keys::CONSUMER_MODE, value, e))?,
            None => ConsumeMode::Push,
        };

        let run_duration = match props
            .get(keys::CONSUMER_RUN_DURATION)
            .filter(|v| !v.is_empty())
        {
            Some(value) => Some(parse_duration(value).map_err(|e| {
                ConfigError::invalid(keys::CONSUMER_RUN_DURATION, value, e)
            })?),
            None => None,
        };

        let read_buffer_kb: usize = props.parse_or(keys::CONSUMER_READ_BUFFER_KB, 512)?;
        if read_buffer_kb > MAX_READ_BUFFER_KB {
            return Err(ConfigError::invalid(
                keys::CONSUMER_READ_BUFFER_KB,
                &read_buffer_kb.to_string(),
                format!("at most {MAX_READ_BUFFER_KB} KB"),
            ));
        }

        let config = Self {
            broker: BrokerSettings::from_properties(props)?,
            thread_count: props.parse_or(keys::CONSUMER_THREAD_COUNT, 1)?,
            stats_interval: props.parse_or(keys::CONSUMER_STATS_INTERVAL, 100)?,
            mode,
            receive_timeout: Duration::from_millis(
                props.parse_or(keys::CONSUMER_RECEIVE_TIMEOUT_MS, 5000)?,
            ),
            poll_interval: Duration::from_millis(
                props.parse_or(keys::CONSUMER_POLL_INTERVAL_MS, 100)?,
            ),
            read_buffer_bytes: read_buffer_kb * 1024,
            group_id: props
                .get(keys::CONSUMER_GROUP_ID)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_CLIENT_ID)
                .to_string(),
            run_duration,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::invalid(
                keys::CONSUMER_THREAD_COUNT,
                "0",
                "at least one thread is required",
            ));
        }
        if self.read_buffer_bytes == 0 {
            return Err(ConfigError::invalid(
                keys::CONSUMER_READ_BUFFER_KB,
                "0",
                "read buffer must not be empty",
            ));
        }
        if self.read_buffer_bytes > MAX_READ_BUFFER_KB * 1024 {
            return Err(ConfigError::invalid(
                keys::CONSUMER_READ_BUFFER_KB,
                &(self.read_buffer_bytes / 1024).to_string(),
                format!("at most {MAX_READ_BUFFER_KB} KB"),
            ));
        }
        if self.receive_timeout.is_zero() {
            return Err(ConfigError::invalid(
                keys::CONSUMER_RECEIVE_TIMEOUT_MS,
                "0",
                "receive timeout must be positive",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                keys::CONSUMER_POLL_INTERVAL_MS,
                "0",
                "poll interval must be positive",
            ));
        }
        Ok(())
    }
}

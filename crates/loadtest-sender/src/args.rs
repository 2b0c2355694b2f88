//! CLI argument definitions for the sender.

use clap::Args;
use loadtest_core::config::keys;
use loadtest_core::{BrokerArgs, ConfigError, SenderConfig};

/// Sender overrides. Unset flags fall back to the properties file, then defaults.
#[derive(Args, Clone, Debug, Default)]
pub struct SenderArgs {
    /// Total number of messages to send across all workers
    #[arg(long, env = "SENDER_MESSAGE_COUNT")]
    pub message_count: Option<u64>,

    /// Minimum payload size in MB (1 MB = 1,048,576 bytes)
    #[arg(long, env = "SENDER_MIN_SIZE_MB")]
    pub min_size_mb: Option<u64>,

    /// Maximum payload size in MB
    #[arg(long, env = "SENDER_MAX_SIZE_MB")]
    pub max_size_mb: Option<u64>,

    /// Pause between two sends of one worker, in milliseconds
    #[arg(long, env = "SENDER_PAUSE_MS")]
    pub pause_ms: Option<u64>,

    /// Number of producer workers
    #[arg(long, env = "SENDER_THREAD_COUNT")]
    pub sender_threads: Option<usize>,

    /// Random seed for reproducible payloads (worker i uses seed + i)
    #[arg(long, env = "SENDER_SEED")]
    pub seed: Option<u64>,
}

impl SenderArgs {
    /// Resolve the sender configuration from the properties file plus overrides.
    pub fn resolve(&self, broker: &BrokerArgs) -> Result<SenderConfig, ConfigError> {
        let mut props = broker.load_properties()?;
        let overrides = [
            (keys::SENDER_MESSAGE_COUNT, self.message_count.map(|v| v.to_string())),
            (keys::SENDER_MIN_SIZE_MB, self.min_size_mb.map(|v| v.to_string())),
            (keys::SENDER_MAX_SIZE_MB, self.max_size_mb.map(|v| v.to_string())),
            (keys::SENDER_PAUSE_MS, self.pause_ms.map(|v| v.to_string())),
            (keys::SENDER_THREAD_COUNT, self.sender_threads.map(|v| v.to_string())),
            (keys::SENDER_SEED, self.seed.map(|v| v.to_string())),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                props.set(key, value);
            }
        }
        SenderConfig::from_properties(&props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sender.properties");
        std::fs::write(
            &path,
            "weblogic.provider.url=memory://args\njms.queue=q\n\
             sender.message.count=50\nsender.pause.ms=10\n",
        )
        .unwrap();

        let broker = BrokerArgs {
            config: Some(path),
            ..Default::default()
        };
        let args = SenderArgs {
            message_count: Some(7),
            sender_threads: Some(2),
            ..Default::default()
        };
        let config = args.resolve(&broker).unwrap();

        assert_eq!(config.message_count, 7);
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.pause, Duration::from_millis(10));
        assert_eq!(config.max_size_mb, 250);
    }

    #[test]
    fn test_invalid_override_range() {
        let broker = BrokerArgs {
            provider_url: Some("memory://args".to_string()),
            destination: Some("q".to_string()),
            ..Default::default()
        };
        let args = SenderArgs {
            min_size_mb: Some(9),
            max_size_mb: Some(3),
            ..Default::default()
        };
        assert!(matches!(
            args.resolve(&broker),
            Err(ConfigError::InvalidSizeRange { min: 9, max: 3 })
        ));
    }
}

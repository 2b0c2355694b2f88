//! CLI argument definitions shared by all subcommands.

use crate::config::keys;
use crate::error::ConfigError;
use crate::properties::Properties;
use clap::Args;
use std::path::PathBuf;

/// Broker connection arguments. Any flag given overrides the properties file.
#[derive(Args, Clone, Debug, Default)]
pub struct BrokerArgs {
    /// Path to the properties file
    #[arg(long, short = 'c', env = "LOADTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Provider URL (`memory://name`, `kafka://host:port` or `host:port`)
    #[arg(long, env = "LOADTEST_PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Queue or topic name
    #[arg(long, env = "LOADTEST_DESTINATION")]
    pub destination: Option<String>,

    /// Security principal (SASL username)
    #[arg(long, env = "LOADTEST_PRINCIPAL")]
    pub principal: Option<String>,

    /// Security credentials (SASL password)
    #[arg(long, env = "LOADTEST_CREDENTIALS", hide_env_values = true)]
    pub credentials: Option<String>,
}

impl BrokerArgs {
    /// Load the properties file (if any) and apply the broker overrides on top.
    pub fn load_properties(&self) -> Result<Properties, ConfigError> {
        let mut props = match &self.config {
            Some(path) => Properties::from_file(path)?,
            None => Properties::new(),
        };
        self.apply(&mut props);
        Ok(props)
    }

    pub fn apply(&self, props: &mut Properties) {
        let overrides = [
            (keys::PROVIDER_URL[0], &self.provider_url),
            (keys::DESTINATION[0], &self.destination),
            (keys::SECURITY_PRINCIPAL[0], &self.principal),
            (keys::SECURITY_CREDENTIALS[0], &self.credentials),
        ];
        for (key, value) in overrides {
            if let Some(value) = value {
                props.set(key, value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_take_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.properties");
        std::fs::write(
            &path,
            "provider.url=localhost:9092\ndestination.name=from-file\n",
        )
        .unwrap();

        let args = BrokerArgs {
            config: Some(path),
            destination: Some("from-flag".to_string()),
            ..Default::default()
        };
        let props = args.load_properties().unwrap();

        assert_eq!(props.get("provider.url"), Some("localhost:9092"));
        assert_eq!(props.get("destination.name"), Some("from-flag"));
    }

    #[test]
    fn test_override_wins_over_legacy_alias() {
        let mut props = Properties::parse("jms.queue=legacy\n");
        let args = BrokerArgs {
            destination: Some("modern".to_string()),
            ..Default::default()
        };
        args.apply(&mut props);

        assert_eq!(props.get_any(keys::DESTINATION), Some("modern"));
    }
}

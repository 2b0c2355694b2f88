use anyhow::Context;
use loadtest_core::{BrokerSettings, ProviderUrl};
use queue_client::{Connection, Connector, KafkaConnector, KafkaSettings, MemoryBroker};
use std::sync::Arc;
use tracing::info;

fn kafka_connector(
    settings: &BrokerSettings,
    brokers: &str,
    group_id: Option<&str>,
) -> KafkaConnector {
    KafkaConnector::new(KafkaSettings {
        brokers: brokers.to_string(),
        client_id: settings.client_id.clone(),
        group_id: group_id.unwrap_or(&settings.client_id).to_string(),
        principal: settings.principal.clone(),
        credentials: settings.credentials.clone(),
        ..Default::default()
    })
}

// Open the shared top-level connection for the configured provider
pub async fn connect(
    settings: &BrokerSettings,
    group_id: Option<&str>,
) -> anyhow::Result<Arc<dyn Connection>> {
    info!(
        "Connecting to {} (destination '{}')",
        settings.provider, settings.destination
    );

    let connection = match &settings.provider {
        ProviderUrl::Memory(name) => MemoryBroker::named(name).connect().await,
        ProviderUrl::Kafka(brokers) => kafka_connector(settings, brokers, group_id).connect().await,
    };

    connection.with_context(|| format!("Failed to connect to {}", settings.provider))
}

// Create the destination topic up front; a no-op for in-memory queues
pub async fn ensure_destination(settings: &BrokerSettings, partitions: i32) -> anyhow::Result<()> {
    match &settings.provider {
        ProviderUrl::Memory(_) => Ok(()),
        ProviderUrl::Kafka(brokers) => kafka_connector(settings, brokers, None)
            .create_topic_if_not_exists(&settings.destination, partitions)
            .await
            .with_context(|| format!("Failed to create topic '{}'", settings.destination)),
    }
}

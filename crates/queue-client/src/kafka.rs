//! Kafka backend.
//!
//! Mapping onto the connection/session model:
//! - connection: validated base client configuration, metadata checked on connect
//! - session: a clone of that configuration, one per worker
//! - producer: a `FutureProducer` bound to one topic
//! - consumer: a `StreamConsumer` in the configured group with auto-commit,
//!   which gives at-most-once, auto-acknowledge delivery

use crate::client::{Connection, Connector, Destination, MessageConsumer, MessageProducer, Session};
use crate::error::{Error, Result};
use crate::message::{BytesMessage, Message};
use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{BaseConsumer, Consumer as RdkafkaConsumer, StreamConsumer};
use rdkafka::message::Message as RdkafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Largest message librdkafka accepts.
const MAX_MESSAGE_BYTES: &str = "1000000000";

/// Kafka connection settings.
#[derive(Clone)]
pub struct KafkaSettings {
    /// Bootstrap servers (comma-separated list)
    pub brokers: String,
    pub client_id: String,
    /// Consumer group shared by all consumer workers
    pub group_id: String,
    /// SASL PLAIN username
    pub principal: Option<String>,
    /// SASL PLAIN password
    pub credentials: Option<String>,
    /// Timeout for a single produce call
    pub send_timeout: Duration,
}

impl std::fmt::Debug for KafkaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSettings")
            .field("brokers", &self.brokers)
            .field("client_id", &self.client_id)
            .field("group_id", &self.group_id)
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            client_id: "queue-loadtest".to_string(),
            group_id: "queue-loadtest".to_string(),
            principal: None,
            credentials: None,
            send_timeout: Duration::from_secs(30),
        }
    }
}

impl KafkaSettings {
    fn base_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id);

        if let Some(principal) = &self.principal {
            config
                .set("security.protocol", "SASL_PLAINTEXT")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", principal)
                .set("sasl.password", self.credentials.as_deref().unwrap_or_default());
        }
        config
    }
}

/// Connector for a Kafka cluster.
pub struct KafkaConnector {
    settings: KafkaSettings,
}

impl KafkaConnector {
    pub fn new(settings: KafkaSettings) -> Self {
        Self { settings }
    }

    /// Create a Kafka topic if it doesn't exist.
    pub async fn create_topic_if_not_exists(&self, topic: &str, partitions: i32) -> Result<()> {
        let admin_client: AdminClient<DefaultClientContext> = self
            .settings
            .base_config()
            .create()
            .map_err(|e| Error::Connectivity(format!("Failed to create admin client: {e}")))?;

        let new_topic = NewTopic::new(topic, partitions, TopicReplication::Fixed(1))
            .set("max.message.bytes", MAX_MESSAGE_BYTES);
        let opts = AdminOptions::new().operation_timeout(Some(Duration::from_secs(10)));

        let results = admin_client
            .create_topics(&[new_topic], &opts)
            .await
            .map_err(|e| Error::Connectivity(format!("Failed to create topics: {e}")))?;

        for result in results {
            match result {
                Ok(topic_name) => info!("Topic '{topic_name}' created successfully"),
                Err((topic_name, err)) => {
                    let err_str = err.to_string();
                    if err_str.contains("already exists")
                        || err_str.contains("TopicExistsException")
                    {
                        info!("Topic '{topic_name}' already exists");
                    } else {
                        return Err(Error::Connectivity(format!(
                            "Failed to create topic {topic_name}: {err}"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for KafkaConnector {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        let settings = self.settings.clone();

        // Metadata fetch is blocking in librdkafka
        tokio::task::spawn_blocking(move || {
            let probe: BaseConsumer = settings
                .base_config()
                .create()
                .map_err(|e| Error::Connectivity(format!("Failed to create client: {e}")))?;
            probe
                .fetch_metadata(None, Duration::from_secs(10))
                .map_err(|e| {
                    Error::Connectivity(format!(
                        "Failed to reach brokers {}: {e}",
                        settings.brokers
                    ))
                })?;
            info!("Connected to Kafka brokers {}", settings.brokers);
            Ok::<_, Error>(Arc::new(KafkaConnection {
                settings,
                closed: AtomicBool::new(false),
            }) as Arc<dyn Connection>)
        })
        .await
        .map_err(|e| Error::Connectivity(format!("Connect task failed: {e}")))?
    }
}

struct KafkaConnection {
    settings: KafkaSettings,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for KafkaConnection {
    async fn create_session(&self) -> Result<Box<dyn Session>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("connection"));
        }
        Ok(Box::new(KafkaSession {
            settings: self.settings.clone(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct KafkaSession {
    settings: KafkaSettings,
}

#[async_trait]
impl Session for KafkaSession {
    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer>> {
        let producer: FutureProducer = self
            .settings
            .base_config()
            .set("message.timeout.ms", self.settings.send_timeout.as_millis().to_string())
            .set("message.max.bytes", MAX_MESSAGE_BYTES)
            .create()
            .map_err(|e| Error::Connectivity(format!("Failed to create Kafka producer: {e}")))?;

        debug!("Kafka producer created for topic '{}'", destination);
        Ok(Box::new(KafkaProducer {
            producer,
            topic: destination.name().to_string(),
            send_timeout: self.settings.send_timeout,
        }))
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer>> {
        let consumer: StreamConsumer = self
            .settings
            .base_config()
            .set("group.id", &self.settings.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .set("fetch.message.max.bytes", MAX_MESSAGE_BYTES)
            .set("receive.message.max.bytes", "2147483647")
            .create()
            .map_err(|e| Error::Connectivity(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[destination.name()])
            .map_err(|e| Error::Connectivity(format!("Failed to subscribe to topic: {e}")))?;

        debug!("Kafka consumer subscribed to topic '{}'", destination);
        Ok(Box::new(KafkaConsumer { consumer }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn send(&self, payload: Bytes) -> Result<()> {
        let record: FutureRecord<'_, (), [u8]> =
            FutureRecord::to(&self.topic).payload(&payload[..]);

        self.producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(err, _)| {
                Error::Transfer(format!(
                    "Failed to send {} bytes to '{}': {err}",
                    payload.len(),
                    self.topic
                ))
            })?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Duration::from_secs(10)))
            .await
            .map_err(|e| Error::ResourceRelease(format!("Flush task failed: {e}")))?
            .map_err(|e| Error::ResourceRelease(format!("Failed to flush producer: {e}")))
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(Error::Transfer(format!("Error receiving message: {e}"))),
            Ok(Ok(msg)) => Ok(Some(match msg.payload() {
                Some(payload) => Message::Bytes(BytesMessage::new(Bytes::copy_from_slice(payload))),
                None => Message::Empty,
            })),
        }
    }

    async fn close(&self) -> Result<()> {
        self.consumer.unsubscribe();
        Ok(())
    }
}

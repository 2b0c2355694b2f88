use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Named queue or topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    name: String,
}

impl Destination {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Factory that turns an already-resolved endpoint into a live connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Connection>>;
}

/// Top-level connection, shareable across workers.
///
/// Sessions created from it are never shared: each worker opens its own.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn create_session(&self) -> Result<Box<dyn Session>>;

    async fn close(&self) -> Result<()>;
}

/// Auto-acknowledge session scoped to a single worker.
#[async_trait]
pub trait Session: Send + Sync {
    async fn create_producer(&self, destination: &Destination)
        -> Result<Box<dyn MessageProducer>>;

    async fn create_consumer(&self, destination: &Destination)
        -> Result<Box<dyn MessageConsumer>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Send one binary message.
    async fn send(&self, payload: Bytes) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time, which is not an error.
    /// Dropping the returned future before it completes loses no message.
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>>;

    async fn close(&self) -> Result<()>;
}

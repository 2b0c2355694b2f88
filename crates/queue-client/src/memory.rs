//! In-process broker.
//!
//! Every destination is a FIFO queue shared by all connections of one
//! [`MemoryBroker`]. Consumers on the same destination compete for messages,
//! so each message is delivered at most once. Failure injection switches
//! let tests exercise the connectivity and transfer error paths.

use crate::client::{Connection, Connector, Destination, MessageConsumer, MessageProducer, Session};
use crate::error::{Error, Result};
use crate::message::{BytesMessage, Message};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

struct MemoryQueue {
    tx: mpsc::UnboundedSender<Message>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Message>>,
    depth: AtomicUsize,
}

impl MemoryQueue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    fn push(&self, message: Message) {
        // The receiver lives as long as the queue, so this cannot fail
        if self.tx.send(message).is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn pop(&self, timeout: Duration) -> Option<Message> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(message)) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(message)
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    queues: Mutex<HashMap<String, Arc<MemoryQueue>>>,
    fail_sends: AtomicBool,
    fail_sessions: AtomicBool,
    fail_consumers: AtomicBool,
    sessions_opened: AtomicUsize,
    sessions_closed: AtomicUsize,
    messages_sent: AtomicUsize,
}

impl BrokerState {
    fn queue(&self, destination: &Destination) -> Arc<MemoryQueue> {
        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            queues
                .entry(destination.name().to_string())
                .or_insert_with(|| Arc::new(MemoryQueue::new())),
        )
    }
}

/// Handle to an in-process broker. Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide broker registered under `name`, created on first use.
    pub fn named(name: &str) -> Self {
        static REGISTRY: OnceLock<Mutex<HashMap<String, MemoryBroker>>> = OnceLock::new();
        let mut registry = REGISTRY
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.entry(name.to_string()).or_default().clone()
    }

    /// Enqueue a message directly, bypassing sessions.
    pub fn publish(&self, destination: &Destination, message: Message) {
        self.state.queue(destination).push(message);
    }

    /// Number of messages waiting on `destination`.
    pub fn depth(&self, destination: &Destination) -> usize {
        self.state.queue(destination).depth.load(Ordering::SeqCst)
    }

    /// Total messages accepted through producers.
    pub fn messages_sent(&self) -> usize {
        self.state.messages_sent.load(Ordering::SeqCst)
    }

    /// Sessions created and not yet closed.
    pub fn open_sessions(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
            - self.state.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    /// Make every subsequent send fail with a transfer error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.state.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent session creation fail with a connectivity error.
    pub fn set_fail_sessions(&self, fail: bool) {
        self.state.fail_sessions.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent consumer creation fail. Producers are unaffected.
    pub fn set_fail_consumers(&self, fail: bool) {
        self.state.fail_consumers.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self) -> Result<Arc<dyn Connection>> {
        Ok(Arc::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn create_session(&self) -> Result<Box<dyn Session>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("connection"));
        }
        if self.state.fail_sessions.load(Ordering::SeqCst) {
            return Err(Error::Connectivity(
                "session creation rejected by broker".to_string(),
            ));
        }
        let id = self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        debug!("Memory session {} opened", id);
        Ok(Box::new(MemorySession {
            id,
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemorySession {
    id: usize,
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed("session"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn create_producer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageProducer>> {
        self.ensure_open()?;
        Ok(Box::new(MemoryProducer {
            queue: self.state.queue(destination),
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }

    async fn create_consumer(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn MessageConsumer>> {
        self.ensure_open()?;
        if self.state.fail_consumers.load(Ordering::SeqCst) {
            return Err(Error::Connectivity(format!(
                "consumer on '{destination}' rejected by broker"
            )));
        }
        Ok(Box::new(MemoryConsumer {
            queue: self.state.queue(destination),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(Error::ResourceRelease(format!(
                "session {} already closed",
                self.id
            )));
        }
        self.state.sessions_closed.fetch_add(1, Ordering::SeqCst);
        debug!("Memory session {} closed", self.id);
        Ok(())
    }
}

struct MemoryProducer {
    queue: Arc<MemoryQueue>,
    state: Arc<BrokerState>,
    closed: AtomicBool,
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn send(&self, payload: Bytes) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("producer"));
        }
        if self.state.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::Transfer(format!(
                "broker rejected message of {} bytes",
                payload.len()
            )));
        }
        self.queue.push(Message::Bytes(BytesMessage::new(payload)));
        self.state.messages_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
    closed: AtomicBool,
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    async fn receive(&self, timeout: Duration) -> Result<Option<Message>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed("consumer"));
        }
        Ok(self.queue.pop(timeout).await)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_receive() {
        let broker = MemoryBroker::new();
        let destination = Destination::new("queue");
        let connection = broker.connect().await.unwrap();
        let session = connection.create_session().await.unwrap();
        let producer = session.create_producer(&destination).await.unwrap();
        let consumer = session.create_consumer(&destination).await.unwrap();

        producer.send(Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(broker.depth(&destination), 1);
        assert_eq!(broker.messages_sent(), 1);

        let message = consumer
            .receive(Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        match message {
            Message::Bytes(bytes) => assert_eq!(bytes.body_length(), 7),
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(broker.depth(&destination), 0);
    }

    #[tokio::test]
    async fn test_receive_timeout_returns_none() {
        let broker = MemoryBroker::new();
        let connection = broker.connect().await.unwrap();
        let session = connection.create_session().await.unwrap();
        let consumer = session
            .create_consumer(&Destination::new("idle"))
            .await
            .unwrap();

        let start = std::time::Instant::now();
        let received = consumer.receive(Duration::from_millis(30)).await.unwrap();
        assert!(received.is_none());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn test_competing_consumers_share_messages() {
        let broker = MemoryBroker::new();
        let destination = Destination::new("shared");
        for i in 0..10 {
            broker.publish(&destination, Message::Text(i.to_string()));
        }

        let connection = broker.connect().await.unwrap();
        let first = connection.create_session().await.unwrap();
        let second = connection.create_session().await.unwrap();
        let a = first.create_consumer(&destination).await.unwrap();
        let b = second.create_consumer(&destination).await.unwrap();

        let mut received = 0;
        loop {
            let from_a = a.receive(Duration::from_millis(10)).await.unwrap();
            let from_b = b.receive(Duration::from_millis(10)).await.unwrap();
            if from_a.is_none() && from_b.is_none() {
                break;
            }
            received += from_a.is_some() as usize + from_b.is_some() as usize;
        }
        assert_eq!(received, 10);
    }

    #[tokio::test]
    async fn test_session_accounting_and_double_close() {
        let broker = MemoryBroker::new();
        let connection = broker.connect().await.unwrap();
        let session = connection.create_session().await.unwrap();
        assert_eq!(broker.open_sessions(), 1);

        session.close().await.unwrap();
        assert_eq!(broker.open_sessions(), 0);

        let err = session.close().await.unwrap_err();
        assert!(matches!(err, Error::ResourceRelease(_)));
        assert!(session
            .create_producer(&Destination::new("q"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let broker = MemoryBroker::new();
        let destination = Destination::new("faulty");
        let connection = broker.connect().await.unwrap();
        let session = connection.create_session().await.unwrap();
        let producer = session.create_producer(&destination).await.unwrap();

        broker.set_fail_sends(true);
        let err = producer.send(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transfer);
        assert_eq!(broker.depth(&destination), 0);

        broker.set_fail_sends(false);
        broker.set_fail_consumers(true);
        let err = session.create_consumer(&destination).await.err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Connectivity);
        producer.send(Bytes::from_static(b"y")).await.unwrap();
        assert_eq!(broker.depth(&destination), 1);

        broker.set_fail_sessions(true);
        let err = connection.create_session().await.err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Connectivity);
    }

    #[test]
    fn test_named_brokers_are_shared() {
        let destination = Destination::new("registry");
        MemoryBroker::named("registry-test").publish(&destination, Message::Empty);
        assert_eq!(MemoryBroker::named("registry-test").depth(&destination), 1);
        assert_eq!(MemoryBroker::named("other-registry-test").depth(&destination), 0);
    }
}

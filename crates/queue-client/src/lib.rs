//! Broker client abstraction for queue-loadtest.
//!
//! The model is the classic connection/session one: a [`Connector`] yields a
//! shareable [`Connection`], every worker opens its own [`Session`] from it,
//! and producers and consumers are created per session. Two backends are
//! provided:
//!
//! - [`MemoryBroker`]: in-process queues, used for tests and the loopback mode
//! - [`KafkaConnector`]: rdkafka-based, for real clusters

pub mod client;
pub mod error;
pub mod kafka;
pub mod listener;
pub mod memory;
pub mod message;

pub use client::{Connection, Connector, Destination, MessageConsumer, MessageProducer, Session};
pub use error::{Error, ErrorKind, Result};
pub use kafka::{KafkaConnector, KafkaSettings};
pub use listener::{spawn_listener, MessageListener};
pub use memory::MemoryBroker;
pub use message::{BytesMessage, Message};

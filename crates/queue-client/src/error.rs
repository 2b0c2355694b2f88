use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Failure to obtain a connection, session, producer or consumer
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Failure to send or fully read a single message
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Failure while releasing a session, producer or consumer
    #[error("Resource release error: {0}")]
    ResourceRelease(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification used for logging and error policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connectivity,
    Transfer,
    ResourceRelease,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kafka(_) | Error::Transfer(_) => ErrorKind::Transfer,
            Error::Connectivity(_) | Error::Closed(_) => ErrorKind::Connectivity,
            Error::ResourceRelease(_) => ErrorKind::ResourceRelease,
            Error::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

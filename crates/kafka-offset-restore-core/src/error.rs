//! Error types for the offset restore core library.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the offset restore library.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka protocol error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Snapshot content is not well-formed
    #[error("Snapshot parse error in {source_name}: {message}")]
    SnapshotParse {
        source_name: String,
        message: String,
    },

    /// Snapshot decoded but does not have the single-group shape
    #[error("Malformed snapshot: {message} (content: {raw})")]
    Structural { message: String, raw: String },

    /// Restore aborted before commit
    #[error("Restore aborted: {0}")]
    Abort(AbortReason),

    /// Nothing committed for the group, so there is nothing to save
    #[error("Consumer group {group_id} has no committed offsets to save")]
    EmptySnapshot { group_id: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication error
    #[error("Authentication error: {0}")]
    Authentication(String),
}

impl Error {
    /// Returns the abort reason if this error is a validation or range abort.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match self {
            Error::Abort(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Why a restore was aborted before anything was committed.
///
/// Retrying with the same snapshot cannot succeed while cluster state is
/// unchanged, so callers treat every variant as terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Topic named in the snapshot has no live offset metadata
    TopicNotFound { topic: String },

    /// Some requested partitions are not part of the live topic
    PartitionsNotFound {
        topic: String,
        requested: BTreeSet<i32>,
        available: BTreeSet<i32>,
    },

    /// Snapshot asks for a negative offset
    NegativeOffset {
        topic: String,
        partition: i32,
        offset: i64,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::TopicNotFound { topic } => {
                write!(f, "topic {} does not exist in Kafka", topic)
            }
            AbortReason::PartitionsNotFound {
                topic,
                requested,
                available,
            } => write!(
                f,
                "some partitions amongst [{}] do not exist in the cluster partitions [{}] for topic {}",
                join_ids(requested),
                join_ids(available),
                topic
            ),
            AbortReason::NegativeOffset {
                topic,
                partition,
                offset,
            } => write!(
                f,
                "given offset {} for {}:{} is negative",
                offset, topic, partition
            ),
        }
    }
}

pub(crate) fn join_ids(ids: &BTreeSet<i32>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Kafka-specific errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum KafkaError {
    /// Connection failed
    #[error("Failed to connect to broker {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Broker error response
    #[error("Broker returned error code {code}: {message}")]
    BrokerError { code: i16, message: String },

    /// No available brokers
    #[error("No available brokers")]
    NoBrokersAvailable,

    /// Partition not available
    #[error("Partition {partition} not available for topic {topic}")]
    PartitionNotAvailable { topic: String, partition: i32 },

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Certificate loading error
    #[error("Failed to load certificate from {path}: {message}")]
    CertificateLoad { path: String, message: String },

    /// Private key loading error
    #[error("Failed to load private key from {path}: {message}")]
    PrivateKeyLoad { path: String, message: String },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<AbortReason> for Error {
    fn from(reason: AbortReason) -> Self {
        Error::Abort(reason)
    }
}

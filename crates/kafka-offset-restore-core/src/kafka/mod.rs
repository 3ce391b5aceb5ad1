//! Kafka protocol client implementation.

mod client;
pub mod consumer_groups;
mod metadata;
pub mod offsets;
mod router;
mod tls;

pub use client::KafkaClient;
pub use consumer_groups::{commit_offsets, fetch_offsets, CommitResult, CommittedOffset};
pub use metadata::{BrokerMetadata, ClusterMetadata, PartitionMetadata, TopicMetadata};
pub use router::ClusterRouter;

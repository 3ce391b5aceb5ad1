//! Kafka Offset Restore Core Library
//!
//! This crate restores a consumer group's committed offsets from a JSON
//! snapshot, validating every topic and partition against the live cluster
//! before a single commit is issued.

pub mod config;
pub mod error;
pub mod kafka;
pub mod restore;

pub use config::{Config, KafkaConfig};
pub use error::{AbortReason, Error, KafkaError, Result};
pub use kafka::{ClusterRouter, KafkaClient};
pub use restore::{
    restore_offsets, save_offsets, LiveOffsets, LivePartitionOffsets, OffsetCluster,
    OffsetSnapshot, OutOfRangeWarning, ReconciledOffsets, RestoreOptions, RestoreReport,
};

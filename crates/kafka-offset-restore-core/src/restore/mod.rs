//! Consumer group offset restore.

pub mod cluster;
pub mod orchestrator;
pub mod reconciler;
pub mod save;
pub mod snapshot;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use cluster::{LiveOffsets, LivePartitionOffsets, OffsetCluster, ReconciledOffsets};
pub use orchestrator::{restore_offsets, RestoreOptions, RestorePhase, RestoreReport};
pub use reconciler::{build_new_offsets, OutOfRangeWarning, ReconciledPlan};
pub use save::save_offsets;
pub use snapshot::{parse_partition_id, OffsetSnapshot, TopicOffsets, TopicPartitions};
pub use validator::{validate_topic_partitions, TopicValidation};

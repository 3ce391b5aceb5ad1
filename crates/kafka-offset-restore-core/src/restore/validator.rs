//! Topic and partition existence checks against the live cluster.

use std::collections::BTreeSet;
use tracing::error;

use super::cluster::{LiveOffsets, OffsetCluster};
use crate::error::{join_ids, AbortReason};
use crate::Result;

/// Outcome of validating one topic of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicValidation {
    Valid,
    Invalid(AbortReason),
}

impl TopicValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, TopicValidation::Valid)
    }
}

/// Check that `topic` has live offset data and that every requested
/// partition is one the cluster currently knows.
///
/// Partition membership is asked of the cluster directly: `live` only holds
/// offsets for partitions that were fetched.
pub async fn validate_topic_partitions<C>(
    cluster: &C,
    topic: &str,
    requested: &BTreeSet<i32>,
    live: &LiveOffsets,
) -> Result<TopicValidation>
where
    C: OffsetCluster + ?Sized,
{
    if !live.contains_key(topic) {
        error!("Topic {} does not exist in Kafka", topic);
        return Ok(TopicValidation::Invalid(AbortReason::TopicNotFound {
            topic: topic.to_string(),
        }));
    }

    let available = cluster.list_partition_ids(topic).await?;
    if !requested.is_subset(&available) {
        error!(
            "Some partitions amongst [{}] in the snapshot don't exist in the cluster partitions [{}] for topic {}",
            join_ids(requested),
            join_ids(&available),
            topic
        );
        return Ok(TopicValidation::Invalid(AbortReason::PartitionsNotFound {
            topic: topic.to_string(),
            requested: requested.clone(),
            available,
        }));
    }

    Ok(TopicValidation::Valid)
}

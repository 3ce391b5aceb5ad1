//! Cluster operations the restore depends on.
//!
//! The restore logic only sees the [`OffsetCluster`] trait; [`ClusterRouter`]
//! implements it on top of Metadata, ListOffsets, FindCoordinator,
//! OffsetFetch and OffsetCommit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::snapshot::{TopicOffsets, TopicPartitions};
use crate::error::KafkaError;
use crate::kafka::consumer_groups::NO_COMMITTED_OFFSET;
use crate::kafka::ClusterRouter;
use crate::Result;

/// Offsets to commit for one group, `topic -> partition -> offset`
pub type ReconciledOffsets = TopicOffsets;

/// Live offset state of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivePartitionOffsets {
    pub topic: String,
    pub partition: i32,
    /// Offset currently committed by the group (-1 if none)
    pub current_offset: i64,
    /// Earliest offset still retained
    pub low_watermark: i64,
    /// Log end offset
    pub high_watermark: i64,
}

/// Live partition records keyed by topic
pub type LiveOffsets = BTreeMap<String, Vec<LivePartitionOffsets>>;

/// Cluster-side operations needed to save and restore group offsets.
#[async_trait]
pub trait OffsetCluster: Send + Sync {
    /// Fetch live offsets for the topics in `topic_partitions`.
    ///
    /// Topics the cluster does not know are left out of the result. The
    /// partition sets are a hint; callers must filter the records they get.
    async fn get_live_partition_offsets(
        &self,
        group_id: &str,
        topic_partitions: &TopicPartitions,
    ) -> Result<LiveOffsets>;

    /// Partition ids currently known for a topic, empty if the topic is unknown.
    async fn list_partition_ids(&self, topic: &str) -> Result<BTreeSet<i32>>;

    /// Commit all offsets for a group in a single request.
    async fn commit_group_offsets(&self, group_id: &str, offsets: &ReconciledOffsets)
        -> Result<()>;

    /// Offsets the group has committed, optionally restricted to some topics.
    async fn fetch_committed_offsets(
        &self,
        group_id: &str,
        topics: Option<&[String]>,
    ) -> Result<ReconciledOffsets>;
}

#[async_trait]
impl OffsetCluster for ClusterRouter {
    async fn get_live_partition_offsets(
        &self,
        group_id: &str,
        topic_partitions: &TopicPartitions,
    ) -> Result<LiveOffsets> {
        let mut live = LiveOffsets::new();

        for (topic, requested) in topic_partitions {
            let available = self.partition_ids(topic).await?;
            if available.is_empty() {
                debug!("Topic {} not present in cluster metadata", topic);
                continue;
            }

            let partitions: Vec<i32> = requested
                .iter()
                .copied()
                .filter(|p| available.contains(p))
                .collect();

            let watermarks = self.get_watermarks(topic, &partitions).await?;

            let filter = BTreeMap::from([(topic.clone(), partitions)]);
            let committed: BTreeMap<i32, i64> = self
                .fetch_offsets(group_id, Some(&filter))
                .await?
                .into_iter()
                .filter(|c| c.error_code == 0 && c.topic == *topic)
                .map(|c| (c.partition, c.offset))
                .collect();

            let records = watermarks
                .into_iter()
                .map(|(partition, (low, high))| LivePartitionOffsets {
                    topic: topic.clone(),
                    partition,
                    current_offset: committed
                        .get(&partition)
                        .copied()
                        .unwrap_or(NO_COMMITTED_OFFSET),
                    low_watermark: low,
                    high_watermark: high,
                })
                .collect();

            live.insert(topic.clone(), records);
        }

        Ok(live)
    }

    async fn list_partition_ids(&self, topic: &str) -> Result<BTreeSet<i32>> {
        self.partition_ids(topic).await
    }

    async fn commit_group_offsets(
        &self,
        group_id: &str,
        offsets: &ReconciledOffsets,
    ) -> Result<()> {
        let results = self.commit_offsets(group_id, offsets).await?;

        let failed: Vec<_> = results.iter().filter(|r| r.error_code != 0).collect();
        if let Some(first) = failed.first() {
            let partitions: Vec<String> = failed
                .iter()
                .map(|r| format!("{}:{} (code {})", r.topic, r.partition, r.error_code))
                .collect();
            return Err(KafkaError::BrokerError {
                code: first.error_code,
                message: format!(
                    "OffsetCommit for group {} failed for {}",
                    group_id,
                    partitions.join(", ")
                ),
            }
            .into());
        }

        Ok(())
    }

    async fn fetch_committed_offsets(
        &self,
        group_id: &str,
        topics: Option<&[String]>,
    ) -> Result<ReconciledOffsets> {
        let mut offsets = ReconciledOffsets::new();

        for committed in self.fetch_offsets(group_id, None).await? {
            if committed.error_code != 0 || committed.offset == NO_COMMITTED_OFFSET {
                continue;
            }
            if let Some(wanted) = topics {
                if !wanted.contains(&committed.topic) {
                    continue;
                }
            }
            offsets
                .entry(committed.topic)
                .or_default()
                .insert(committed.partition, committed.offset);
        }

        Ok(offsets)
    }
}

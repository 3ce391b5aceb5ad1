//! In-memory cluster used by the restore unit tests.
//!
//! Partition metadata and live offset records are registered separately, so a
//! test can describe a partition the cluster knows about but for which the
//! live fetch returned nothing. The crate-level suite under `tests/` has its
//! own `MockCluster`, which always registers both together and counts calls.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::cluster::{LiveOffsets, LivePartitionOffsets, OffsetCluster, ReconciledOffsets};
use super::snapshot::TopicPartitions;
use crate::Result;

#[derive(Default)]
pub(crate) struct StaticCluster {
    /// What `list_partition_ids` reports
    partitions: BTreeMap<String, BTreeSet<i32>>,
    /// What `get_live_partition_offsets` reports, independent of `partitions`
    live: LiveOffsets,
    commits: Mutex<Vec<(String, ReconciledOffsets)>>,
}

impl StaticCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_topic(mut self, topic: &str, partitions: &[i32]) -> Self {
        self.partitions
            .insert(topic.to_string(), partitions.iter().copied().collect());
        self
    }

    pub(crate) fn with_live(mut self, record: LivePartitionOffsets) -> Self {
        self.live.entry(record.topic.clone()).or_default().push(record);
        self
    }

    pub(crate) fn record(
        topic: &str,
        partition: i32,
        current: i64,
        low: i64,
        high: i64,
    ) -> LivePartitionOffsets {
        LivePartitionOffsets {
            topic: topic.to_string(),
            partition,
            current_offset: current,
            low_watermark: low,
            high_watermark: high,
        }
    }

    pub(crate) fn live_offsets(&self) -> LiveOffsets {
        self.live.clone()
    }

    pub(crate) fn commits(&self) -> Vec<(String, ReconciledOffsets)> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl OffsetCluster for StaticCluster {
    async fn get_live_partition_offsets(
        &self,
        _group_id: &str,
        topic_partitions: &TopicPartitions,
    ) -> Result<LiveOffsets> {
        Ok(self
            .live
            .iter()
            .filter(|(topic, _)| topic_partitions.contains_key(*topic))
            .map(|(topic, records)| (topic.clone(), records.clone()))
            .collect())
    }

    async fn list_partition_ids(&self, topic: &str) -> Result<BTreeSet<i32>> {
        Ok(self.partitions.get(topic).cloned().unwrap_or_default())
    }

    async fn commit_group_offsets(
        &self,
        group_id: &str,
        offsets: &ReconciledOffsets,
    ) -> Result<()> {
        self.commits
            .lock()
            .unwrap()
            .push((group_id.to_string(), offsets.clone()));
        Ok(())
    }

    async fn fetch_committed_offsets(
        &self,
        _group_id: &str,
        topics: Option<&[String]>,
    ) -> Result<ReconciledOffsets> {
        let mut offsets = ReconciledOffsets::new();
        for (topic, records) in &self.live {
            if topics.is_some_and(|wanted| !wanted.contains(topic)) {
                continue;
            }
            for record in records.iter().filter(|r| r.current_offset >= 0) {
                offsets
                    .entry(topic.clone())
                    .or_default()
                    .insert(record.partition, record.current_offset);
            }
        }
        Ok(offsets)
    }
}

//! Merge snapshot offsets with live watermarks into the offsets to commit.
//!
//! Policy:
//! - a topic or partition missing from the cluster aborts the whole restore
//! - a negative offset aborts the whole restore
//! - an offset outside `[low_watermark, high_watermark]` is committed anyway,
//!   with a warning
//! - partitions the snapshot does not name are never touched

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, error, warn};

use super::cluster::{LiveOffsets, OffsetCluster, ReconciledOffsets};
use super::snapshot::TopicOffsets;
use super::validator::{validate_topic_partitions, TopicValidation};
use crate::error::{AbortReason, Error};
use crate::Result;

/// A requested offset that lies outside the partition's retained range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfRangeWarning {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub low_watermark: i64,
    pub high_watermark: i64,
}

impl fmt::Display for OutOfRangeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Given offset {} for topic-partition {}:{} is outside the range of low watermark {} and high watermark {}",
            self.offset, self.topic, self.partition, self.low_watermark, self.high_watermark
        )
    }
}

/// Offsets ready to commit, plus the range warnings raised while building them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledPlan {
    pub offsets: ReconciledOffsets,
    pub warnings: Vec<OutOfRangeWarning>,
}

impl ReconciledPlan {
    pub fn partition_count(&self) -> usize {
        self.offsets.values().map(|p| p.len()).sum()
    }
}

/// Build the offsets to commit from the snapshot and live cluster state.
///
/// Topics are processed in name order and the first failing topic aborts the
/// run with `Error::Abort`; nothing is committed here.
pub async fn build_new_offsets<C>(
    cluster: &C,
    snapshot_topics: &TopicOffsets,
    live: &LiveOffsets,
) -> Result<ReconciledPlan>
where
    C: OffsetCluster + ?Sized,
{
    let mut plan = ReconciledPlan::default();

    for (topic, desired) in snapshot_topics {
        let requested: BTreeSet<i32> = desired.keys().copied().collect();

        if let TopicValidation::Invalid(reason) =
            validate_topic_partitions(cluster, topic, &requested, live).await?
        {
            return Err(Error::Abort(reason));
        }

        let records = live.get(topic).map(Vec::as_slice).unwrap_or(&[]);
        let mut seen = BTreeSet::new();

        for record in records {
            let Some(&offset) = desired.get(&record.partition) else {
                continue;
            };

            if offset < 0 {
                error!("Given offset {} for {}:{} is negative", offset, topic, record.partition);
                return Err(Error::Abort(AbortReason::NegativeOffset {
                    topic: topic.clone(),
                    partition: record.partition,
                    offset,
                }));
            }

            if offset < record.low_watermark || offset > record.high_watermark {
                let warning = OutOfRangeWarning {
                    topic: topic.clone(),
                    partition: record.partition,
                    offset,
                    low_watermark: record.low_watermark,
                    high_watermark: record.high_watermark,
                };
                warn!("{}", warning);
                plan.warnings.push(warning);
            }

            plan.offsets
                .entry(topic.clone())
                .or_default()
                .insert(record.partition, offset);
            seen.insert(record.partition);
        }

        for partition in requested.difference(&seen) {
            warn!(
                "No live offset data returned for {}:{}, partition will not be restored",
                topic, partition
            );
        }
        debug!("Reconciled {} partitions for topic {}", seen.len(), topic);
    }

    Ok(plan)
}

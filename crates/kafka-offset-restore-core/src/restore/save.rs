//! Capture a group's committed offsets as a snapshot.

use tracing::{info, warn};

use super::cluster::OffsetCluster;
use super::snapshot::OffsetSnapshot;
use crate::error::Error;
use crate::Result;

/// Read the offsets `group_id` has committed into a snapshot that
/// [`restore_offsets`](super::restore_offsets) accepts.
///
/// Partitions without a committed offset are left out. A group with nothing
/// committed (for the requested topics) is an error.
pub async fn save_offsets<C>(
    cluster: &C,
    group_id: &str,
    topics: Option<&[String]>,
) -> Result<OffsetSnapshot>
where
    C: OffsetCluster + ?Sized,
{
    if group_id.trim().is_empty() {
        return Err(Error::Config("consumer group id must not be empty".to_string()));
    }

    let mut offsets = cluster.fetch_committed_offsets(group_id, topics).await?;
    offsets.retain(|_, partitions| !partitions.is_empty());

    if let Some(wanted) = topics {
        for topic in wanted.iter().filter(|t| !offsets.contains_key(*t)) {
            warn!("Group {} has no committed offsets for topic {}", group_id, topic);
        }
    }

    if offsets.is_empty() {
        return Err(Error::EmptySnapshot {
            group_id: group_id.to_string(),
        });
    }

    let snapshot = OffsetSnapshot::new(group_id, offsets);
    info!(
        "Captured {} partitions across {} topics for group {}",
        snapshot.partition_count(),
        snapshot.topics().len(),
        group_id
    );
    Ok(snapshot)
}

//! Restore a consumer group's offsets from a snapshot.
//!
//! The run is strictly linear, with no retries:
//!
//! ```text
//! START -> FETCH_LIVE -> RECONCILE -> COMMIT -> DONE
//! ```
//!
//! Any failing phase ends the run. Validation and negative-offset failures
//! come back as `Error::Abort`, everything else (malformed snapshot, broker
//! and transport errors) is propagated unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info};

use super::cluster::{OffsetCluster, ReconciledOffsets};
use super::reconciler::{build_new_offsets, OutOfRangeWarning};
use super::snapshot::OffsetSnapshot;
use crate::error::Error;
use crate::Result;

/// Options for a restore run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Compute and report the offsets without committing them
    pub dry_run: bool,
}

/// Phases of a restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Start,
    FetchLive,
    Reconcile,
    Commit,
    Done,
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestorePhase::Start => "START",
            RestorePhase::FetchLive => "FETCH_LIVE",
            RestorePhase::Reconcile => "RECONCILE",
            RestorePhase::Commit => "COMMIT",
            RestorePhase::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful restore run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Consumer group the offsets were restored for
    pub group_id: String,

    /// Completion timestamp (epoch milliseconds)
    pub executed_at: i64,

    /// Whether this was a dry run
    pub dry_run: bool,

    /// Whether the offsets were committed to the cluster
    pub committed: bool,

    /// Offsets committed (or that would have been, for a dry run)
    pub offsets: ReconciledOffsets,

    /// Offsets accepted despite being outside the retained range
    pub warnings: Vec<OutOfRangeWarning>,

    /// Number of partitions in `offsets`
    pub partitions_restored: usize,

    /// Duration in milliseconds
    pub duration_ms: u64,
}

/// Restore the snapshot's offsets for its consumer group.
pub async fn restore_offsets<C>(
    cluster: &C,
    snapshot: &OffsetSnapshot,
    options: &RestoreOptions,
) -> Result<RestoreReport>
where
    C: OffsetCluster + ?Sized,
{
    let start_time = Instant::now();
    let group_id = snapshot.group_id();

    check_structure(snapshot)?;
    debug!("Offset restore for group {} entering {}", group_id, RestorePhase::Start);

    info!(
        "Restoring {} partitions across {} topics for group {}",
        snapshot.partition_count(),
        snapshot.topics().len(),
        group_id
    );

    let phase = RestorePhase::FetchLive;
    debug!("Offset restore for group {} entering {}", group_id, phase);
    let topic_partitions = snapshot.requested_partitions();
    let live = cluster
        .get_live_partition_offsets(group_id, &topic_partitions)
        .await
        .map_err(|e| aborted(group_id, phase, e))?;

    let phase = RestorePhase::Reconcile;
    debug!("Offset restore for group {} entering {}", group_id, phase);
    let plan = build_new_offsets(cluster, snapshot.topics(), &live)
        .await
        .map_err(|e| aborted(group_id, phase, e))?;

    let phase = RestorePhase::Commit;
    let committed = if options.dry_run {
        info!(
            "Dry run: would restore group {} to offsets {:?}",
            group_id, plan.offsets
        );
        false
    } else {
        debug!("Offset restore for group {} entering {}", group_id, phase);
        cluster
            .commit_group_offsets(group_id, &plan.offsets)
            .await
            .map_err(|e| aborted(group_id, phase, e))?;
        info!("Restored to new offsets {:?}", plan.offsets);
        true
    };

    debug!("Offset restore for group {} reached {}", group_id, RestorePhase::Done);

    let partitions_restored = plan.partition_count();
    Ok(RestoreReport {
        group_id: group_id.to_string(),
        executed_at: chrono::Utc::now().timestamp_millis(),
        dry_run: options.dry_run,
        committed,
        offsets: plan.offsets,
        warnings: plan.warnings,
        partitions_restored,
        duration_ms: start_time.elapsed().as_millis() as u64,
    })
}

/// Reject snapshots that cannot name a group and at least one partition.
fn check_structure(snapshot: &OffsetSnapshot) -> Result<()> {
    let message = if snapshot.group_id().trim().is_empty() {
        "snapshot has no consumer group id"
    } else if snapshot.partition_count() == 0 {
        "snapshot names no topic partitions to restore"
    } else {
        return Ok(());
    };

    let raw = snapshot.to_string();
    error!(
        "Given parsed consumer offsets data {} could not be parsed: {}",
        raw, message
    );
    Err(Error::Structural {
        message: message.to_string(),
        raw,
    })
}

fn aborted(group_id: &str, phase: RestorePhase, err: Error) -> Error {
    error!(
        "Offset restore for group {} aborted during {}: {}",
        group_id, phase, err
    );
    err
}

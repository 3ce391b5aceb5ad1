//! Full save and restore runs over the wire.

use std::collections::BTreeMap;

use kafka_offset_restore_core::error::AbortReason;
use kafka_offset_restore_core::kafka::ClusterRouter;
use kafka_offset_restore_core::restore::{
    restore_offsets, save_offsets, OffsetSnapshot, RestoreOptions,
};
use kafka_protocol::messages::ApiKey;

use super::fake_broker::FakeCluster;

async fn two_broker_cluster() -> FakeCluster {
    FakeCluster::start(2)
        .await
        .with_partition("orders", 0, 1, 10, 40)
        .with_partition("orders", 1, 2, 10, 40)
        .with_partition("payments", 0, 2, 0, 5)
        .with_coordinator(2)
}

#[tokio::test]
async fn restore_commits_snapshot_through_coordinator() {
    let cluster = two_broker_cluster().await;
    let snapshot = OffsetSnapshot::from_slice(
        br#"{"g1": {"orders": {"0": 12, "1": 50}, "payments": {"0": 3}}}"#,
        "inline",
    )
    .unwrap();

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let report = restore_offsets(&router, &snapshot, &RestoreOptions::default())
        .await
        .unwrap();
    router.close().await;

    assert!(report.committed);
    assert_eq!(report.partitions_restored, 3);
    // orders:1 is above the high watermark: committed anyway, with a warning
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].partition, 1);

    let committed = cluster.committed("g1");
    assert_eq!(committed["orders"], BTreeMap::from([(0, 12), (1, 50)]));
    assert_eq!(committed["payments"], BTreeMap::from([(0, 3)]));
    assert_eq!(cluster.served_by(ApiKey::OffsetCommit), vec![2]);
}

#[tokio::test]
async fn unknown_partition_aborts_before_any_commit() {
    let cluster = two_broker_cluster().await;
    let snapshot =
        OffsetSnapshot::from_slice(br#"{"g1": {"orders": {"0": 12, "5": 1}}}"#, "inline")
            .unwrap();

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let err = restore_offsets(&router, &snapshot, &RestoreOptions::default())
        .await
        .unwrap_err();
    router.close().await;

    assert!(matches!(
        err.abort_reason(),
        Some(AbortReason::PartitionsNotFound { topic, .. }) if topic == "orders"
    ));
    assert!(cluster.served_by(ApiKey::OffsetCommit).is_empty());
    assert!(cluster.committed("g1").is_empty());
}

#[tokio::test]
async fn saved_snapshot_restores_after_offsets_move() {
    let cluster = two_broker_cluster()
        .await
        .with_committed("g1", "orders", 0, 20)
        .with_committed("g1", "orders", 1, 30);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let saved = save_offsets(&router, "g1", None).await.unwrap();

    let moved = OffsetSnapshot::from_slice(br#"{"g1": {"orders": {"0": 39, "1": 39}}}"#, "inline")
        .unwrap();
    restore_offsets(&router, &moved, &RestoreOptions::default())
        .await
        .unwrap();
    assert_eq!(cluster.committed("g1")["orders"], BTreeMap::from([(0, 39), (1, 39)]));

    restore_offsets(&router, &saved, &RestoreOptions::default())
        .await
        .unwrap();
    router.close().await;

    assert_eq!(cluster.committed("g1")["orders"], BTreeMap::from([(0, 20), (1, 30)]));
}

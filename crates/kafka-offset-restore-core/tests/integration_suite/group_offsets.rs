//! Consumer group offset reads and commits against fake brokers.

use std::collections::BTreeMap;

use kafka_offset_restore_core::error::{Error, KafkaError};
use kafka_offset_restore_core::kafka::ClusterRouter;
use kafka_offset_restore_core::restore::{OffsetCluster, ReconciledOffsets};
use kafka_protocol::messages::ApiKey;

use super::fake_broker::FakeCluster;

fn offsets(entries: &[(&str, &[(i32, i64)])]) -> ReconciledOffsets {
    entries
        .iter()
        .map(|(topic, partitions)| {
            (
                topic.to_string(),
                partitions.iter().copied().collect::<BTreeMap<_, _>>(),
            )
        })
        .collect()
}

// ============================================================================
// Commits
// ============================================================================

#[tokio::test]
async fn commit_goes_to_group_coordinator() {
    let cluster = FakeCluster::start(3)
        .await
        .with_partition("orders", 0, 1, 0, 100)
        .with_coordinator(3);
    let wanted = offsets(&[("orders", &[(0, 12)])]);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    router.commit_group_offsets("g1", &wanted).await.unwrap();
    router.close().await;

    assert_eq!(cluster.committed("g1"), wanted);
    assert_eq!(cluster.served_by(ApiKey::OffsetCommit), vec![3]);
}

#[tokio::test]
async fn commit_errors_name_every_failed_partition() {
    let cluster = FakeCluster::start(1)
        .await
        .with_commit_error("orders", 1, 25)
        .with_commit_error("orders", 2, 29);
    let wanted = offsets(&[("orders", &[(0, 5), (1, 6), (2, 7)])]);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let err = router.commit_group_offsets("g1", &wanted).await.unwrap_err();
    router.close().await;

    match err {
        Error::Kafka(KafkaError::BrokerError { code, message }) => {
            assert_eq!(code, 25);
            assert!(message.contains("group g1"), "{}", message);
            assert!(message.contains("orders:1 (code 25)"), "{}", message);
            assert!(message.contains("orders:2 (code 29)"), "{}", message);
            assert!(!message.contains("orders:0"), "{}", message);
        }
        other => panic!("expected broker error, got {:?}", other),
    }
}

#[tokio::test]
async fn moved_coordinator_is_looked_up_again() {
    let cluster = FakeCluster::start(2)
        .await
        .with_committed("g1", "orders", 0, 1);
    let wanted = offsets(&[("orders", &[(0, 9)])]);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    router.fetch_committed_offsets("g1", None).await.unwrap();

    cluster.move_coordinator(2);
    router.commit_group_offsets("g1", &wanted).await.unwrap();
    router.close().await;

    assert_eq!(cluster.committed("g1"), wanted);
    assert_eq!(cluster.served_by(ApiKey::OffsetCommit), vec![1, 2]);
    assert_eq!(cluster.served_by(ApiKey::FindCoordinator).len(), 2);
}

// ============================================================================
// Committed Offset Reads
// ============================================================================

#[tokio::test]
async fn committed_offsets_are_read_from_coordinator() {
    let cluster = FakeCluster::start(2)
        .await
        .with_coordinator(2)
        .with_committed("g1", "orders", 0, 5)
        .with_committed("g1", "orders", 1, 8)
        .with_committed("g1", "payments", 0, 9)
        .with_committed("other", "orders", 0, 100);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let all = router.fetch_committed_offsets("g1", None).await.unwrap();
    let filtered = router
        .fetch_committed_offsets("g1", Some(&["orders".to_string()]))
        .await
        .unwrap();
    router.close().await;

    assert_eq!(
        all,
        offsets(&[("orders", &[(0, 5), (1, 8)]), ("payments", &[(0, 9)])])
    );
    assert_eq!(filtered, offsets(&[("orders", &[(0, 5), (1, 8)])]));
    assert_eq!(cluster.served_by(ApiKey::OffsetFetch), vec![2, 2]);
}

#[tokio::test]
async fn fetch_from_moved_coordinator_is_rerouted() {
    let cluster = FakeCluster::start(2)
        .await
        .with_committed("g1", "orders", 0, 4);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    router.fetch_committed_offsets("g1", None).await.unwrap();

    cluster.move_coordinator(2);
    let committed = router.fetch_committed_offsets("g1", None).await.unwrap();
    router.close().await;

    assert_eq!(committed, offsets(&[("orders", &[(0, 4)])]));
    // Broker 1 answered NOT_COORDINATOR the second time
    assert_eq!(cluster.served_by(ApiKey::OffsetFetch), vec![1, 1, 2]);
}

#[tokio::test]
async fn group_without_commits_reads_empty() {
    let cluster = FakeCluster::start(1).await;

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let committed = router.fetch_committed_offsets("fresh", None).await.unwrap();
    router.close().await;

    assert!(committed.is_empty());
}

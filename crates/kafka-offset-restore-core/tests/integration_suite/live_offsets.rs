//! Live offset lookups against fake brokers.
//!
//! - ListOffsets reaches each partition's leader
//! - Unknown topics are left out, unrequested partitions are never fetched
//! - Partitions without a committed offset report -1
//! - A stale leader is re-resolved once through fresh metadata

use std::collections::{BTreeMap, BTreeSet};

use kafka_offset_restore_core::error::{Error, KafkaError};
use kafka_offset_restore_core::kafka::ClusterRouter;
use kafka_offset_restore_core::restore::{LivePartitionOffsets, OffsetCluster, TopicPartitions};
use kafka_protocol::messages::ApiKey;

use super::fake_broker::FakeCluster;

fn request(entries: &[(&str, &[i32])]) -> TopicPartitions {
    entries
        .iter()
        .map(|(topic, partitions)| {
            (
                topic.to_string(),
                partitions.iter().copied().collect::<BTreeSet<_>>(),
            )
        })
        .collect()
}

fn record(topic: &str, partition: i32, current: i64, low: i64, high: i64) -> LivePartitionOffsets {
    LivePartitionOffsets {
        topic: topic.to_string(),
        partition,
        current_offset: current,
        low_watermark: low,
        high_watermark: high,
    }
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn list_offsets_goes_to_each_partition_leader() {
    let cluster = FakeCluster::start(2)
        .await
        .with_partition("orders", 0, 1, 0, 100)
        .with_partition("orders", 1, 2, 5, 50)
        .with_coordinator(2)
        .with_committed("g1", "orders", 0, 42);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let live = router
        .get_live_partition_offsets("g1", &request(&[("orders", &[0, 1])]))
        .await
        .unwrap();
    router.close().await;

    assert_eq!(
        live["orders"],
        vec![
            record("orders", 0, 42, 0, 100),
            record("orders", 1, -1, 5, 50),
        ]
    );

    // Earliest and latest lookups, once per leader
    let mut list_offsets = cluster.served_by(ApiKey::ListOffsets);
    list_offsets.sort();
    assert_eq!(list_offsets, vec![1, 1, 2, 2]);

    assert_eq!(cluster.served_by(ApiKey::FindCoordinator), vec![1]);
    assert_eq!(cluster.served_by(ApiKey::OffsetFetch), vec![2]);
}

#[tokio::test]
async fn stale_leader_is_rerouted_after_metadata_refresh() {
    let cluster = FakeCluster::start(2)
        .await
        .with_partition("orders", 0, 1, 3, 30);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    router.partition_ids("orders").await.unwrap();

    cluster.move_leader("orders", 0, 2);
    let watermarks = router.get_watermarks("orders", &[0]).await.unwrap();
    router.close().await;

    assert_eq!(watermarks, BTreeMap::from([(0, (3, 30))]));
    assert_eq!(cluster.served_by(ApiKey::ListOffsets), vec![1, 2, 2]);
}

#[tokio::test]
async fn partition_without_leader_is_not_available() {
    let cluster = FakeCluster::start(1)
        .await
        .with_partition("orders", 0, -1, 0, 10);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let err = router
        .get_live_partition_offsets("g1", &request(&[("orders", &[0])]))
        .await
        .unwrap_err();
    router.close().await;

    match err {
        Error::Kafka(KafkaError::PartitionNotAvailable { topic, partition }) => {
            assert_eq!(topic, "orders");
            assert_eq!(partition, 0);
        }
        other => panic!("expected partition not available, got {:?}", other),
    }
    assert!(cluster.served_by(ApiKey::ListOffsets).is_empty());
}

// ============================================================================
// Topic and Partition Selection
// ============================================================================

#[tokio::test]
async fn unknown_topics_are_left_out() {
    let cluster = FakeCluster::start(1)
        .await
        .with_partition("orders", 0, 1, 0, 10);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let live = router
        .get_live_partition_offsets("g1", &request(&[("orders", &[0]), ("missing", &[0])]))
        .await
        .unwrap();

    assert_eq!(live.keys().collect::<Vec<_>>(), vec!["orders"]);
    assert!(router.list_partition_ids("missing").await.unwrap().is_empty());
    router.close().await;
}

#[tokio::test]
async fn only_requested_existing_partitions_are_fetched() {
    let cluster = FakeCluster::start(1)
        .await
        .with_partition("orders", 0, 1, 0, 10)
        .with_partition("orders", 1, 1, 0, 10)
        .with_partition("orders", 2, 1, 0, 10)
        .with_partition("orders", 3, 1, 0, 10);

    let router = ClusterRouter::connect(cluster.kafka_config()).await.unwrap();
    let live = router
        .get_live_partition_offsets("g1", &request(&[("orders", &[1, 3, 7])]))
        .await
        .unwrap();

    assert_eq!(
        router.list_partition_ids("orders").await.unwrap(),
        BTreeSet::from([0, 1, 2, 3])
    );
    router.close().await;

    let partitions: Vec<i32> = live["orders"].iter().map(|r| r.partition).collect();
    assert_eq!(partitions, vec![1, 3]);
    assert!(live["orders"].iter().all(|r| r.current_offset == -1));
}

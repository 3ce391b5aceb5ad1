//! ListOffsets lookups for partition watermarks.

use kafka_protocol::messages::{
    list_offsets_request::{ListOffsetsPartition, ListOffsetsTopic},
    ApiKey, BrokerId, ListOffsetsRequest, ListOffsetsResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use std::collections::BTreeMap;
use tracing::debug;

use super::KafkaClient;
use crate::error::KafkaError;
use crate::Result;

/// ListOffsets sentinel timestamp for the log start offset
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// ListOffsets sentinel timestamp for the log end offset
pub const LATEST_TIMESTAMP: i64 = -1;

/// Get the (low, high) watermark of each partition in one topic.
pub async fn get_watermarks(
    client: &KafkaClient,
    topic: &str,
    partitions: &[i32],
) -> Result<BTreeMap<i32, (i64, i64)>> {
    if partitions.is_empty() {
        return Ok(BTreeMap::new());
    }

    let earliest = list_offsets(client, topic, partitions, EARLIEST_TIMESTAMP).await?;
    let latest = list_offsets(client, topic, partitions, LATEST_TIMESTAMP).await?;

    let mut watermarks = BTreeMap::new();
    for partition in partitions {
        let low = earliest
            .get(partition)
            .copied()
            .ok_or_else(|| not_available(topic, *partition))?;
        let high = latest
            .get(partition)
            .copied()
            .ok_or_else(|| not_available(topic, *partition))?;
        watermarks.insert(*partition, (low, high));
    }

    debug!(
        "Fetched watermarks for {} partitions of {}",
        watermarks.len(),
        topic
    );
    Ok(watermarks)
}

/// Resolve a ListOffsets timestamp for every given partition of a topic
async fn list_offsets(
    client: &KafkaClient,
    topic: &str,
    partitions: &[i32],
    timestamp: i64,
) -> Result<BTreeMap<i32, i64>> {
    let list_topic = ListOffsetsTopic::default()
        .with_name(TopicName(StrBytes::from_string(topic.to_string())))
        .with_partitions(
            partitions
                .iter()
                .map(|p| {
                    ListOffsetsPartition::default()
                        .with_partition_index(*p)
                        .with_timestamp(timestamp)
                })
                .collect(),
        );

    let request = ListOffsetsRequest::default()
        .with_replica_id(BrokerId(-1)) // Client mode
        .with_isolation_level(0) // READ_UNCOMMITTED
        .with_topics(vec![list_topic]);

    let response: ListOffsetsResponse = client.send_request(ApiKey::ListOffsets, request).await?;

    let mut offsets = BTreeMap::new();
    for topic_response in response.topics {
        if topic_response.name.as_str() != topic {
            continue;
        }

        for partition in topic_response.partitions {
            if partition.error_code != 0 {
                return Err(KafkaError::BrokerError {
                    code: partition.error_code,
                    message: format!(
                        "ListOffsets error for {}:{}: code {}",
                        topic, partition.partition_index, partition.error_code
                    ),
                }
                .into());
            }
            offsets.insert(partition.partition_index, partition.offset);
        }
    }

    Ok(offsets)
}

fn not_available(topic: &str, partition: i32) -> crate::Error {
    KafkaError::PartitionNotAvailable {
        topic: topic.to_string(),
        partition,
    }
    .into()
}

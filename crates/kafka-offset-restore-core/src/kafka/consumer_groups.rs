//! Consumer group offset operations.
//!
//! - FindCoordinator: locate the broker that owns a group
//! - OffsetFetch: read the offsets a group has committed
//! - OffsetCommit: write a group's offsets in a single request

use kafka_protocol::messages::{
    offset_commit_request::{OffsetCommitRequestPartition, OffsetCommitRequestTopic},
    offset_fetch_request::OffsetFetchRequestTopic,
    ApiKey, FindCoordinatorRequest, FindCoordinatorResponse, GroupId, OffsetCommitRequest,
    OffsetCommitResponse, OffsetFetchRequest, OffsetFetchResponse, TopicName,
};
use kafka_protocol::protocol::StrBytes;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::metadata::BrokerMetadata;
use super::KafkaClient;
use crate::error::KafkaError;
use crate::Result;

/// Offset reported by OffsetFetch when the group has no commit for a partition
pub const NO_COMMITTED_OFFSET: i64 = -1;

/// FindCoordinator key type for consumer groups
const GROUP_KEY_TYPE: i8 = 0;

/// Committed offset for a partition
#[derive(Debug, Clone)]
pub struct CommittedOffset {
    /// Topic name
    pub topic: String,
    /// Partition ID
    pub partition: i32,
    /// Committed offset (-1 when nothing was committed)
    pub offset: i64,
    /// Commit metadata
    pub metadata: Option<String>,
    /// Error code (0 = success)
    pub error_code: i16,
}

/// Per-partition outcome of an OffsetCommit request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub topic: String,
    pub partition: i32,
    pub error_code: i16,
}

/// Ask a broker which broker coordinates `group_id`.
pub async fn find_coordinator(client: &KafkaClient, group_id: &str) -> Result<BrokerMetadata> {
    let request = FindCoordinatorRequest::default()
        .with_key(StrBytes::from_string(group_id.to_string()))
        .with_key_type(GROUP_KEY_TYPE);

    let response: FindCoordinatorResponse =
        client.send_request(ApiKey::FindCoordinator, request).await?;

    if response.error_code != 0 {
        return Err(KafkaError::BrokerError {
            code: response.error_code,
            message: format!(
                "FindCoordinator for group {} failed: {}",
                group_id,
                response
                    .error_message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("error code {}", response.error_code))
            ),
        }
        .into());
    }

    let coordinator = BrokerMetadata {
        node_id: response.node_id.0,
        host: response.host.to_string(),
        port: response.port,
    };
    debug!(
        "Group {} is coordinated by broker {} at {}",
        group_id,
        coordinator.node_id,
        coordinator.address()
    );
    Ok(coordinator)
}

/// Fetch committed offsets for a consumer group.
///
/// `topics` maps topic names to the partitions of interest; `None` asks the
/// broker for every offset the group has committed.
pub async fn fetch_offsets(
    client: &KafkaClient,
    group_id: &str,
    topics: Option<&BTreeMap<String, Vec<i32>>>,
) -> Result<Vec<CommittedOffset>> {
    let request_topics = topics.map(|topic_map| {
        topic_map
            .iter()
            .map(|(topic, partitions)| {
                OffsetFetchRequestTopic::default()
                    .with_name(TopicName(StrBytes::from_string(topic.clone())))
                    .with_partition_indexes(partitions.clone())
            })
            .collect::<Vec<_>>()
    });

    let request = OffsetFetchRequest::default()
        .with_group_id(GroupId(StrBytes::from_string(group_id.to_string())))
        .with_topics(request_topics);

    let response: OffsetFetchResponse = client.send_request(ApiKey::OffsetFetch, request).await?;

    if response.error_code != 0 {
        return Err(KafkaError::BrokerError {
            code: response.error_code,
            message: format!(
                "OffsetFetch for group {} failed with error code {}",
                group_id, response.error_code
            ),
        }
        .into());
    }

    let mut offsets = Vec::new();
    for topic in response.topics {
        for partition in topic.partitions {
            offsets.push(CommittedOffset {
                topic: topic.name.to_string(),
                partition: partition.partition_index,
                offset: partition.committed_offset,
                metadata: partition
                    .metadata
                    .as_ref()
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string()),
                error_code: partition.error_code,
            });
        }
    }

    debug!(
        "Fetched {} committed offsets for group {}",
        offsets.len(),
        group_id
    );
    Ok(offsets)
}

/// Commit offsets for a consumer group in one OffsetCommit request.
pub async fn commit_offsets(
    client: &KafkaClient,
    group_id: &str,
    offsets: &BTreeMap<String, BTreeMap<i32, i64>>,
) -> Result<Vec<CommitResult>> {
    let topics: Vec<_> = offsets
        .iter()
        .map(|(topic, partitions)| {
            let partition_data: Vec<_> = partitions
                .iter()
                .map(|(partition, offset)| {
                    OffsetCommitRequestPartition::default()
                        .with_partition_index(*partition)
                        .with_committed_offset(*offset)
                })
                .collect();

            OffsetCommitRequestTopic::default()
                .with_name(TopicName(StrBytes::from_string(topic.clone())))
                .with_partitions(partition_data)
        })
        .collect();

    let request = OffsetCommitRequest::default()
        .with_group_id(GroupId(StrBytes::from_string(group_id.to_string())))
        .with_topics(topics);

    let response: OffsetCommitResponse = client.send_request(ApiKey::OffsetCommit, request).await?;

    let mut results = Vec::new();
    for topic in response.topics {
        for partition in topic.partitions {
            if partition.error_code != 0 {
                warn!(
                    "Failed to commit offset for {}:{} - error code {}",
                    topic.name.as_str(),
                    partition.partition_index,
                    partition.error_code
                );
            }
            results.push(CommitResult {
                topic: topic.name.to_string(),
                partition: partition.partition_index,
                error_code: partition.error_code,
            });
        }
    }

    debug!("Committed {} offsets for group {}", results.len(), group_id);
    Ok(results)
}

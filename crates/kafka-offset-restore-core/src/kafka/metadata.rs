//! Kafka Metadata API implementation.

use kafka_protocol::messages::metadata_request::MetadataRequestTopic;
use kafka_protocol::messages::{ApiKey, MetadataRequest, MetadataResponse, TopicName};
use kafka_protocol::protocol::StrBytes;
use tracing::debug;

use super::KafkaClient;
use crate::error::KafkaError;
use crate::Result;

/// Error code for a topic the cluster does not know
const UNKNOWN_TOPIC_OR_PARTITION: i16 = 3;

/// Broker address as advertised in cluster metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

impl BrokerMetadata {
    /// `host:port` form used to open a connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Brokers and topics from one Metadata response
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

/// Topic metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub partitions: Vec<PartitionMetadata>,
}

/// Partition metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub partition_id: i32,
    pub leader_id: i32,
}

/// Fetch metadata for the given topics, or for every topic when `None`.
///
/// Topics the broker reports as unknown are left out of the result; any other
/// topic-level error fails the request.
pub async fn fetch_metadata(
    client: &KafkaClient,
    topics: Option<&[String]>,
) -> Result<ClusterMetadata> {
    let requested = topics.map(|names| {
        names
            .iter()
            .map(|name| {
                MetadataRequestTopic::default()
                    .with_name(Some(TopicName(StrBytes::from_string(name.clone()))))
            })
            .collect::<Vec<_>>()
    });

    let request = MetadataRequest::default()
        .with_topics(requested)
        .with_allow_auto_topic_creation(false);

    let response: MetadataResponse = client.send_request(ApiKey::Metadata, request).await?;
    debug!(
        "Metadata response: {} brokers, {} topics",
        response.brokers.len(),
        response.topics.len()
    );

    let brokers = response
        .brokers
        .iter()
        .map(|broker| BrokerMetadata {
            node_id: broker.node_id.0,
            host: broker.host.to_string(),
            port: broker.port,
        })
        .collect();

    let mut result = Vec::with_capacity(response.topics.len());
    for topic in response.topics {
        let name = topic
            .name
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_default();

        match topic.error_code {
            0 => {}
            UNKNOWN_TOPIC_OR_PARTITION => {
                debug!("Topic {} is unknown to the cluster", name);
                continue;
            }
            code => {
                return Err(KafkaError::BrokerError {
                    code,
                    message: format!("Metadata request failed for topic {}", name),
                }
                .into());
            }
        }

        let partitions = topic
            .partitions
            .iter()
            .map(|p| PartitionMetadata {
                partition_id: p.partition_index,
                leader_id: p.leader_id.0,
            })
            .collect();

        result.push(TopicMetadata { name, partitions });
    }

    Ok(ClusterMetadata {
        brokers,
        topics: result,
    })
}

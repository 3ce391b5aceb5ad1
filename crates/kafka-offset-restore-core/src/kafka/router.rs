//! Broker routing for multi-broker clusters.
//!
//! ListOffsets must reach the partition leader and the group offset APIs must
//! reach the group coordinator. Any other broker answers with
//! NOT_LEADER_OR_FOLLOWER or NOT_COORDINATOR, so the router keeps one
//! connection per broker and sends each request to the broker that owns it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;
use crate::error::{Error, KafkaError};
use crate::Result;

use super::consumer_groups::{self, CommitResult, CommittedOffset};
use super::metadata::{self, BrokerMetadata};
use super::{offsets, KafkaClient};

/// Leader id reported for a partition that currently has no leader
const NO_LEADER: i32 = -1;

pub(crate) const NOT_LEADER_OR_FOLLOWER: i16 = 6;
pub(crate) const COORDINATOR_NOT_AVAILABLE: i16 = 15;
pub(crate) const NOT_COORDINATOR: i16 = 16;

/// Routes requests to partition leaders and group coordinators.
///
/// Leaders are learned from the Metadata responses behind
/// [`partition_ids`](Self::partition_ids); coordinators from FindCoordinator,
/// cached per group. A request rejected because leadership or coordination
/// moved is re-routed once after a fresh lookup.
pub struct ClusterRouter {
    /// Template for per-broker connections
    config: KafkaConfig,

    /// Connection used for Metadata and FindCoordinator
    bootstrap_client: KafkaClient,

    /// broker_id -> advertised address
    brokers: RwLock<HashMap<i32, BrokerMetadata>>,

    /// (topic, partition) -> leader broker_id
    partition_leaders: RwLock<HashMap<(String, i32), i32>>,

    /// group_id -> coordinator broker_id
    coordinators: RwLock<HashMap<String, i32>>,

    /// broker_id -> open connection
    connections: RwLock<HashMap<i32, Arc<KafkaClient>>>,
}

impl ClusterRouter {
    /// Connect to the first reachable bootstrap server.
    pub async fn connect(config: KafkaConfig) -> Result<Self> {
        let bootstrap_client = KafkaClient::new(config.clone());
        bootstrap_client.connect().await?;

        Ok(Self {
            config,
            bootstrap_client,
            brokers: RwLock::new(HashMap::new()),
            partition_leaders: RwLock::new(HashMap::new()),
            coordinators: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Refresh metadata for one topic and return its partition ids.
    ///
    /// Empty when the topic does not exist. The partition leaders seen here
    /// are what [`get_watermarks`](Self::get_watermarks) routes by.
    pub async fn partition_ids(&self, topic: &str) -> Result<BTreeSet<i32>> {
        let cluster =
            metadata::fetch_metadata(&self.bootstrap_client, Some(&[topic.to_string()])).await?;
        self.record_brokers(&cluster.brokers).await;

        let mut ids = BTreeSet::new();
        let mut leaders = self.partition_leaders.write().await;
        leaders.retain(|(name, _), _| name != topic);

        for partition in cluster
            .topics
            .into_iter()
            .filter(|t| t.name == topic)
            .flat_map(|t| t.partitions)
        {
            leaders.insert((topic.to_string(), partition.partition_id), partition.leader_id);
            ids.insert(partition.partition_id);
        }

        debug!("Topic {} has {} partitions", topic, ids.len());
        Ok(ids)
    }

    /// Get the (low, high) watermarks of some partitions of a topic, asking
    /// each partition's leader.
    pub async fn get_watermarks(
        &self,
        topic: &str,
        partitions: &[i32],
    ) -> Result<BTreeMap<i32, (i64, i64)>> {
        match self.watermarks_by_leader(topic, partitions).await {
            Err(e) if is_not_leader_error(&e) => {
                warn!(
                    "NOT_LEADER_OR_FOLLOWER listing offsets for {}, refreshing metadata",
                    topic
                );
                self.partition_ids(topic).await?;
                self.clear_connection_cache().await;
                self.watermarks_by_leader(topic, partitions).await
            }
            other => other,
        }
    }

    async fn watermarks_by_leader(
        &self,
        topic: &str,
        partitions: &[i32],
    ) -> Result<BTreeMap<i32, (i64, i64)>> {
        let mut by_leader: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        for &partition in partitions {
            let leader = self.leader(topic, partition).await?;
            by_leader.entry(leader).or_default().push(partition);
        }

        let mut watermarks = BTreeMap::new();
        for (leader, leader_partitions) in by_leader {
            debug!(
                "Listing offsets for {} partitions of {} on broker {}",
                leader_partitions.len(),
                topic,
                leader
            );
            let client = self.broker_connection(leader).await?;
            watermarks.extend(offsets::get_watermarks(&client, topic, &leader_partitions).await?);
        }

        Ok(watermarks)
    }

    /// Fetch a group's committed offsets from its coordinator.
    pub async fn fetch_offsets(
        &self,
        group_id: &str,
        topics: Option<&BTreeMap<String, Vec<i32>>>,
    ) -> Result<Vec<CommittedOffset>> {
        let client = self.coordinator(group_id).await?;
        match consumer_groups::fetch_offsets(&client, group_id, topics).await {
            Err(e) if is_coordinator_moved(&e) => {
                warn!("Coordinator for group {} moved, looking it up again", group_id);
                self.forget_coordinator(group_id).await;
                let client = self.coordinator(group_id).await?;
                consumer_groups::fetch_offsets(&client, group_id, topics).await
            }
            other => other,
        }
    }

    /// Commit a group's offsets through its coordinator.
    ///
    /// A coordinator that no longer owns the group rejects the whole request,
    /// so it is sent once more to the coordinator found by a fresh lookup.
    pub async fn commit_offsets(
        &self,
        group_id: &str,
        offsets: &BTreeMap<String, BTreeMap<i32, i64>>,
    ) -> Result<Vec<CommitResult>> {
        let client = self.coordinator(group_id).await?;
        let results = consumer_groups::commit_offsets(&client, group_id, offsets).await?;
        if !results
            .iter()
            .any(|r| is_coordinator_moved_code(r.error_code))
        {
            return Ok(results);
        }

        warn!(
            "OffsetCommit for group {} reached a broker that no longer coordinates it",
            group_id
        );
        self.forget_coordinator(group_id).await;
        let client = self.coordinator(group_id).await?;
        consumer_groups::commit_offsets(&client, group_id, offsets).await
    }

    /// Close the bootstrap connection and every broker connection.
    pub async fn close(&self) {
        self.clear_connection_cache().await;
        self.bootstrap_client.close().await;
    }

    async fn record_brokers(&self, brokers: &[BrokerMetadata]) {
        let mut known = self.brokers.write().await;
        for broker in brokers {
            known.insert(broker.node_id, broker.clone());
        }
    }

    async fn leader(&self, topic: &str, partition: i32) -> Result<i32> {
        let leaders = self.partition_leaders.read().await;
        match leaders.get(&(topic.to_string(), partition)) {
            Some(&leader) if leader != NO_LEADER => Ok(leader),
            _ => Err(KafkaError::PartitionNotAvailable {
                topic: topic.to_string(),
                partition,
            }
            .into()),
        }
    }

    async fn coordinator(&self, group_id: &str) -> Result<Arc<KafkaClient>> {
        let cached = self.coordinators.read().await.get(group_id).copied();
        let node_id = match cached {
            Some(node_id) => node_id,
            None => {
                let coordinator =
                    consumer_groups::find_coordinator(&self.bootstrap_client, group_id).await?;
                let node_id = coordinator.node_id;
                self.record_brokers(std::slice::from_ref(&coordinator)).await;
                self.coordinators
                    .write()
                    .await
                    .insert(group_id.to_string(), node_id);
                node_id
            }
        };

        self.broker_connection(node_id).await
    }

    async fn forget_coordinator(&self, group_id: &str) {
        let removed = self.coordinators.write().await.remove(group_id);
        if let Some(node_id) = removed {
            self.drop_connection(node_id).await;
        }
    }

    /// Get or open the connection to a broker.
    async fn broker_connection(&self, broker_id: i32) -> Result<Arc<KafkaClient>> {
        if let Some(client) = self.connections.read().await.get(&broker_id) {
            return Ok(Arc::clone(client));
        }

        let address = {
            let brokers = self.brokers.read().await;
            brokers
                .get(&broker_id)
                .map(BrokerMetadata::address)
                .ok_or_else(|| KafkaError::Protocol(format!("Unknown broker ID: {}", broker_id)))?
        };

        debug!("Opening connection to broker {} at {}", broker_id, address);
        let mut broker_config = self.config.clone();
        broker_config.bootstrap_servers = vec![address];

        let client = Arc::new(KafkaClient::new(broker_config));
        client.connect().await?;

        self.connections
            .write()
            .await
            .insert(broker_id, Arc::clone(&client));
        Ok(client)
    }

    async fn drop_connection(&self, broker_id: i32) {
        let removed = self.connections.write().await.remove(&broker_id);
        if let Some(client) = removed {
            client.close().await;
        }
    }

    async fn clear_connection_cache(&self) {
        let clients: Vec<_> = self
            .connections
            .write()
            .await
            .drain()
            .map(|(_, client)| client)
            .collect();

        for client in &clients {
            client.close().await;
        }
        if !clients.is_empty() {
            info!("Closed {} broker connections", clients.len());
        }
    }
}

fn broker_error_code(error: &Error) -> Option<i16> {
    match error {
        Error::Kafka(KafkaError::BrokerError { code, .. }) => Some(*code),
        _ => None,
    }
}

fn is_not_leader_error(error: &Error) -> bool {
    broker_error_code(error) == Some(NOT_LEADER_OR_FOLLOWER)
}

fn is_coordinator_moved(error: &Error) -> bool {
    broker_error_code(error).is_some_and(is_coordinator_moved_code)
}

fn is_coordinator_moved_code(code: i16) -> bool {
    matches!(code, COORDINATOR_NOT_AVAILABLE | NOT_COORDINATOR)
}

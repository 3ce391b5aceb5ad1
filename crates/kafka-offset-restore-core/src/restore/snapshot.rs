//! Offset snapshot file format.
//!
//! A snapshot is a JSON object with exactly one key, the consumer group id,
//! mapping topic names to `{partition: offset}` objects:
//!
//! ```text
//! {"group1": {"topic1": {"0": 10, "1": 20}}}
//! ```
//!
//! Repeating a key anywhere in that nesting is rejected rather than letting
//! the last occurrence win. Only the shape is checked here. Whether the topics and partitions exist,
//! and whether the offsets are usable, is decided against the live cluster
//! during reconciliation.

use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, error};

use crate::error::Error;
use crate::Result;

/// `topic -> partition -> offset`
pub type TopicOffsets = BTreeMap<String, BTreeMap<i32, i64>>;

/// `topic -> requested partition ids`
pub type TopicPartitions = BTreeMap<String, BTreeSet<i32>>;

/// Desired offsets for a single consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetSnapshot {
    group_id: String,
    topics: TopicOffsets,
}

impl OffsetSnapshot {
    pub fn new(group_id: impl Into<String>, topics: TopicOffsets) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
        }
    }

    /// Consumer group the offsets belong to
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Desired offsets keyed by topic, then partition
    pub fn topics(&self) -> &TopicOffsets {
        &self.topics
    }

    /// Partition ids requested per topic
    pub fn requested_partitions(&self) -> TopicPartitions {
        self.topics
            .iter()
            .map(|(topic, partitions)| (topic.clone(), partitions.keys().copied().collect()))
            .collect()
    }

    /// Total number of (topic, partition) entries
    pub fn partition_count(&self) -> usize {
        self.topics.values().map(BTreeMap::len).sum()
    }

    /// Parse a snapshot file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes, &path.display().to_string())
    }

    /// Parse a snapshot from any reader. `source_name` is used in diagnostics.
    pub fn from_reader<R: Read>(mut reader: R, source_name: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_slice(&bytes, source_name)
    }

    /// Parse a snapshot from raw bytes. `source_name` is used in diagnostics.
    pub fn from_slice(bytes: &[u8], source_name: &str) -> Result<Self> {
        let raw = String::from_utf8_lossy(bytes);

        let document: Value = serde_json::from_slice(bytes).map_err(|e| {
            error!(
                "Given consumer offsets file {} could not be parsed: {}",
                source_name, e
            );
            Error::SnapshotParse {
                source_name: source_name.to_string(),
                message: e.to_string(),
            }
        })?;

        let keys: KeyTree = serde_json::from_slice(bytes).map_err(|e| Error::SnapshotParse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        if let Some(path) = keys.duplicate_key() {
            return Err(structural(
                &format!("key {} appears more than once", path.join(" / ")),
                &raw,
            ));
        }

        let Value::Object(groups) = document else {
            return Err(structural(
                "top level must be an object keyed by consumer group id",
                &raw,
            ));
        };

        let (group_id, topics_value) = single_group(&groups, &raw)?;
        if group_id.trim().is_empty() {
            return Err(structural("consumer group id is empty", &raw));
        }

        let raw_topics: BTreeMap<String, BTreeMap<String, i64>> =
            serde_json::from_value(topics_value.clone()).map_err(|e| {
                error!(
                    "Offsets for group {} in {} have an unexpected shape: {}",
                    group_id, source_name, e
                );
                Error::SnapshotParse {
                    source_name: source_name.to_string(),
                    message: format!("group {}: {}", group_id, e),
                }
            })?;

        let mut topics = TopicOffsets::new();
        for (topic, partitions) in raw_topics {
            let mut normalized = BTreeMap::new();
            for (key, offset) in partitions {
                let partition = parse_partition_id(&key).ok_or_else(|| {
                    structural(
                        &format!("invalid partition id {:?} for topic {}", key, topic),
                        &raw,
                    )
                })?;
                if normalized.insert(partition, offset).is_some() {
                    return Err(structural(
                        &format!("partition {} listed twice for topic {}", partition, topic),
                        &raw,
                    ));
                }
            }
            topics.insert(topic, normalized);
        }

        let snapshot = Self::new(group_id.clone(), topics);
        debug!(
            "Parsed snapshot for group {} with {} topics, {} partitions from {}",
            snapshot.group_id,
            snapshot.topics.len(),
            snapshot.partition_count(),
            source_name
        );
        Ok(snapshot)
    }

    /// Serialize into the snapshot file format
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// Write the snapshot file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut json = self.to_json_pretty()?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    fn to_value(&self) -> Value {
        let topics: Map<String, Value> = self
            .topics
            .iter()
            .map(|(topic, partitions)| {
                let offsets: Map<String, Value> = partitions
                    .iter()
                    .map(|(partition, offset)| (partition.to_string(), Value::from(*offset)))
                    .collect();
                (topic.clone(), Value::Object(offsets))
            })
            .collect();

        let mut root = Map::new();
        root.insert(self.group_id.clone(), Value::Object(topics));
        Value::Object(root)
    }
}

impl fmt::Display for OffsetSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Normalize a snapshot partition key to a partition id.
///
/// This is the only place partition keys are converted; everything downstream
/// compares `i32` ids.
pub fn parse_partition_id(key: &str) -> Option<i32> {
    key.trim().parse::<i32>().ok().filter(|id| *id >= 0)
}

/// The one `(group id, topics)` entry of the top-level object.
///
/// Runs after [`KeyTree::duplicate_key`], so a group id repeated in the
/// source never reaches this point as a single entry.
fn single_group<'a>(groups: &'a Map<String, Value>, raw: &str) -> Result<(&'a String, &'a Value)> {
    let mut entries = groups.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        (None, _) => Err(structural("snapshot contains no consumer group", raw)),
        (Some(_), Some(_)) => {
            let names: Vec<&str> = groups.keys().map(String::as_str).collect();
            Err(structural(
                &format!(
                    "expected exactly one consumer group, found {}: {}",
                    names.len(),
                    names.join(", ")
                ),
                raw,
            ))
        }
    }
}

fn structural(message: &str, raw: &str) -> Error {
    error!(
        "Given consumer offsets data {} could not be parsed: {}",
        raw, message
    );
    Error::Structural {
        message: message.to_string(),
        raw: raw.to_string(),
    }
}

/// Object keys of a JSON document in source order, repeats included.
///
/// `serde_json::Value` keeps only the last value of a repeated key.
#[derive(Debug, Default)]
struct KeyTree(Vec<(String, KeyTree)>);

impl KeyTree {
    /// Path to the first key repeated within one object
    fn duplicate_key(&self) -> Option<Vec<&str>> {
        let mut seen = HashSet::new();
        for (key, _) in &self.0 {
            if !seen.insert(key.as_str()) {
                return Some(vec![key.as_str()]);
            }
        }

        self.0.iter().find_map(|(key, child)| {
            child.duplicate_key().map(|mut path| {
                path.insert(0, key.as_str());
                path
            })
        })
    }
}

impl<'de> Deserialize<'de> for KeyTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(KeyTreeVisitor)
    }
}

struct KeyTreeVisitor;

impl<'de> Visitor<'de> for KeyTreeVisitor {
    type Value = KeyTree;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<KeyTree, A::Error> {
        let mut entries = Vec::new();
        while let Some(entry) = map.next_entry::<String, KeyTree>()? {
            entries.push(entry);
        }
        Ok(KeyTree(entries))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<KeyTree, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(KeyTree::default())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<KeyTree, E> {
        Ok(KeyTree::default())
    }
}

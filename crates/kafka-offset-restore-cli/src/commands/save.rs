use anyhow::{Context, Result};
use kafka_offset_restore_core::config::KafkaConfig;
use kafka_offset_restore_core::restore::save_offsets;
use tracing::info;

use super::common::connect;

/// Write the group's committed offsets to `output` as a restorable snapshot.
pub async fn run(
    group_id: &str,
    topics: &[String],
    output: &str,
    kafka_config: KafkaConfig,
) -> Result<()> {
    let cluster = connect(kafka_config).await?;
    let topic_filter = (!topics.is_empty()).then_some(topics);
    let result = save_offsets(&cluster, group_id, topic_filter).await;
    cluster.close().await;

    let snapshot = result.context("Failed to capture consumer group offsets")?;
    snapshot
        .write_to_file(output)
        .with_context(|| format!("Failed to write snapshot to {}", output))?;

    info!("Offset snapshot written to: {}", output);
    println!(
        "Saved {} partitions across {} topics for group {} to {}",
        snapshot.partition_count(),
        snapshot.topics().len(),
        group_id,
        output
    );
    println!();
    println!("To restore this snapshot, run:");
    println!("  kafka-offset-restore restore {}", output);

    Ok(())
}

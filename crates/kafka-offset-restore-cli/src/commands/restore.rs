use std::process::ExitCode;

use anyhow::{Context, Result};
use kafka_offset_restore_core::config::KafkaConfig;
use kafka_offset_restore_core::restore::{
    restore_offsets, OffsetSnapshot, RestoreOptions, RestoreReport,
};
use tracing::{error, info};

use super::common::{connect, OutputFormat};

/// Restore offsets from `snapshot_path`.
///
/// An aborted restore exits with status 1 and nothing committed. Other
/// failures propagate as errors.
pub async fn run(
    snapshot_path: &str,
    kafka_config: KafkaConfig,
    dry_run: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    info!("Loading offset snapshot from: {}", snapshot_path);
    let snapshot = OffsetSnapshot::from_file(snapshot_path)
        .with_context(|| format!("Failed to read offset snapshot {}", snapshot_path))?;

    let cluster = connect(kafka_config).await?;
    let options = RestoreOptions { dry_run };
    let result = restore_offsets(&cluster, &snapshot, &options).await;
    cluster.close().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(reason) = e.abort_reason() {
                error!("Offset restore aborted: {}", reason);
                eprintln!(
                    "Restore aborted for group {}: {}. No offsets were committed.",
                    snapshot.group_id(),
                    reason
                );
                return Ok(ExitCode::from(1));
            }
            return Err(e).context("Offset restore failed");
        }
    };

    print_report(&report, format)?;
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &RestoreReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!();
            if report.committed {
                println!("Offsets restored successfully!");
            } else {
                println!("Dry run: no offsets were committed.");
            }
            println!("  Consumer group: {}", report.group_id);
            println!("  Partitions:     {}", report.partitions_restored);
            println!("  Duration:       {} ms", report.duration_ms);
            println!();
            println!("{:<40} {:>10} {:>15}", "TOPIC", "PARTITION", "OFFSET");
            println!("{}", "-".repeat(67));
            for (topic, partitions) in &report.offsets {
                for (partition, offset) in partitions {
                    println!("{:<40} {:>10} {:>15}", topic, partition, offset);
                }
            }

            if !report.warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &report.warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }

    Ok(())
}

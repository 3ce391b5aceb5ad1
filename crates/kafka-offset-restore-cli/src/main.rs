use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kafka-offset-restore")]
#[command(about = "Save and restore Kafka consumer group offsets", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore a consumer group's offsets from a snapshot file
    Restore {
        /// Path to the JSON offset snapshot
        snapshot: String,

        /// Path to the configuration file
        #[arg(short, long, conflicts_with = "bootstrap_servers")]
        config: Option<String>,

        /// Kafka bootstrap servers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        bootstrap_servers: Vec<String>,

        /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT).
        /// A config file carries its own security settings.
        #[arg(long, conflicts_with = "config")]
        security_protocol: Option<String>,

        /// Validate and print the offsets without committing them
        #[arg(long)]
        dry_run: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Save a consumer group's committed offsets to a snapshot file
    Save {
        /// Consumer group to capture
        #[arg(short, long)]
        group: String,

        /// Only capture these topics (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        topics: Vec<String>,

        /// Snapshot file to write
        #[arg(short, long)]
        output: String,

        /// Path to the configuration file
        #[arg(short, long, conflicts_with = "bootstrap_servers")]
        config: Option<String>,

        /// Kafka bootstrap servers (comma-separated)
        #[arg(long, value_delimiter = ',')]
        bootstrap_servers: Vec<String>,

        /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT).
        /// A config file carries its own security settings.
        #[arg(long, conflicts_with = "config")]
        security_protocol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    // Priority: RUST_LOG env var > verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Restore {
            snapshot,
            config,
            bootstrap_servers,
            security_protocol,
            dry_run,
            format,
        } => {
            let kafka_config = commands::common::kafka_config(
                config.as_deref(),
                &bootstrap_servers,
                security_protocol.as_deref(),
            )?;
            commands::restore::run(
                &snapshot,
                kafka_config,
                dry_run,
                commands::common::OutputFormat::from(format.as_str()),
            )
            .await
        }
        Commands::Save {
            group,
            topics,
            output,
            config,
            bootstrap_servers,
            security_protocol,
        } => {
            let kafka_config = commands::common::kafka_config(
                config.as_deref(),
                &bootstrap_servers,
                security_protocol.as_deref(),
            )?;
            commands::save::run(&group, &topics, &output, kafka_config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

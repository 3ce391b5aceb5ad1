//! Connection settings shared by the CLI commands.

use anyhow::{bail, Context, Result};
use kafka_offset_restore_core::config::{
    Config, KafkaConfig, SaslMechanism, SecurityConfig, SecurityProtocol,
};
use kafka_offset_restore_core::kafka::ClusterRouter;
use std::path::PathBuf;
use tracing::info;

/// Output format for command reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }
}

/// Resolve the Kafka settings from a config file or from command-line flags.
pub fn kafka_config(
    config_path: Option<&str>,
    bootstrap_servers: &[String],
    security_protocol: Option<&str>,
) -> Result<KafkaConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path);
        let config = Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?;
        return Ok(config.kafka);
    }

    if bootstrap_servers.is_empty() {
        bail!("Either --config or --bootstrap-servers is required");
    }

    let mut kafka_config = KafkaConfig::new(bootstrap_servers.to_vec());
    kafka_config.security = parse_security_config(security_protocol);
    kafka_config
        .validate()
        .context("Invalid connection settings")?;
    Ok(kafka_config)
}

/// Connect to the cluster, ready for a single command run.
pub async fn connect(kafka_config: KafkaConfig) -> Result<ClusterRouter> {
    ClusterRouter::connect(kafka_config)
        .await
        .context("Failed to connect to Kafka")
}

fn parse_security_config(protocol: Option<&str>) -> SecurityConfig {
    let security_protocol = match protocol.map(|p| p.to_uppercase()).as_deref() {
        Some("SASL_SSL") => SecurityProtocol::SaslSsl,
        Some("SSL") => SecurityProtocol::Ssl,
        Some("SASL_PLAINTEXT") => SecurityProtocol::SaslPlaintext,
        _ => SecurityProtocol::Plaintext,
    };

    let (sasl_mechanism, sasl_username, sasl_password) = if security_protocol.uses_sasl() {
        (
            Some(SaslMechanism::Plain),
            std::env::var("KAFKA_USERNAME").ok(),
            std::env::var("KAFKA_PASSWORD").ok(),
        )
    } else {
        (None, None, None)
    };

    let ssl_ca_location = if security_protocol.uses_tls() {
        std::env::var("KAFKA_SSL_CA_CERT").ok().map(PathBuf::from)
    } else {
        None
    };

    SecurityConfig {
        security_protocol,
        sasl_mechanism,
        sasl_username,
        sasl_password,
        ssl_ca_location,
        ssl_certificate_location: None,
        ssl_key_location: None,
    }
}

//! Configuration structures for connecting to the Kafka cluster.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target Kafka cluster configuration
    pub kafka: KafkaConfig,
}

/// Kafka cluster configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap servers
    pub bootstrap_servers: Vec<String>,

    /// Security configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// Socket-level connection tuning
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Client ID sent in every request header
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_client_id() -> String {
    "kafka-offset-restore".to_string()
}

impl KafkaConfig {
    /// Create a plaintext configuration for the given bootstrap servers.
    pub fn new(bootstrap_servers: Vec<String>) -> Self {
        Self {
            bootstrap_servers,
            security: SecurityConfig::default(),
            connection: ConnectionConfig::default(),
            client_id: default_client_id(),
        }
    }
}

/// Security configuration for Kafka connections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Security protocol
    #[serde(default)]
    pub security_protocol: SecurityProtocol,

    /// SASL mechanism (if using SASL)
    #[serde(default)]
    pub sasl_mechanism: Option<SaslMechanism>,

    /// SASL username
    #[serde(default)]
    pub sasl_username: Option<String>,

    /// SASL password
    #[serde(default)]
    pub sasl_password: Option<String>,

    /// Path to CA certificate file (for TLS)
    #[serde(default)]
    pub ssl_ca_location: Option<PathBuf>,

    /// Path to client certificate file (for mTLS)
    #[serde(default)]
    pub ssl_certificate_location: Option<PathBuf>,

    /// Path to client key file (for mTLS)
    #[serde(default)]
    pub ssl_key_location: Option<PathBuf>,
}

/// Security protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn uses_tls(&self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }

    pub fn uses_sasl(&self) -> bool {
        matches!(
            self,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        )
    }
}

/// SASL mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum SaslMechanism {
    Plain,
    ScramSha256,
    ScramSha512,
}

/// TCP socket options applied to broker connections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Enable TCP keepalive (default: true)
    #[serde(default = "default_true")]
    pub tcp_keepalive: bool,

    /// Idle time before the first keepalive probe, in seconds (default: 60)
    #[serde(default = "default_keepalive_time_secs")]
    pub keepalive_time_secs: u64,

    /// Interval between keepalive probes, in seconds (default: 20)
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,

    /// Disable Nagle's algorithm (default: true)
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            tcp_keepalive: true,
            keepalive_time_secs: default_keepalive_time_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            tcp_nodelay: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_keepalive_time_secs() -> u64 {
    60
}

fn default_keepalive_interval_secs() -> u64 {
    20
}

impl Config {
    /// Load and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        self.kafka.validate()
    }
}

impl KafkaConfig {
    /// Validate connection settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(crate::Error::Config(
                "At least one bootstrap server is required".to_string(),
            ));
        }

        if self.bootstrap_servers.iter().any(|s| s.trim().is_empty()) {
            return Err(crate::Error::Config(
                "Bootstrap server entries must not be empty".to_string(),
            ));
        }

        if self.security.security_protocol.uses_sasl() && self.security.sasl_mechanism.is_none()
        {
            return Err(crate::Error::Config(
                "sasl_mechanism must be set for SASL security protocols".to_string(),
            ));
        }

        if self.security.ssl_certificate_location.is_some()
            != self.security.ssl_key_location.is_some()
        {
            return Err(crate::Error::Config(
                "ssl_certificate_location and ssl_key_location must be set together".to_string(),
            ));
        }

        if self.connection.tcp_keepalive
            && (self.connection.keepalive_time_secs == 0
                || self.connection.keepalive_interval_secs == 0)
        {
            return Err(crate::Error::Config(
                "keepalive_time_secs and keepalive_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

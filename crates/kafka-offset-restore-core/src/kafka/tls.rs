//! TLS setup for broker connections.
//!
//! Loads a custom CA bundle (or falls back to webpki-roots) and, for mTLS,
//! a client certificate chain and private key.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::config::SecurityConfig;
use crate::error::KafkaError;
use crate::Result;

/// Build a rustls `ClientConfig` from the security settings.
pub fn build_tls_config(security: &SecurityConfig) -> Result<ClientConfig> {
    let root_store = build_root_store(&security.ssl_ca_location)?;
    let builder = ClientConfig::builder().with_root_certificates(root_store);

    match (
        &security.ssl_certificate_location,
        &security.ssl_key_location,
    ) {
        (Some(cert_path), Some(key_path)) => {
            debug!(
                "Configuring mTLS with cert={}, key={}",
                cert_path.display(),
                key_path.display()
            );
            let certs = load_certificates(cert_path)?;
            let key = load_private_key(key_path)?;

            builder.with_client_auth_cert(certs, key).map_err(|e| {
                KafkaError::TlsConfig(format!("Failed to configure client authentication: {}", e))
                    .into()
            })
        }
        (Some(cert_path), None) => Err(KafkaError::TlsConfig(format!(
            "ssl_certificate_location ({}) provided without ssl_key_location",
            cert_path.display()
        ))
        .into()),
        (None, Some(key_path)) => Err(KafkaError::TlsConfig(format!(
            "ssl_key_location ({}) provided without ssl_certificate_location",
            key_path.display()
        ))
        .into()),
        (None, None) => Ok(builder.with_no_client_auth()),
    }
}

fn build_root_store(ca_path: &Option<std::path::PathBuf>) -> Result<RootCertStore> {
    let Some(path) = ca_path else {
        debug!("No custom CA configured, using webpki-roots");
        return Ok(RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        });
    };

    let mut root_store = RootCertStore::empty();
    for cert in load_certificates(path)? {
        root_store.add(cert).map_err(|e| KafkaError::CertificateLoad {
            path: path.display().to_string(),
            message: format!("Failed to add certificate to root store: {}", e),
        })?;
    }

    debug!(
        "Loaded {} CA certificate(s) from {}",
        root_store.len(),
        path.display()
    );
    Ok(root_store)
}

fn open_pem(path: &Path) -> std::result::Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("Failed to open file: {}", e))
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let cert_error = |message: String| KafkaError::CertificateLoad {
        path: path.display().to_string(),
        message,
    };

    let mut reader = open_pem(path).map_err(cert_error)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| cert_error(format!("Failed to parse PEM certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(cert_error("No certificates found in file".to_string()).into());
    }
    Ok(certs)
}

/// Accepts PKCS#1, PKCS#8 and SEC1 keys; the first key in the file wins.
fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let key_error = |message: String| KafkaError::PrivateKeyLoad {
        path: path.display().to_string(),
        message,
    };

    let mut reader = open_pem(path).map_err(key_error)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| key_error(format!("Failed to parse PEM private key: {}", e)))?
        .ok_or_else(|| key_error("No private key found in file".to_string()).into())
}

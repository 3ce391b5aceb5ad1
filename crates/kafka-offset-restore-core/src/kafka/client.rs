//! Kafka client for protocol-level communication.
//!
//! A client holds a single broker connection. Requests are framed with a
//! 4-byte length prefix and sent one at a time under the connection lock.
//! Choosing which broker a request goes to is the router's job.

use bytes::{BufMut, Bytes, BytesMut};
use kafka_protocol::messages::{
    ApiKey, RequestHeader, ResponseHeader, SaslAuthenticateRequest, SaslAuthenticateResponse,
    SaslHandshakeRequest, SaslHandshakeResponse,
};
use kafka_protocol::protocol::{Decodable, Encodable, StrBytes};
use socket2::{SockRef, TcpKeepalive};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use crate::config::{KafkaConfig, SaslMechanism};
use crate::error::{Error, KafkaError};
use crate::Result;

/// Kafka client for protocol-level operations
pub struct KafkaClient {
    config: KafkaConfig,

    /// Connection to the current broker
    connection: Mutex<Option<BrokerConnection>>,

    /// Correlation ID counter
    correlation_id: AtomicI32,
}

/// A stream that can be either plain TCP or TLS-wrapped
enum ConnectionStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ConnectionStream {
    async fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            ConnectionStream::Plain(s) => s.read_exact(buf).await.map(|_| ()),
            ConnectionStream::Tls(s) => s.read_exact(buf).await.map(|_| ()),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            ConnectionStream::Plain(s) => s.write_all(buf).await,
            ConnectionStream::Tls(s) => s.write_all(buf).await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            ConnectionStream::Plain(s) => s.shutdown().await,
            ConnectionStream::Tls(s) => s.shutdown().await,
        }
    }
}

struct BrokerConnection {
    stream: ConnectionStream,
    address: String,
}

impl BrokerConnection {
    /// Write one framed request and read back the response body
    async fn round_trip(&mut self, frame: &[u8]) -> Result<Bytes> {
        self.stream
            .write_all(frame)
            .await
            .map_err(|e| KafkaError::Protocol(format!("Failed to send request: {}", e)))?;

        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| KafkaError::Protocol(format!("Failed to read response length: {}", e)))?;

        let response_len = i32::from_be_bytes(len_buf);
        let response_len = usize::try_from(response_len).map_err(|_| {
            KafkaError::Protocol(format!("Invalid response length {}", response_len))
        })?;
        trace!("Receiving response: len={}", response_len);

        let mut body = vec![0u8; response_len];
        self.stream
            .read_exact(&mut body)
            .await
            .map_err(|e| KafkaError::Protocol(format!("Failed to read response body: {}", e)))?;

        Ok(Bytes::from(body))
    }
}

impl KafkaClient {
    /// Create a new Kafka client
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            correlation_id: AtomicI32::new(1),
        }
    }

    /// Connect to the first reachable bootstrap server
    pub async fn connect(&self) -> Result<()> {
        for server in &self.config.bootstrap_servers {
            let stream = match self.try_connect(server).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("Failed to connect to {}: {}", server, e);
                    continue;
                }
            };

            *self.connection.lock().await = Some(BrokerConnection {
                stream,
                address: server.clone(),
            });

            if self.config.security.security_protocol.uses_sasl() {
                if let Err(e) = self.authenticate().await {
                    self.close().await;
                    return Err(e);
                }
            }

            debug!("Connected to Kafka broker: {}", server);
            return Ok(());
        }

        Err(KafkaError::NoBrokersAvailable.into())
    }

    async fn try_connect(&self, server: &str) -> Result<ConnectionStream> {
        let connection_failed = |message: String| KafkaError::ConnectionFailed {
            broker: server.to_string(),
            message,
        };

        let tcp_stream = TcpStream::connect(server)
            .await
            .map_err(|e| connection_failed(e.to_string()))?;

        self.configure_socket(&tcp_stream, server)?;

        if !self.config.security.security_protocol.uses_tls() {
            return Ok(ConnectionStream::Plain(tcp_stream));
        }

        debug!("Establishing TLS connection to {}", server);
        let tls_config = super::tls::build_tls_config(&self.config.security)?;
        let connector = TlsConnector::from(Arc::new(tls_config));

        let hostname = server.split(':').next().unwrap_or(server);
        let server_name = ServerName::try_from(hostname.to_string())
            .map_err(|e| connection_failed(format!("Invalid server name for TLS: {}", e)))?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| connection_failed(format!("TLS handshake failed: {}", e)))?;

        debug!("TLS connection established to {}", server);
        Ok(ConnectionStream::Tls(Box::new(tls_stream)))
    }

    /// Apply TCP_NODELAY and keepalive settings from the connection config.
    fn configure_socket(&self, stream: &TcpStream, server: &str) -> Result<()> {
        let conn_config = &self.config.connection;
        let sock_ref = SockRef::from(stream);
        let socket_error = |option: &str, e: std::io::Error| KafkaError::ConnectionFailed {
            broker: server.to_string(),
            message: format!("Failed to set {}: {}", option, e),
        };

        if conn_config.tcp_nodelay {
            sock_ref
                .set_nodelay(true)
                .map_err(|e| socket_error("TCP_NODELAY", e))?;
        }

        if conn_config.tcp_keepalive {
            let keepalive = TcpKeepalive::new()
                .with_time(Duration::from_secs(conn_config.keepalive_time_secs))
                .with_interval(Duration::from_secs(conn_config.keepalive_interval_secs));

            sock_ref
                .set_tcp_keepalive(&keepalive)
                .map_err(|e| socket_error("TCP keepalive", e))?;

            debug!(
                "TCP keepalive enabled for {}: time={}s, interval={}s",
                server, conn_config.keepalive_time_secs, conn_config.keepalive_interval_secs
            );
        }

        Ok(())
    }

    async fn authenticate(&self) -> Result<()> {
        let security = &self.config.security;

        match security.sasl_mechanism {
            Some(SaslMechanism::Plain) => {
                self.sasl_plain_auth(
                    security.sasl_username.as_deref().unwrap_or(""),
                    security.sasl_password.as_deref().unwrap_or(""),
                )
                .await
            }
            Some(mechanism @ (SaslMechanism::ScramSha256 | SaslMechanism::ScramSha512)) => Err(
                Error::Authentication(format!("SASL mechanism {:?} is not supported", mechanism)),
            ),
            None => Ok(()),
        }
    }

    async fn sasl_plain_auth(&self, username: &str, password: &str) -> Result<()> {
        let handshake = SaslHandshakeRequest::default().with_mechanism("PLAIN".into());
        let handshake_response: SaslHandshakeResponse =
            self.send_request(ApiKey::SaslHandshake, handshake).await?;
        if handshake_response.error_code != 0 {
            return Err(Error::Authentication(format!(
                "Broker rejected SASL PLAIN handshake with error code {}",
                handshake_response.error_code
            )));
        }

        // authzid (empty) \0 username \0 password
        let mut auth_bytes = Vec::with_capacity(username.len() + password.len() + 2);
        auth_bytes.push(0);
        auth_bytes.extend_from_slice(username.as_bytes());
        auth_bytes.push(0);
        auth_bytes.extend_from_slice(password.as_bytes());

        let auth_request =
            SaslAuthenticateRequest::default().with_auth_bytes(Bytes::from(auth_bytes));
        let auth_response: SaslAuthenticateResponse = self
            .send_request(ApiKey::SaslAuthenticate, auth_request)
            .await?;

        if auth_response.error_code != 0 {
            return Err(Error::Authentication(format!(
                "SASL authentication failed: {}",
                auth_response
                    .error_message
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("error code {}", auth_response.error_code))
            )));
        }

        debug!("SASL PLAIN authentication successful");
        Ok(())
    }

    fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Send a request and receive a response
    pub async fn send_request<Req, Resp>(&self, api_key: ApiKey, request: Req) -> Result<Resp>
    where
        Req: Encodable + Default,
        Resp: Decodable + Default,
    {
        let api_version = api_version(api_key);
        let correlation_id = self.next_correlation_id();
        let frame = encode_frame(
            api_key,
            api_version,
            correlation_id,
            &self.config.client_id,
            &request,
        )?;

        trace!(
            "Sending request: api_key={:?}, api_version={}, correlation_id={}, len={}",
            api_key,
            api_version,
            correlation_id,
            frame.len() - 4
        );

        let mut body = {
            let mut conn = self.connection.lock().await;
            let conn = conn
                .as_mut()
                .ok_or_else(|| KafkaError::Protocol("Not connected".to_string()))?;
            conn.round_trip(&frame).await?
        };

        let header = ResponseHeader::decode(&mut body, api_key.response_header_version(api_version))
            .map_err(|e| {
                KafkaError::Protocol(format!("Failed to decode response header: {:?}", e))
            })?;
        if header.correlation_id != correlation_id {
            return Err(KafkaError::Protocol(format!(
                "Correlation ID mismatch: sent {}, received {}",
                correlation_id, header.correlation_id
            ))
            .into());
        }

        let response = Resp::decode(&mut body, api_version)
            .map_err(|e| KafkaError::Protocol(format!("Failed to decode response: {:?}", e)))?;

        Ok(response)
    }

    /// Whether a broker connection is currently open
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Close the broker connection.
    ///
    /// Safe to call more than once and on a client that never connected.
    pub async fn close(&self) {
        let mut conn = self.connection.lock().await;
        if let Some(mut connection) = conn.take() {
            if let Err(e) = connection.stream.shutdown().await {
                debug!("Error shutting down connection to {}: {}", connection.address, e);
            }
            debug!("Closed connection to Kafka broker: {}", connection.address);
        }
    }
}

/// API version used for each request type
fn api_version(api_key: ApiKey) -> i16 {
    match api_key {
        ApiKey::Metadata => 9,
        ApiKey::SaslHandshake => 1,
        ApiKey::SaslAuthenticate => 2,
        ApiKey::ApiVersions => 3,
        ApiKey::ListOffsets => 5,
        ApiKey::FindCoordinator => 2,
        // Kafka-stored group offsets; v0 of both APIs targets ZooKeeper
        ApiKey::OffsetCommit => 2,
        ApiKey::OffsetFetch => 3,
        _ => 0,
    }
}

/// Encode a request with its header, prefixed by the frame length.
fn encode_frame<Req: Encodable>(
    api_key: ApiKey,
    api_version: i16,
    correlation_id: i32,
    client_id: &str,
    request: &Req,
) -> Result<BytesMut> {
    let header = RequestHeader::default()
        .with_request_api_key(api_key as i16)
        .with_request_api_version(api_version)
        .with_correlation_id(correlation_id)
        .with_client_id(Some(StrBytes::from_string(client_id.to_string())));

    let mut buf = BytesMut::new();
    buf.put_i32(0);

    header
        .encode(&mut buf, api_key.request_header_version(api_version))
        .map_err(|e| KafkaError::Protocol(format!("Failed to encode header: {:?}", e)))?;
    request
        .encode(&mut buf, api_version)
        .map_err(|e| KafkaError::Protocol(format!("Failed to encode request: {:?}", e)))?;

    let len = (buf.len() - 4) as i32;
    buf[0..4].copy_from_slice(&len.to_be_bytes());
    Ok(buf)
}

//! QUIC transport for the key-exchange client.
//!
//! Each RPC is one bidirectional stream: the client writes a request
//! envelope and finishes its side, the peer answers with one response
//! envelope and finishes. Streams are bounded by [`MAX_MESSAGE_SIZE`].
//!
//! # Security
//!
//! With TLS enabled the peer certificate must chain to the configured CA
//! file and match the configured server name. Credentials that cannot be
//! loaded are a fatal [`ConnectError::Credentials`]; the connector never
//! falls back to an unverified channel. With TLS disabled the peer
//! certificate is accepted unverified and the channel is unauthenticated.

use std::{
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Duration,
};

use dhkx_core::{ConnectError, Connector, Endpoint, RpcChannel, RpcError, TlsSettings};
use dhkx_proto::{ALPN_PROTOCOL, MAX_MESSAGE_SIZE, Request, Response};
use quinn::{IdleTimeout, VarInt};
use rustls::{
    RootCertStore,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, WebPkiSupportedAlgorithms},
    pki_types::{CertificateDer, ServerName, UnixTime},
};

/// Default bound on the QUIC handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle timeout after which a silent connection is dropped, in milliseconds.
const IDLE_TIMEOUT_MS: u32 = 30_000;

/// Application close code for an orderly client close.
const CLOSE_NORMAL: u32 = 0;

/// Dials the peer over QUIC.
pub struct QuicConnector {
    handshake_timeout: Duration,
}

impl QuicConnector {
    /// Connector whose handshakes give up after `handshake_timeout`.
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for QuicConnector {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

impl Connector for QuicConnector {
    type Channel = QuicChannel;

    async fn connect(
        &mut self,
        endpoint: &Endpoint,
        tls: &TlsSettings,
    ) -> Result<QuicChannel, ConnectError> {
        let (client_config, server_name) = match tls {
            TlsSettings::Enabled { ca_cert, server_name } => {
                (verified_client_config(ca_cert)?, server_name.as_str())
            },
            TlsSettings::Disabled => {
                tracing::warn!("TLS disabled: peer certificate is not verified");
                (unverified_client_config()?, endpoint.host.as_str())
            },
        };

        let addr = resolve(endpoint).await?;
        let bind: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let local = quinn::Endpoint::client(bind)
            .map_err(|e| ConnectError::Unreachable(format!("endpoint creation failed: {e}")))?;

        let connecting = local
            .connect_with(client_config, addr, server_name)
            .map_err(|e| ConnectError::InvalidEndpoint(format!("connect to {endpoint}: {e}")))?;

        let connection = match tokio::time::timeout(self.handshake_timeout, connecting).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                return Err(ConnectError::Unreachable(format!("handshake with {endpoint}: {e}")));
            },
            Err(_) => {
                return Err(ConnectError::Unreachable(format!(
                    "handshake with {endpoint} timed out after {:?}",
                    self.handshake_timeout
                )));
            },
        };

        tracing::info!("QUIC connection to {endpoint} ({addr}) established");
        Ok(QuicChannel { connection, _endpoint: local })
    }
}

/// One QUIC connection to the peer.
pub struct QuicChannel {
    connection: quinn::Connection,
    _endpoint: quinn::Endpoint,
}

impl RpcChannel for QuicChannel {
    fn call(
        &mut self,
        request: Request,
    ) -> impl std::future::Future<Output = Result<Response, RpcError>> + Send {
        let connection = self.connection.clone();
        async move {
            let envelope = request.encode()?;

            let (mut send, mut recv) = connection
                .open_bi()
                .await
                .map_err(|e| RpcError::ConnectionLost(format!("open_bi failed: {e}")))?;

            send.write_all(&envelope)
                .await
                .map_err(|e| RpcError::ConnectionLost(format!("write failed: {e}")))?;
            send.finish().map_err(|e| RpcError::ConnectionLost(format!("finish failed: {e}")))?;

            let reply = recv.read_to_end(MAX_MESSAGE_SIZE).await.map_err(|e| match e {
                quinn::ReadToEndError::TooLong => {
                    RpcError::Protocol(format!("reply exceeds {MAX_MESSAGE_SIZE} bytes"))
                },
                quinn::ReadToEndError::Read(e) => {
                    RpcError::ConnectionLost(format!("read failed: {e}"))
                },
            })?;

            Ok(Response::decode(&reply)?)
        }
    }

    fn close(&mut self) {
        self.connection.close(VarInt::from_u32(CLOSE_NORMAL), b"client closing");
    }
}

async fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, ConnectError> {
    if endpoint.host.is_empty() || endpoint.port == 0 {
        return Err(ConnectError::InvalidEndpoint(format!("invalid endpoint '{endpoint}'")));
    }

    let mut addrs = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(|e| ConnectError::Unreachable(format!("resolve {endpoint}: {e}")))?;

    addrs
        .next()
        .ok_or_else(|| ConnectError::InvalidEndpoint(format!("{endpoint} resolved to nothing")))
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Client config trusting only the certificates in `ca_cert`.
fn verified_client_config(ca_cert: &Path) -> Result<quinn::ClientConfig, ConnectError> {
    let pem = std::fs::read(ca_cert).map_err(|e| {
        ConnectError::Credentials(format!("failed to read CA '{}': {e}", ca_cert.display()))
    })?;

    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectError::Credentials(format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        let path = ca_cert.display();
        return Err(ConnectError::Credentials(format!("no certificates in '{path}'")));
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| ConnectError::Credentials(format!("invalid CA certificate: {e}")))?;
    }

    let crypto = rustls::ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ConnectError::Credentials(format!("invalid TLS config: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    quic_config(crypto).map_err(ConnectError::Credentials)
}

/// Client config accepting any peer certificate.
fn unverified_client_config() -> Result<quinn::ClientConfig, ConnectError> {
    let provider = provider();
    let verifier = UnverifiedPeer { algorithms: provider.signature_verification_algorithms };

    let crypto = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ConnectError::Credentials(format!("invalid TLS config: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();

    quic_config(crypto).map_err(ConnectError::Credentials)
}

fn quic_config(mut crypto: rustls::ClientConfig) -> Result<quinn::ClientConfig, String> {
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic = quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
        .map_err(|e| format!("QUIC config error: {e}"))?;

    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(Some(IdleTimeout::from(VarInt::from_u32(IDLE_TIMEOUT_MS))));

    let mut config = quinn::ClientConfig::new(Arc::new(quic));
    config.transport_config(Arc::new(transport));
    Ok(config)
}

/// Skips certificate chain and name checks. Handshake signatures are still
/// verified against the presented certificate.
#[derive(Debug)]
struct UnverifiedPeer {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for UnverifiedPeer {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn endpoint(host: &str, port: u16) -> Endpoint {
        Endpoint { host: host.to_string(), port }
    }

    #[test]
    fn missing_ca_file_is_credentials_error() {
        let result = verified_client_config(Path::new("/nonexistent/ca.pem"));
        assert!(matches!(result, Err(ConnectError::Credentials(_))));
    }

    #[test]
    fn ca_file_without_certificates_is_credentials_error() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not a certificate").unwrap();

        let result = verified_client_config(file.path());

        assert!(
            matches!(result, Err(ConnectError::Credentials(msg)) if msg.contains("no certificates"))
        );
    }

    #[test]
    fn unverified_config_builds() {
        assert!(unverified_client_config().is_ok());
    }

    #[tokio::test]
    async fn empty_host_is_invalid_endpoint() {
        let result = resolve(&endpoint("", 4433)).await;
        assert!(matches!(result, Err(ConnectError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn zero_port_is_invalid_endpoint() {
        let result = resolve(&endpoint("127.0.0.1", 0)).await;
        assert!(matches!(result, Err(ConnectError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn literal_address_resolves() {
        let addr = resolve(&endpoint("127.0.0.1", 4433)).await.unwrap();
        assert_eq!(addr, "127.0.0.1:4433".parse().unwrap());
    }
}

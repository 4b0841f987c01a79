//! TCP and TLS connection setup.
//!
//! [`connect`] opens the socket, enables keepalive and, when configured,
//! performs the TLS handshake. Server certificates are checked against the
//! platform roots unless `tls_insecure` is set. A [`TlsIdentity`] loaded from
//! the configured PEM file is presented as the client certificate, which is
//! what SASL EXTERNAL authenticates with.

use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{self, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{self, ClientConfig as TlsConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::{client, TlsConnector};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError};

const KEEPALIVE_TIME: Duration = Duration::from_secs(120);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A client certificate chain and its private key.
pub struct TlsIdentity {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl TlsIdentity {
    /// Parse a PEM bundle holding at least one certificate and a private key.
    pub fn from_pem(pem: &[u8]) -> Result<Self, ConfigError> {
        let chain = rustls_pemfile::certs(&mut io::Cursor::new(pem))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError::InvalidIdentity(e.to_string()))?;
        if chain.is_empty() {
            return Err(ConfigError::InvalidIdentity("no certificate found".into()));
        }
        let key = rustls_pemfile::private_key(&mut io::Cursor::new(pem))
            .map_err(|e| ConfigError::InvalidIdentity(e.to_string()))?
            .ok_or_else(|| ConfigError::InvalidIdentity("no private key found".into()))?;
        Ok(Self { chain, key })
    }

    /// Read and parse a PEM file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let pem = std::fs::read(path)
            .map_err(|e| ConfigError::InvalidIdentity(format!("{}: {e}", path.display())))?;
        Self::from_pem(&pem)
    }
}

/// A connected byte stream, plain or TLS.
pub enum Transport {
    Tcp(TcpStream),
    Tls(Box<client::TlsStream<TcpStream>>),
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("Transport::Tcp"),
            Self::Tls(_) => f.write_str("Transport::Tls"),
        }
    }
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Open the connection described by `config`.
///
/// The identity is read before any network action, so a bad PEM file is a
/// configuration error rather than a half-open connection.
pub async fn connect(config: &ClientConfig) -> Result<Transport, ClientError> {
    let identity = match (&config.identity_path, config.tls) {
        (Some(path), true) => Some(TlsIdentity::load(path)?),
        _ => None,
    };

    tokio::time::timeout(config.connect_timeout, open(config, identity))
        .await
        .map_err(|_| ClientError::Timeout("connecting"))?
}

async fn open(config: &ClientConfig, identity: Option<TlsIdentity>) -> Result<Transport, ClientError> {
    let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
    if let Err(e) = enable_keepalive(&stream) {
        warn!(error = %e, "failed to enable TCP keepalive");
    }

    if !config.tls {
        info!(host = %config.host, port = config.port, "connected");
        return Ok(Transport::Tcp(stream));
    }

    let tls = tls_config(config.tls_insecure, identity)?;
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| ClientError::Tls(format!("invalid server name {}: {e}", config.host)))?;
    let stream = TlsConnector::from(Arc::new(tls))
        .connect(server_name, stream)
        .await?;
    info!(
        host = %config.host,
        port = config.port,
        verify = !config.tls_insecure,
        "TLS connection established"
    );
    Ok(Transport::Tls(Box::new(stream)))
}

fn enable_keepalive(stream: &TcpStream) -> io::Result<()> {
    let keepalive = TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(crypto::aws_lc_rs::default_provider()))
}

fn native_roots() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let loaded = rustls_native_certs::load_native_certs();
    for e in &loaded.errors {
        warn!(error = %e, "error loading native root certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    if ignored > 0 {
        warn!(added, ignored, "some native root certificates were unusable");
    }
    roots
}

/// Build the rustls client configuration.
pub fn tls_config(insecure: bool, identity: Option<TlsIdentity>) -> Result<TlsConfig, ClientError> {
    let provider = provider();
    let builder = TlsConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?;

    let builder = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
    } else {
        builder.with_root_certificates(native_roots())
    };

    match identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.chain, identity.key)
            .map_err(|e| ClientError::Tls(e.to_string())),
        None => Ok(builder.with_no_client_auth()),
    }
}

/// Accepts any server certificate. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
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
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

//! Client transport over TCP and TLS.
//!
//! [`Transport::connect`] resolves the server, optionally binds a local
//! address, enables TCP keepalive, performs the TLS handshake when asked to,
//! and wraps the stream in a [`LineCodec`].

use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::line::LineCodec;

/// Where and how to connect.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Local address to connect from.
    pub bind_host: Option<String>,
    /// Wrap the connection in TLS.
    pub use_ssl: bool,
    /// Verify the server certificate.
    pub verify_ssl: bool,
    /// PEM bundle of CAs trusted in addition to the system roots.
    pub ca_certs: Option<PathBuf>,
    /// PEM client certificate, for SASL EXTERNAL or CertFP.
    pub client_cert: Option<PathBuf>,
    /// PEM private key matching `client_cert`; defaults to the cert file.
    pub client_key: Option<PathBuf>,
}

/// Write half of a split [`Transport`].
pub type LineSink = Pin<Box<dyn Sink<String, Error = ProtocolError> + Send>>;

/// Read half of a split [`Transport`].
pub type LineStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Line transport to the IRC server.
#[allow(clippy::large_enum_variant)]
pub enum Transport {
    /// Plain TCP transport.
    Tcp {
        /// The framed codec for TCP.
        framed: Framed<TcpStream, LineCodec>,
    },
    /// Client-side TLS transport.
    ClientTls {
        /// The framed codec for client-side TLS.
        framed: Framed<ClientTlsStream<TcpStream>, LineCodec>,
    },
}

impl Transport {
    /// Open a connection as described by `opts`.
    pub async fn connect(opts: &ConnectOptions) -> Result<Self> {
        let stream = connect_tcp(opts).await?;
        if !opts.use_ssl {
            return Ok(Self::tcp(stream));
        }

        let config = tls_config(opts)?;
        let server_name = ServerName::try_from(opts.host.clone())
            .map_err(|e| ProtocolError::Tls(format!("invalid server name {}: {}", opts.host, e)))?;
        let tls_stream = TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await?;
        debug!(host = %opts.host, verify = opts.verify_ssl, "TLS handshake completed");
        Ok(Self::client_tls(tls_stream))
    }

    /// Wrap a connected TCP stream.
    pub fn tcp(stream: TcpStream) -> Self {
        if let Err(e) = enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        Self::Tcp {
            framed: Framed::new(stream, LineCodec::new()),
        }
    }

    /// Wrap an established client TLS stream.
    pub fn client_tls(stream: ClientTlsStream<TcpStream>) -> Self {
        Self::ClientTls {
            framed: Framed::new(stream, LineCodec::new()),
        }
    }

    /// Whether the connection is encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::ClientTls { .. })
    }

    /// Read the next decoded line.
    ///
    /// Returns `Ok(None)` when the server closed the connection.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let next = match self {
            Transport::Tcp { framed } => framed.next().await,
            Transport::ClientTls { framed } => framed.next().await,
        };
        next.transpose()
    }

    /// Write a line, which must already end with CRLF.
    pub async fn write_line(&mut self, line: String) -> Result<()> {
        match self {
            Transport::Tcp { framed } => framed.send(line).await,
            Transport::ClientTls { framed } => framed.send(line).await,
        }
    }

    /// Split into independently owned write and read halves.
    pub fn split(self) -> (LineSink, LineStream) {
        match self {
            Transport::Tcp { framed } => {
                let (sink, stream) = framed.split();
                (Box::pin(sink), Box::pin(stream))
            }
            Transport::ClientTls { framed } => {
                let (sink, stream) = framed.split();
                (Box::pin(sink), Box::pin(stream))
            }
        }
    }

    /// Flush and shut down the write side.
    pub async fn close(&mut self) -> Result<()> {
        match self {
            Transport::Tcp { framed } => framed.close().await,
            Transport::ClientTls { framed } => framed.close().await,
        }
    }
}

async fn connect_tcp(opts: &ConnectOptions) -> Result<TcpStream> {
    let bind_ip = match opts.bind_host.as_deref() {
        Some(host) => Some(resolve_bind_host(host).await?),
        None => None,
    };

    let mut last_error = None;
    for addr in tokio::net::lookup_host((opts.host.as_str(), opts.port)).await? {
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Some(ip) = bind_ip {
            if ip.is_ipv4() != addr.is_ipv4() {
                continue;
            }
            socket.bind(SocketAddr::new(ip, 0))?;
        }
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "connection attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no usable address for {}:{}", opts.host, opts.port),
            )
        })
        .into())
}

async fn resolve_bind_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse() {
        return Ok(ip);
    }
    tokio::net::lookup_host((host, 0))
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("cannot resolve bind host {}", host),
            )
            .into()
        })
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));
    sock.set_tcp_keepalive(&keepalive)
}

fn tls_config(opts: &ConnectOptions) -> Result<ClientConfig> {
    let builder = if opts.verify_ssl {
        ClientConfig::builder().with_root_certificates(root_store(opts.ca_certs.as_deref())?)
    } else {
        warn!(host = %opts.host, "TLS certificate verification is disabled");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
    };

    match &opts.client_cert {
        Some(cert_path) => {
            let key_path = opts.client_key.as_deref().unwrap_or(cert_path);
            let certs = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ProtocolError::Tls(format!("invalid client certificate: {}", e)))
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

/// System roots, plus the certificates of the `ca_certs` bundle if given.
fn root_store(ca_certs: Option<&Path>) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Error loading native certs: {}", e);
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }

    if let Some(path) = ca_certs {
        let (added, ignored) = roots.add_parsable_certificates(load_certs(path)?);
        debug!(path = %path.display(), added, ignored, "loaded CA bundle");
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::io::Result<Vec<_>>>()?;
    if certs.is_empty() {
        return Err(ProtocolError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ProtocolError::Tls(format!("no private key found in {}", path.display())))
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = AsyncBufReader::new(read).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            write.write_all(b":server PONG :hi\r\n").await.unwrap();
            line
        });

        let opts = ConnectOptions {
            host: "127.0.0.1".into(),
            port,
            ..Default::default()
        };
        let mut transport = Transport::connect(&opts).await.unwrap();
        assert!(!transport.is_tls());
        transport.write_line("PING :hi\r\n".into()).await.unwrap();
        assert_eq!(
            transport.read_line().await.unwrap().as_deref(),
            Some(":server PONG :hi")
        );
        assert_eq!(server.await.unwrap(), "PING :hi");

        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_halves() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, mut write) = stream.into_split();
            let mut lines = AsyncBufReader::new(read).lines();
            write.write_all(b"PING :split\r\n").await.unwrap();
            lines.next_line().await.unwrap().unwrap()
        });

        let opts = ConnectOptions {
            host: "127.0.0.1".into(),
            port,
            ..Default::default()
        };
        let (mut sink, mut stream) = Transport::connect(&opts).await.unwrap().split();
        let line = stream.next().await.unwrap().unwrap();
        assert_eq!(line, "PING :split");
        sink.send("PONG :split\r\n".into()).await.unwrap();
        assert_eq!(server.await.unwrap(), "PONG :split");
    }

    #[tokio::test]
    async fn test_bind_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().1 });

        let opts = ConnectOptions {
            host: "127.0.0.1".into(),
            port,
            bind_host: Some("127.0.0.1".into()),
            ..Default::default()
        };
        let _transport = Transport::connect(&opts).await.unwrap();
        assert!(accept.await.unwrap().ip().is_loopback());
    }

    #[test]
    fn test_missing_client_cert_file() {
        let opts = ConnectOptions {
            host: "irc.example.net".into(),
            port: 6697,
            use_ssl: true,
            verify_ssl: false,
            client_cert: Some("/nonexistent/cert.pem".into()),
            ..Default::default()
        };
        assert!(matches!(tls_config(&opts), Err(ProtocolError::Io(_))));
    }

    // ========================================================================
    // TLS
    // ========================================================================

    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
    use tokio_rustls::rustls::server::WebPkiClientVerifier;
    use tokio_rustls::rustls::ServerConfig;
    use tokio_rustls::TlsAcceptor;

    struct TlsFiles {
        _dir: tempfile::TempDir,
        ca: PathBuf,
        server_cert: PathBuf,
        server_key: PathBuf,
        client_cert: PathBuf,
        client_key: PathBuf,
    }

    /// A test CA with a `localhost` server cert and a client cert.
    fn tls_files() -> TlsFiles {
        let dir = tempfile::tempdir().unwrap();

        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "sopel-test-ca");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        let server_key = KeyPair::generate().unwrap();
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "TestBot");
        let client_key = KeyPair::generate().unwrap();
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        let files = TlsFiles {
            ca: dir.path().join("ca.pem"),
            server_cert: dir.path().join("server.pem"),
            server_key: dir.path().join("server.key"),
            client_cert: dir.path().join("client.pem"),
            client_key: dir.path().join("client.key"),
            _dir: dir,
        };
        std::fs::write(&files.ca, ca_cert.pem()).unwrap();
        std::fs::write(&files.server_cert, server_cert.pem()).unwrap();
        std::fs::write(&files.server_key, server_key.serialize_pem()).unwrap();
        std::fs::write(&files.client_cert, client_cert.pem()).unwrap();
        std::fs::write(&files.client_key, client_key.serialize_pem()).unwrap();
        files
    }

    /// Accept one TLS client, answer its first line and report what it sent
    /// and whether it presented a certificate.
    async fn tls_server(
        files: &TlsFiles,
        require_client_cert: bool,
    ) -> (u16, tokio::task::JoinHandle<Option<(String, bool)>>) {
        let builder = if require_client_cert {
            let mut roots = RootCertStore::empty();
            roots.add_parsable_certificates(load_certs(&files.ca).unwrap());
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots)).build().unwrap();
            ServerConfig::builder().with_client_cert_verifier(verifier)
        } else {
            ServerConfig::builder().with_no_client_auth()
        };
        let config = builder
            .with_single_cert(
                load_certs(&files.server_cert).unwrap(),
                load_key(&files.server_key).unwrap(),
            )
            .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let stream = acceptor.accept(stream).await.ok()?;
            let has_client_cert = stream.get_ref().1.peer_certificates().is_some();
            let (read, mut write) = tokio::io::split(stream);
            let mut lines = AsyncBufReader::new(read).lines();
            let line = lines.next_line().await.ok()??;
            write.write_all(b":irc.test PONG :tls\r\n").await.ok()?;
            write.flush().await.ok()?;
            Some((line, has_client_cert))
        });
        (port, server)
    }

    async fn ping_over_tls(opts: &ConnectOptions) -> Result<Transport> {
        let mut transport = Transport::connect(opts).await?;
        assert!(transport.is_tls());
        transport.write_line("PING :tls\r\n".into()).await?;
        assert_eq!(
            transport.read_line().await?.as_deref(),
            Some(":irc.test PONG :tls")
        );
        Ok(transport)
    }

    fn tls_options(port: u16) -> ConnectOptions {
        ConnectOptions {
            host: "localhost".into(),
            port,
            use_ssl: true,
            verify_ssl: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tls_without_verification() {
        let files = tls_files();
        let (port, server) = tls_server(&files, false).await;

        let opts = ConnectOptions {
            verify_ssl: false,
            ..tls_options(port)
        };
        ping_over_tls(&opts).await.unwrap();
        assert_eq!(server.await.unwrap(), Some(("PING :tls".to_string(), false)));
    }

    #[tokio::test]
    async fn test_tls_with_ca_bundle() {
        let files = tls_files();
        let (port, server) = tls_server(&files, false).await;

        let opts = ConnectOptions {
            ca_certs: Some(files.ca.clone()),
            ..tls_options(port)
        };
        ping_over_tls(&opts).await.unwrap();
        assert_eq!(server.await.unwrap(), Some(("PING :tls".to_string(), false)));
    }

    #[tokio::test]
    async fn test_tls_untrusted_server_rejected() {
        let files = tls_files();
        let (port, server) = tls_server(&files, false).await;

        let result = Transport::connect(&tls_options(port)).await;
        assert!(matches!(result, Err(ProtocolError::Io(_))));
        assert_eq!(server.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tls_client_certificate() {
        let files = tls_files();
        let (port, server) = tls_server(&files, true).await;

        let opts = ConnectOptions {
            ca_certs: Some(files.ca.clone()),
            client_cert: Some(files.client_cert.clone()),
            client_key: Some(files.client_key.clone()),
            ..tls_options(port)
        };
        ping_over_tls(&opts).await.unwrap();
        assert_eq!(server.await.unwrap(), Some(("PING :tls".to_string(), true)));
    }

    #[test]
    fn test_ca_bundle_extends_system_roots() {
        let files = tls_files();
        let system = root_store(None).unwrap().len();
        let extended = root_store(Some(&files.ca)).unwrap().len();
        assert_eq!(extended, system + 1);
    }
}

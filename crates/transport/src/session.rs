//! TCP and TLS session plumbing.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme, StreamOwned};
use types::{Error, ErrorKind, Result};

/// TLS behavior for a [`TransportConfig`].
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Verify the peer certificate; on by default.
    pub verify: bool,
    /// CA bundle file overriding the platform roots.
    pub ca_file: Option<PathBuf>,
    /// Directory of CA certificates overriding the platform roots.
    pub ca_path: Option<PathBuf>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify: true,
            ca_file: None,
            ca_path: None,
        }
    }
}

/// Connection parameters for an [`crate::HttpClient`].
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
    /// Per-call I/O timeout.
    pub timeout: Duration,
    /// TLS settings; `None` means plain TCP, which only test rigs use.
    pub tls: Option<TlsOptions>,
}

impl TransportConfig {
    /// Creates an HTTPS configuration with default TLS options.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(60),
            tls: Some(TlsOptions::default()),
        }
    }

    /// Creates a plain-TCP configuration.
    #[must_use]
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(60),
            tls: None,
        }
    }
}

enum StreamKind {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl StreamKind {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(out),
            Self::Tls(stream) => stream.read(out),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data),
            Self::Tls(stream) => stream.write_all(data),
        }
    }
}

fn io_error(action: &str, error: &std::io::Error) -> Error {
    let tls = error
        .get_ref()
        .is_some_and(|inner| inner.is::<rustls::Error>());

    let kind = if tls { ErrorKind::Tls } else { ErrorKind::Protocol };
    Error::new(kind, format!("unable to {action}: {error}"))
}

/// One connection to a peer, buffered for line-oriented response parsing.
pub struct HttpSession {
    stream: StreamKind,
    buffer: Vec<u8>,
    start: usize,
    end: usize,
}

impl HttpSession {
    const BUFFER_SIZE: usize = 8 * 1024;

    /// Connects, including the TLS handshake configuration when enabled.
    pub fn connect(config: &TransportConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).map_err(|error| {
            Error::protocol(format!(
                "unable to connect to '{}:{}': {error}",
                config.host, config.port
            ))
        })?;

        stream
            .set_read_timeout(Some(config.timeout))
            .and_then(|()| stream.set_write_timeout(Some(config.timeout)))
            .and_then(|()| stream.set_nodelay(true))
            .map_err(|error| Error::protocol(format!("unable to configure socket: {error}")))?;

        let stream = match &config.tls {
            None => StreamKind::Plain(stream),
            Some(options) => {
                let tls_config = client_config(options)?;
                let server_name = ServerName::try_from(config.host.clone()).map_err(|error| {
                    Error::new(
                        ErrorKind::Tls,
                        format!("invalid server name '{}': {error}", config.host),
                    )
                })?;
                let connection = ClientConnection::new(tls_config, server_name).map_err(|error| {
                    Error::new(ErrorKind::Tls, format!("unable to begin tls session: {error}"))
                })?;

                StreamKind::Tls(Box::new(StreamOwned::new(connection, stream)))
            }
        };

        tracing::debug!(host = %config.host, port = config.port, "session connect");

        Ok(Self {
            stream,
            buffer: vec![0; Self::BUFFER_SIZE],
            start: 0,
            end: 0,
        })
    }

    /// Writes the full slice.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream
            .write_all(data)
            .map_err(|error| io_error("write", &error))
    }

    fn fill(&mut self) -> Result<usize> {
        self.start = 0;
        self.end = self
            .stream
            .read(&mut self.buffer)
            .map_err(|error| io_error("read", &error))?;

        Ok(self.end)
    }

    /// True when at least one buffered byte is available without touching
    /// the socket.
    #[must_use]
    pub const fn buffered(&self) -> bool {
        self.start < self.end
    }

    /// Reads one CRLF-terminated line, without the terminator.
    pub fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();

        loop {
            if self.start == self.end && self.fill()? == 0 {
                return Err(Error::protocol("unexpected eof while reading line"));
            }

            while self.start < self.end {
                let byte = self.buffer[self.start];
                self.start += 1;

                if byte == b'\n' {
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }

                    return String::from_utf8(line)
                        .map_err(|_| Error::protocol("response line is not valid utf-8"));
                }

                line.push(byte);
            }
        }
    }

    /// Fills `out` completely.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < out.len() {
            let taken = self.read_some(&mut out[filled..])?;

            if taken == 0 {
                return Err(Error::protocol("unexpected eof while reading body"));
            }

            filled += taken;
        }

        Ok(())
    }

    /// Reads whatever is available, buffered bytes first; zero means EOF.
    pub fn read_some(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        if self.start == self.end && self.fill()? == 0 {
            return Ok(0);
        }

        let taken = (self.end - self.start).min(out.len());
        out[..taken].copy_from_slice(&self.buffer[self.start..self.start + taken]);
        self.start += taken;

        Ok(taken)
    }
}

fn add_pem_file(roots: &mut RootCertStore, path: &std::path::Path) -> Result<()> {
    let file = File::open(path).map_err(|error| {
        Error::new(
            ErrorKind::Tls,
            format!("unable to open ca file '{}': {error}", path.display()),
        )
    })?;

    let mut reader = BufReader::new(file);

    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|error| {
            Error::new(
                ErrorKind::Tls,
                format!("unable to parse ca file '{}': {error}", path.display()),
            )
        })?;

        roots.add(cert).map_err(|error| {
            Error::new(
                ErrorKind::Tls,
                format!("unable to add ca certificate from '{}': {error}", path.display()),
            )
        })?;
    }

    Ok(())
}

fn client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();

    if let Some(file) = &options.ca_file {
        add_pem_file(&mut roots, file)?;
    } else if let Some(dir) = &options.ca_path {
        let entries = std::fs::read_dir(dir).map_err(|error| {
            Error::new(
                ErrorKind::Tls,
                format!("unable to read ca path '{}': {error}", dir.display()),
            )
        })?;

        for entry in entries {
            let entry = entry.map_err(|error| {
                Error::new(
                    ErrorKind::Tls,
                    format!("unable to read ca path '{}': {error}", dir.display()),
                )
            })?;

            add_pem_file(&mut roots, &entry.path())?;
        }
    } else {
        for cert in rustls_native_certs::load_native_certs().certs {
            // Platform stores can hold stale entries; skip what does not parse
            let _ = roots.add(cert);
        }
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if !options.verify {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    Ok(Arc::new(config))
}

/// Verifier that accepts any certificate, for test rigs only.
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
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

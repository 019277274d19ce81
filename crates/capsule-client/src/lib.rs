//! Async Gemini client.
//!
//! The client dials TLS with in-handshake verification disabled and decides
//! trust itself, trust-on-first-use style: every request reports the
//! fingerprints the server presented, and the caller pins the ones it
//! accepts with [`Client::add_server_certificate`]. Client certificates are
//! selected by URL prefix, so an identity can be scoped to a single capsule
//! or a subtree of one.
//!
//! ```no_run
//! use capsule_client::Client;
//! use capsule_core::CancelScope;
//!
//! # async fn demo() -> Result<(), capsule_client::ClientError> {
//! let client = Client::new();
//! let scope = CancelScope::unbounded();
//! let first = client.request(&scope, "gemini://example.org/").await?;
//! if !first.trusted {
//!     // Show first.certificates to the user; pin one to proceed.
//!     for fingerprint in &first.certificates {
//!         client.add_server_certificate("example.org", fingerprint.clone());
//!     }
//! }
//! let second = client.request(&scope, "gemini://example.org/").await?;
//! assert!(second.trusted);
//! # Ok(())
//! # }
//! ```

mod error;
mod response;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use capsule_core::{read_crlf_line, CancelScope, Header, DEFAULT_PORT, RESPONSE_LINE_LIMIT};
use capsule_tls::{
    check_validity, fingerprint, fingerprint_matches, AcceptAnyServerCert, Identity, ValidityError,
};
use parking_lot::RwLock;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;
use url::Url;

pub use error::ClientError;
pub use response::{Body, Response};

/// Outcome of a single request.
///
/// `response` is populated unless the server's certificate failed the trust
/// check; in that case `trusted` is `false` and `certificates` carries the
/// fingerprints that were observed, so the caller can prompt the user and
/// pin one before retrying.
pub struct Fetch {
    pub response: Option<Response>,
    /// Base64 SHA-256 fingerprints presented by the server, in chain order.
    pub certificates: Vec<String>,
    /// Whether a client certificate was attached (mutual TLS).
    pub authenticated: bool,
    /// Whether a presented certificate matched the pinned set for the host.
    pub trusted: bool,
}

#[derive(Default)]
struct Tables {
    /// URL prefix to client identity, kept in insertion order; the first
    /// matching prefix wins.
    prefix_certs: Vec<(String, Identity)>,
    /// Lowercased host to the set of pinned certificate fingerprints.
    allowed: HashMap<String, HashSet<String>>,
}

/// Long-lived, thread-shared Gemini client.
pub struct Client {
    tables: RwLock<Tables>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Skip the trust check entirely. The fingerprints are still reported.
    pub insecure: bool,
}

impl Default for Client {
    fn default() -> Client {
        Client::new()
    }
}

impl Client {
    pub fn new() -> Client {
        Client {
            tables: RwLock::new(Tables::default()),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            insecure: false,
        }
    }

    /// Registers a client identity used whenever the request URL starts with
    /// `prefix`. An empty prefix applies to every URL. Re-registering a
    /// prefix replaces its identity without changing its priority.
    pub fn add_client_certificate(&self, prefix: impl Into<String>, identity: Identity) {
        let prefix = prefix.into();
        let mut tables = self.tables.write();
        match tables.prefix_certs.iter_mut().find(|(p, _)| *p == prefix) {
            Some(slot) => slot.1 = identity,
            None => tables.prefix_certs.push((prefix, identity)),
        }
    }

    /// Pins a server certificate fingerprint for a host. Base64 SHA-256 is
    /// canonical; lowercase hex from older pin files is accepted too. A host
    /// may have any number of pinned fingerprints.
    pub fn add_server_certificate(&self, host: &str, fingerprint: impl Into<String>) {
        let mut tables = self.tables.write();
        tables
            .allowed
            .entry(host.to_ascii_lowercase())
            .or_default()
            .insert(fingerprint.into());
    }

    fn identity_for(&self, url: &Url) -> Option<Identity> {
        let tables = self.tables.read();
        tables
            .prefix_certs
            .iter()
            .find(|(prefix, _)| url.as_str().starts_with(prefix.as_str()))
            .map(|(_, identity)| identity.clone())
    }

    fn pinned_for(&self, host: &str) -> HashSet<String> {
        self.tables
            .read()
            .allowed
            .get(&host.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Parses `url` and requests it. See [`Client::request_url`].
    pub async fn request(&self, cancel: &CancelScope, url: &str) -> Result<Fetch, ClientError> {
        let url = Url::parse(url)?;
        self.request_url(cancel, &url).await
    }

    /// Requests a parsed URL over TLS.
    pub async fn request_url(&self, cancel: &CancelScope, url: &Url) -> Result<Fetch, ClientError> {
        let host = url.host_str().ok_or(ClientError::MissingHost)?.to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let identity = self.identity_for(url);
        let authenticated = identity.is_some();
        let config = client_config(identity)?;
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = self.dial(&host, port).await?;
        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| ClientError::InvalidServerName(host.clone()))?;
        let addr = format!("{host}:{port}");
        let stream = timeout(self.read_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr))?
            .map_err(ClientError::Connect)?;

        let pinned = self.pinned_for(&host);
        let mut certificates = Vec::new();
        let mut trusted = false;
        if let Some(peer_certs) = stream.get_ref().1.peer_certificates() {
            for cert in peer_certs {
                certificates.push(fingerprint(cert.as_ref()));
                if pinned
                    .iter()
                    .any(|candidate| fingerprint_matches(cert.as_ref(), candidate))
                {
                    trusted = true;
                    break;
                }
                if let Err(err) = check_validity(cert.as_ref(), SystemTime::now()) {
                    return Err(match err {
                        ValidityError::NotYetValid => ClientError::CertificateNotYetValid,
                        ValidityError::Expired => ClientError::CertificateExpired,
                        ValidityError::Malformed => ClientError::MalformedCertificate,
                    });
                }
            }
        }
        if !trusted && !self.insecure {
            debug!(target: "capsule::client", %url, "no pinned fingerprint matched");
            return Ok(Fetch {
                response: None,
                certificates,
                authenticated,
                trusted: false,
            });
        }

        let response = self.exchange(cancel, stream, url).await?;
        Ok(Fetch {
            response: Some(response),
            certificates,
            authenticated,
            trusted,
        })
    }

    /// Requests a parsed URL over plain TCP. Useful against local test
    /// servers; no trust checks apply.
    pub async fn request_no_tls(
        &self,
        cancel: &CancelScope,
        url: &Url,
    ) -> Result<Response, ClientError> {
        let host = url.host_str().ok_or(ClientError::MissingHost)?.to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let tcp = self.dial(&host, port).await?;
        self.exchange(cancel, tcp, url).await
    }

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, ClientError> {
        let addr = format!("{host}:{port}");
        timeout(self.read_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| ClientError::ConnectTimeout(addr))?
            .map_err(ClientError::Connect)
    }

    async fn exchange<S>(
        &self,
        cancel: &CancelScope,
        mut stream: S,
        url: &Url,
    ) -> Result<Response, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        debug!(target: "capsule::client", %url, "sending request");
        let line = format!("{url}\r\n");
        timeout(self.write_timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| ClientError::WriteTimeout)?
        .map_err(ClientError::WriteRequest)?;

        let status_line = timeout(
            self.read_timeout,
            read_crlf_line(&mut stream, RESPONSE_LINE_LIMIT),
        )
        .await
        .map_err(|_| ClientError::ReadTimeout)?
        .map_err(ClientError::ReadHeader)?;
        let header = Header::parse(&status_line)?;

        Ok(Response {
            header,
            body: Body::new(Box::new(stream), cancel.clone()),
        })
    }
}

fn client_config(identity: Option<Identity>) -> Result<rustls::ClientConfig, ClientError> {
    let builder = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert));
    let config = match identity {
        Some(identity) => builder.with_client_auth_cert(identity.cert_chain, identity.key)?,
        None => builder.with_no_client_auth(),
    };
    Ok(config)
}

//! Async Gemini server.
//!
//! A [`Server`] owns a map from SNI server name to [`DomainHandler`] and
//! serves each accepted connection on its own task: TLS handshake, peer
//! certificate extraction, request-line parsing, handler invocation through
//! a [`ResponseWriter`], then connection close. Handlers observe shutdown
//! and their per-request wall-clock budget through the request's
//! cancellation scope; panics inside a handler are caught at the connection
//! boundary and become a `42` response when no header has been sent yet.
//!
//! Routing, middleware and static file serving live in the [`mux`],
//! [`handlers`] and [`files`] modules.

pub mod files;
pub mod handlers;
pub mod mux;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use capsule_core::{read_crlf_line, LineError, REQUEST_LINE_LIMIT};
use capsule_tls::{check_validity, fingerprint, OptionalClientCert, SniResolver, TlsError};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Instant};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use url::Url;

pub use capsule_core::{CancelScope, ResponseWriter, Status, WriteError};
pub use capsule_tls::Identity;

/// Handles a single Gemini request.
///
/// Implementations receive the writer in its pending state and may either
/// set an explicit header or just write body bytes (which sends the default
/// success header). Returned errors are logged by the server and, when no
/// header made it out, converted into a `42` response.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        (**self).serve_gemini(w, r).await
    }
}

/// Client certificate as seen by the server.
///
/// `id` is the base64 SHA-256 fingerprint of the raw DER certificate and
/// doubles as a stable user identifier. `error` is set when the certificate
/// was presented but is outside its validity window; such requests are
/// answered with `62` before the handler runs.
#[derive(Debug, Clone, Default)]
pub struct Certificate {
    pub id: String,
    pub key: Vec<u8>,
    pub error: Option<String>,
}

impl Certificate {
    pub fn from_der(der: &[u8], now: SystemTime) -> Certificate {
        Certificate {
            id: fingerprint(der),
            key: der.to_vec(),
            error: check_validity(der, now).err().map(|err| err.to_string()),
        }
    }

    /// Whether the client presented a certificate at all.
    pub fn is_present(&self) -> bool {
        !self.id.is_empty()
    }
}

/// A single Gemini request: the URL from the request line, the peer
/// certificate, and a cancellation scope bounded by the handler budget.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub certificate: Certificate,
    pub cancel: CancelScope,
    /// Populated by [`mux::Mux`] when the request was routed.
    pub route: Option<mux::MatchedRoute>,
}

impl Request {
    pub fn new(url: Url, certificate: Certificate, cancel: CancelScope) -> Request {
        Request {
            url,
            certificate,
            cancel,
            route: None,
        }
    }
}

/// One virtual host: the SNI name clients ask for, the identity served for
/// it, and the handler that answers its requests.
#[derive(Clone)]
pub struct DomainHandler {
    pub server_name: String,
    pub identity: Identity,
    pub handler: Arc<dyn Handler>,
}

impl DomainHandler {
    pub fn new(
        server_name: impl Into<String>,
        identity: Identity,
        handler: Arc<dyn Handler>,
    ) -> DomainHandler {
        DomainHandler {
            server_name: server_name.into().to_ascii_lowercase(),
            identity,
            handler,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server closed")]
    Closed,
    #[error("no domains registered")]
    NoDomains,
    #[error("insecure mode requires exactly one domain, found {0}")]
    InsecureRequiresSingleDomain(usize),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tls(#[from] TlsError),
}

const DEFAULT_ADDR: &str = "0.0.0.0:1965";

/// Gemini server. Construct with [`Server::new`], then call
/// [`Server::listen_and_serve`]. The domain map is immutable once serving
/// starts; the cancellation scope stops the accept loop and is observed by
/// in-flight handlers at their next suspension point.
#[derive(Clone)]
pub struct Server {
    addr: String,
    domains: Arc<HashMap<String, DomainHandler>>,
    cancel: CancelScope,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub handler_timeout: Duration,
}

impl Server {
    /// `addr` may be empty (defaults to `0.0.0.0:1965`) or of the `:port`
    /// form. Domain names are lowercased for SNI lookup.
    pub fn new(
        cancel: CancelScope,
        addr: impl Into<String>,
        domains: impl IntoIterator<Item = DomainHandler>,
    ) -> Server {
        let domains = domains
            .into_iter()
            .map(|domain| (domain.server_name.clone(), domain))
            .collect();
        Server {
            addr: addr.into(),
            domains: Arc::new(domains),
            cancel,
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            handler_timeout: Duration::from_secs(30),
        }
    }

    fn bind_addr(&self) -> String {
        if self.addr.is_empty() {
            DEFAULT_ADDR.to_string()
        } else if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    fn settings(&self) -> ConnSettings {
        ConnSettings {
            cancel: self.cancel.clone(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            handler_timeout: self.handler_timeout,
        }
    }

    /// Binds the configured address and accepts TLS connections until the
    /// cancellation scope fires.
    pub async fn listen_and_serve(&self) -> Result<(), ServerError> {
        if self.cancel.is_cancelled() {
            return Err(ServerError::Closed);
        }
        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve_listener(listener).await
    }

    /// Accepts TLS connections from an already-bound listener. Useful when
    /// the caller needs the bound address first (e.g. binding port 0).
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.cancel.is_cancelled() {
            return Err(ServerError::Closed);
        }
        if self.domains.is_empty() {
            return Err(ServerError::NoDomains);
        }
        let mut resolver = SniResolver::new();
        for domain in self.domains.values() {
            resolver.add(&domain.server_name, &domain.identity)?;
        }
        let config = rustls::ServerConfig::builder()
            .with_client_cert_verifier(Arc::new(OptionalClientCert))
            .with_cert_resolver(Arc::new(resolver));
        let acceptor = TlsAcceptor::from(Arc::new(config));
        info!(
            target: "capsule::server",
            addr = ?listener.local_addr().ok(),
            domains = self.domains.len(),
            "listening"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(target: "capsule::server", "shutdown requested, stopping accept loop");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((tcp, peer)) => {
                        let acceptor = acceptor.clone();
                        let settings = self.settings();
                        let domains = Arc::clone(&self.domains);
                        tokio::spawn(secure_connection(settings, domains, acceptor, tcp, peer));
                    }
                    Err(err) => {
                        warn!(target: "capsule::server", error = %err, "accept failed");
                    }
                },
            }
        }
    }

    /// Binds the configured address and accepts plain-TCP connections. See
    /// [`Server::serve_listener_insecure`].
    pub async fn listen_and_serve_insecure(&self) -> Result<(), ServerError> {
        if self.cancel.is_cancelled() {
            return Err(ServerError::Closed);
        }
        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        self.serve_listener_insecure(listener).await
    }

    /// Accepts plain-TCP connections, for local testing behind a trusted
    /// boundary. Only permitted with exactly one registered domain, since
    /// there is no SNI to dispatch on; no client certificates are seen.
    pub async fn serve_listener_insecure(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.cancel.is_cancelled() {
            return Err(ServerError::Closed);
        }
        if self.domains.len() != 1 {
            return Err(ServerError::InsecureRequiresSingleDomain(self.domains.len()));
        }
        let handler = self
            .domains
            .values()
            .next()
            .map(|domain| Arc::clone(&domain.handler));
        info!(
            target: "capsule::server",
            addr = ?listener.local_addr().ok(),
            "listening without TLS"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!(target: "capsule::server", "shutdown requested, stopping accept loop");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((tcp, _peer)) => {
                        let settings = self.settings();
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let (read_half, write_half) = tcp.into_split();
                            serve_connection(settings, read_half, write_half, Certificate::default(), handler)
                                .await;
                        });
                    }
                    Err(err) => {
                        warn!(target: "capsule::server", error = %err, "accept failed");
                    }
                },
            }
        }
    }
}

#[derive(Clone)]
struct ConnSettings {
    cancel: CancelScope,
    read_timeout: Duration,
    write_timeout: Duration,
    handler_timeout: Duration,
}

async fn secure_connection(
    settings: ConnSettings,
    domains: Arc<HashMap<String, DomainHandler>>,
    acceptor: TlsAcceptor,
    tcp: TcpStream,
    peer: SocketAddr,
) {
    let stream = match timeout(settings.read_timeout, acceptor.accept(tcp)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(err)) => {
            warn!(target: "capsule::server", %peer, error = %err, "tls handshake failed");
            return;
        }
        Err(_) => {
            warn!(target: "capsule::server", %peer, "tls handshake timed out");
            return;
        }
    };

    let (server_name, certificate) = {
        let (_, conn) = stream.get_ref();
        let server_name = conn.server_name().map(|name| name.to_ascii_lowercase());
        let certificate = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|der| Certificate::from_der(der.as_ref(), SystemTime::now()))
            .unwrap_or_default();
        (server_name, certificate)
    };
    let handler = server_name
        .as_deref()
        .and_then(|name| domains.get(name))
        .map(|domain| Arc::clone(&domain.handler));
    if handler.is_none() {
        warn!(
            target: "capsule::server",
            %peer,
            server_name = server_name.as_deref().unwrap_or("<none>"),
            "no handler for server name"
        );
    }

    let (read_half, write_half) = tokio::io::split(stream);
    serve_connection(settings, read_half, write_half, certificate, handler).await;
}

/// Drives one accepted connection: parse the request line, run the handler
/// under its deadline and panic guard, close.
async fn serve_connection<R, W>(
    settings: ConnSettings,
    mut read_half: R,
    write_half: W,
    certificate: Certificate,
    handler: Option<Arc<dyn Handler>>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let started = Instant::now();
    let mut writer =
        ResponseWriter::new(write_half).with_write_deadline(Instant::now() + settings.write_timeout);

    let line = match timeout(
        settings.read_timeout,
        read_crlf_line(&mut read_half, REQUEST_LINE_LIMIT),
    )
    .await
    {
        Ok(Ok(line)) => line,
        Ok(Err(err)) => {
            let meta = match &err {
                LineError::LimitExceeded { .. } => "request too long or malformed".to_string(),
                LineError::Io { .. } if err.is_eof() => {
                    "request too long or malformed".to_string()
                }
                LineError::Io { source, .. } => format!("error reading request: {source}"),
            };
            warn!(target: "capsule::server", error = %err, "failed to read request");
            refuse(writer, &meta).await;
            return;
        }
        Err(_) => {
            warn!(target: "capsule::server", "timed out reading request");
            let _ = writer.finish().await;
            return;
        }
    };

    let text = String::from_utf8_lossy(&line);
    let url = match Url::parse(text.trim()) {
        Ok(url) => url,
        Err(err) => {
            warn!(target: "capsule::server", request = %text, error = %err, "malformed request");
            refuse(writer, "request malformed").await;
            return;
        }
    };
    debug!(target: "capsule::server", %url, "received request");

    let Some(handler) = handler else {
        if let Err(err) = writer
            .set_header(Status::PROXY_REQUEST_REFUSED, "domain not served")
            .await
        {
            debug!(target: "capsule::server", error = %err, "failed to refuse request");
        }
        let _ = writer.finish().await;
        return;
    };

    let cancel = settings
        .cancel
        .with_deadline(Instant::now() + settings.handler_timeout);
    let mut request = Request::new(url.clone(), certificate, cancel);

    if let Some(reason) = request.certificate.error.clone() {
        warn!(
            target: "capsule::server",
            %url,
            reason = %reason,
            "client certificate outside validity window"
        );
        if let Err(err) = writer
            .set_header(Status::CERTIFICATE_NOT_VALID, &reason)
            .await
        {
            debug!(target: "capsule::server", error = %err, "failed to send 62");
        }
    } else {
        let handler_run =
            AssertUnwindSafe(handler.serve_gemini(&mut writer, &mut request)).catch_unwind();
        match timeout(settings.handler_timeout, handler_run).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => {
                warn!(target: "capsule::server", path = url.path(), error = %err, "handler failed");
                fail_if_pending(&mut writer, "internal error").await;
            }
            Ok(Err(_panic)) => {
                error!(target: "capsule::server", path = url.path(), "handler panicked");
                fail_if_pending(&mut writer, "internal error").await;
            }
            Err(_) => {
                warn!(target: "capsule::server", path = url.path(), "handler exceeded its time budget");
                fail_if_pending(&mut writer, "internal error").await;
            }
        }
    }

    if writer.status().is_none() {
        warn!(target: "capsule::server", path = url.path(), "handler produced an empty response");
        fail_if_pending(&mut writer, "empty response").await;
    }

    let code = writer
        .status()
        .map(|status| status.to_string())
        .unwrap_or_else(|| "-".to_string());
    let header_bytes = writer.header_bytes();
    let body_bytes = writer.body_bytes();
    if let Err(err) = writer.finish().await {
        debug!(target: "capsule::server", error = %err, "connection close failed");
    }
    info!(
        target: "capsule::server",
        %url,
        path = url.path(),
        code = %code,
        duration_ms = started.elapsed().as_millis() as u64,
        header_bytes,
        body_bytes,
        "response complete"
    );
}

async fn refuse(mut writer: ResponseWriter, meta: &str) {
    if let Err(err) = writer.set_header(Status::BAD_REQUEST, meta).await {
        debug!(target: "capsule::server", error = %err, "failed to send 59");
    }
    let _ = writer.finish().await;
}

async fn fail_if_pending(writer: &mut ResponseWriter, meta: &str) {
    if writer.status().is_none() {
        if let Err(err) = writer.set_header(Status::CGI_ERROR, meta).await {
            debug!(target: "capsule::server", error = %err, "failed to send 42");
        }
    }
}

/// Runs a handler against an in-memory connection and returns the raw bytes
/// it produced. Intended for tests and handler development.
pub async fn record(handler: &dyn Handler, request: &mut Request) -> Result<Vec<u8>, WriteError> {
    let (near, far) = tokio::io::duplex(64 * 1024);
    let mut writer = ResponseWriter::new(near);
    let serve = async move {
        handler.serve_gemini(&mut writer, request).await?;
        writer.finish().await
    };
    let drain = async move {
        let mut far = far;
        let mut collected = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut far, &mut collected)
            .await
            .map(|_| collected)
    };
    let (served, drained) = tokio::join!(serve, drain);
    served?;
    Ok(drained?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_core::DEFAULT_MIME_TYPE;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct WriteBody(&'static [u8]);

    #[async_trait]
    impl Handler for WriteBody {
        async fn serve_gemini(
            &self,
            w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            w.write(self.0).await?;
            Ok(())
        }
    }

    struct SetHeader(Status, &'static str);

    #[async_trait]
    impl Handler for SetHeader {
        async fn serve_gemini(
            &self,
            w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            w.set_header(self.0, self.1).await
        }
    }

    struct LongMeta;

    #[async_trait]
    impl Handler for LongMeta {
        async fn serve_gemini(
            &self,
            w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            w.set_header(Status::CGI_ERROR, &"a".repeat(2048)).await
        }
    }

    struct Panicker;

    #[async_trait]
    impl Handler for Panicker {
        async fn serve_gemini(
            &self,
            _w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            panic!("handler exploded");
        }
    }

    struct Noop;

    #[async_trait]
    impl Handler for Noop {
        async fn serve_gemini(
            &self,
            _w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            Ok(())
        }
    }

    struct FailureThenBody;

    #[async_trait]
    impl Handler for FailureThenBody {
        async fn serve_gemini(
            &self,
            w: &mut ResponseWriter,
            _r: &mut Request,
        ) -> Result<(), WriteError> {
            w.set_header(Status::CGI_ERROR, "oops").await?;
            w.write(b"# Hello World!").await?;
            Ok(())
        }
    }

    fn settings() -> ConnSettings {
        ConnSettings {
            cancel: CancelScope::unbounded(),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            handler_timeout: Duration::from_secs(30),
        }
    }

    /// Feeds raw request bytes through `serve_connection` and collects the
    /// raw response, without TLS in the way.
    async fn roundtrip(
        request: &[u8],
        certificate: Certificate,
        handler: Option<Arc<dyn Handler>>,
    ) -> Vec<u8> {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let serve = serve_connection(settings(), server_read, server_write, certificate, handler);
        let drive = async move {
            client.write_all(request).await.expect("send request");
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.expect("read response");
            response
        };
        let (_, response) = tokio::join!(serve, drive);
        response
    }

    async fn roundtrip_with(request: &[u8], handler: impl Handler + 'static) -> Vec<u8> {
        roundtrip(request, Certificate::default(), Some(Arc::new(handler))).await
    }

    #[tokio::test]
    async fn body_only_handler_gets_the_default_header() {
        let response = roundtrip_with(b"gemini://example/\r\n", WriteBody(b"# hi")).await;
        assert_eq!(
            response,
            format!("20 {DEFAULT_MIME_TYPE}\r\n# hi").into_bytes()
        );
    }

    #[tokio::test]
    async fn explicit_not_found_keeps_its_empty_meta() {
        let response = roundtrip_with(b"gemini://example/\r\n", SetHeader(Status::NOT_FOUND, "")).await;
        assert_eq!(response, b"51 \r\n".to_vec());
    }

    #[tokio::test]
    async fn input_prompt_passes_through() {
        let response = roundtrip_with(
            b"gemini://sensible\r\n",
            SetHeader(Status::INPUT, "What's your name?"),
        )
        .await;
        assert_eq!(response, b"10 What's your name?\r\n".to_vec());
    }

    #[tokio::test]
    async fn oversized_requests_get_a_59() {
        let mut request = vec![b'a'; 2048];
        request.extend_from_slice(b"\r\n");
        let response = roundtrip_with(&request, WriteBody(b"unreachable")).await;
        assert_eq!(response, b"59 request too long or malformed\r\n".to_vec());
    }

    #[tokio::test]
    async fn tab_separated_requests_are_malformed() {
        let response = roundtrip_with(b"tab\tis\tinvalid\r\n", WriteBody(b"unreachable")).await;
        assert_eq!(response, b"59 request malformed\r\n".to_vec());
    }

    #[tokio::test]
    async fn meta_is_truncated_on_the_wire() {
        let response = roundtrip_with(b"gemini://example/\r\n", LongMeta).await;
        assert_eq!(response, format!("42 {}\r\n", "a".repeat(1024)).into_bytes());
    }

    #[tokio::test]
    async fn handler_panics_become_a_42() {
        let response = roundtrip_with(b"gemini://example/\r\n", Panicker).await;
        assert_eq!(response, b"42 internal error\r\n".to_vec());
    }

    #[tokio::test]
    async fn empty_responses_become_a_42() {
        let response = roundtrip_with(b"gemini://example/\r\n", Noop).await;
        assert_eq!(response, b"42 empty response\r\n".to_vec());
    }

    #[tokio::test]
    async fn body_after_failure_header_is_suppressed() {
        let response = roundtrip_with(b"gemini://example/\r\n", FailureThenBody).await;
        assert_eq!(response, b"42 oops\r\n".to_vec());
    }

    #[tokio::test]
    async fn invalid_certificate_short_circuits_the_handler() {
        let certificate = Certificate {
            id: "fingerprint".to_string(),
            key: vec![1, 2, 3],
            error: Some("certificate has expired".to_string()),
        };
        let response = roundtrip(
            b"gemini://example/\r\n",
            certificate,
            Some(Arc::new(WriteBody(b"secret"))),
        )
        .await;
        assert_eq!(response, b"62 certificate has expired\r\n".to_vec());
    }

    #[tokio::test]
    async fn missing_handler_refuses_the_domain() {
        let response = roundtrip(b"gemini://other/\r\n", Certificate::default(), None).await;
        assert_eq!(response, b"53 domain not served\r\n".to_vec());
    }

    #[tokio::test]
    async fn slow_handlers_hit_the_time_budget() {
        struct Sleeper;

        #[async_trait]
        impl Handler for Sleeper {
            async fn serve_gemini(
                &self,
                _w: &mut ResponseWriter,
                _r: &mut Request,
            ) -> Result<(), WriteError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }
        }

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let mut settings = settings();
        settings.handler_timeout = Duration::from_millis(50);
        let serve = serve_connection(
            settings,
            server_read,
            server_write,
            Certificate::default(),
            Some(Arc::new(Sleeper)),
        );
        let drive = async move {
            client.write_all(b"gemini://example/\r\n").await.expect("send");
            let mut response = Vec::new();
            client.read_to_end(&mut response).await.expect("read");
            response
        };
        let (_, response) = tokio::join!(serve, drive);
        assert_eq!(response, b"42 internal error\r\n".to_vec());
    }

    #[tokio::test]
    async fn listen_refuses_to_start_after_cancellation() {
        let (canceller, scope) = capsule_core::cancel_scope();
        canceller.cancel();
        let server = Server::new(scope, "", []);
        let err = server.listen_and_serve().await.expect_err("closed");
        assert!(matches!(err, ServerError::Closed));
    }

    #[tokio::test]
    async fn insecure_mode_requires_a_single_domain() {
        let identity = Identity::self_signed(["a"]).expect("identity");
        let domains = vec![
            DomainHandler::new("a", identity.clone(), Arc::new(Noop)),
            DomainHandler::new("b", identity, Arc::new(Noop)),
        ];
        let server = Server::new(CancelScope::unbounded(), "127.0.0.1:0", domains);
        let err = server
            .listen_and_serve_insecure()
            .await
            .expect_err("two domains");
        assert!(matches!(err, ServerError::InsecureRequiresSingleDomain(2)));
    }
}

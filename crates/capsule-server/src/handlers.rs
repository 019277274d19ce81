//! Stock handlers and middleware wrappers.

use std::sync::Arc;

use async_trait::async_trait;
use capsule_core::{ResponseWriter, Status, WriteError};

use crate::{Handler, Request};

/// Responds `51` to every request.
pub struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        _r: &mut Request,
    ) -> Result<(), WriteError> {
        w.set_header(Status::NOT_FOUND, "").await
    }
}

/// Responds `59` to every request.
pub struct BadRequestHandler;

#[async_trait]
impl Handler for BadRequestHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        _r: &mut Request,
    ) -> Result<(), WriteError> {
        w.set_header(Status::BAD_REQUEST, "").await
    }
}

/// Redirects every request to a fixed target, with status `30` or `31`.
pub struct RedirectHandler {
    status: Status,
    to: String,
}

impl RedirectHandler {
    pub fn temporary(to: impl Into<String>) -> RedirectHandler {
        RedirectHandler {
            status: Status::REDIRECT_TEMPORARY,
            to: to.into(),
        }
    }

    pub fn permanent(to: impl Into<String>) -> RedirectHandler {
        RedirectHandler {
            status: Status::REDIRECT_PERMANENT,
            to: to.into(),
        }
    }
}

#[async_trait]
impl Handler for RedirectHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        _r: &mut Request,
    ) -> Result<(), WriteError> {
        w.set_header(self.status, &self.to).await
    }
}

/// Removes a path prefix before delegating; requests whose path does not
/// carry the prefix get `51`.
pub struct StripPrefixHandler {
    prefix: String,
    inner: Arc<dyn Handler>,
}

impl StripPrefixHandler {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Handler>) -> StripPrefixHandler {
        StripPrefixHandler {
            prefix: prefix.into(),
            inner,
        }
    }
}

#[async_trait]
impl Handler for StripPrefixHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        if self.prefix.is_empty() {
            return self.inner.serve_gemini(w, r).await;
        }
        let path = r.url.path().to_string();
        match path.strip_prefix(&self.prefix) {
            Some(rest) => {
                // The handler downstream sees a clone; the original request
                // keeps its path.
                let mut stripped = r.clone();
                if rest.starts_with('/') {
                    stripped.url.set_path(rest);
                } else {
                    stripped.url.set_path(&format!("/{rest}"));
                }
                self.inner.serve_gemini(w, &mut stripped).await
            }
            None => NotFoundHandler.serve_gemini(w, r).await,
        }
    }
}

/// Decides whether the presented client certificate may reach the wrapped
/// handler. Receives the certificate's fingerprint id and its raw DER key.
pub type Authorizer = Arc<dyn Fn(&str, &[u8]) -> bool + Send + Sync>;

/// Requires a client certificate: `60` when none was presented, `61` when
/// the authorizer rejects it, otherwise delegates.
pub struct RequireCertificateHandler {
    inner: Arc<dyn Handler>,
    authorizer: Authorizer,
}

impl RequireCertificateHandler {
    /// Any authenticated user is allowed through.
    pub fn new(inner: Arc<dyn Handler>) -> RequireCertificateHandler {
        RequireCertificateHandler {
            inner,
            authorizer: Arc::new(|_id, _key| true),
        }
    }

    pub fn with_authorizer(
        inner: Arc<dyn Handler>,
        authorizer: Authorizer,
    ) -> RequireCertificateHandler {
        RequireCertificateHandler { inner, authorizer }
    }
}

#[async_trait]
impl Handler for RequireCertificateHandler {
    async fn serve_gemini(
        &self,
        w: &mut ResponseWriter,
        r: &mut Request,
    ) -> Result<(), WriteError> {
        if !r.certificate.is_present() {
            return w
                .set_header(Status::CLIENT_CERTIFICATE_REQUIRED, "")
                .await;
        }
        if !(self.authorizer)(&r.certificate.id, &r.certificate.key) {
            return w.set_header(Status::CERTIFICATE_NOT_AUTHORISED, "").await;
        }
        self.inner.serve_gemini(w, r).await
    }
}

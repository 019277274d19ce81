use std::io;

use capsule_core::{HeaderError, LineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("url has no host")]
    MissingHost,
    #[error("invalid server name {0:?}")]
    InvalidServerName(String),
    #[error("error connecting: {0}")]
    Connect(#[source] io::Error),
    #[error("timed out connecting to {0}")]
    ConnectTimeout(String),
    #[error("tls configuration rejected: {0}")]
    Tls(#[from] rustls::Error),
    #[error("server certificate is not yet valid")]
    CertificateNotYetValid,
    #[error("server certificate has expired")]
    CertificateExpired,
    #[error("server certificate could not be parsed")]
    MalformedCertificate,
    #[error("error writing request: {0}")]
    WriteRequest(#[source] io::Error),
    #[error("timed out writing request")]
    WriteTimeout,
    #[error("timed out reading response header")]
    ReadTimeout,
    #[error("failed to read status line: {0}")]
    ReadHeader(#[source] LineError),
    #[error("invalid response header: {0}")]
    Header(#[from] HeaderError),
}

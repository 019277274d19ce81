use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use x509_parser::prelude::*;

/// Why a certificate failed its time-window check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityError {
    NotYetValid,
    Expired,
    Malformed,
}

impl fmt::Display for ValidityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidityError::NotYetValid => f.write_str("certificate is not yet valid"),
            ValidityError::Expired => f.write_str("certificate has expired"),
            ValidityError::Malformed => f.write_str("certificate could not be parsed"),
        }
    }
}

impl std::error::Error for ValidityError {}

/// Checks that `now` falls inside the certificate's `[notBefore, notAfter]`
/// window. Certificates outside the window are not rejected during the TLS
/// handshake; callers surface this as a `62` response or a client-side
/// failure instead.
pub fn check_validity(der: &[u8], now: SystemTime) -> Result<(), ValidityError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|_| ValidityError::Malformed)?;
    let now = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| ValidityError::NotYetValid)?
        .as_secs() as i64;
    let validity = cert.validity();
    if now < validity.not_before.timestamp() {
        return Err(ValidityError::NotYetValid);
    }
    if now > validity.not_after.timestamp() {
        return Err(ValidityError::Expired);
    }
    Ok(())
}

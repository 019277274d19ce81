use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use sha2::{Digest, Sha256};

/// SHA-256 fingerprint of a DER-encoded certificate, base64 standard
/// encoding with padding. This is the canonical form emitted everywhere.
pub fn fingerprint(der: &[u8]) -> String {
    BASE64_STANDARD.encode(Sha256::digest(der))
}

/// The same digest rendered as lowercase hex. Older pinned entries used this
/// form, so it is still accepted on input.
pub fn fingerprint_hex(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Whether `candidate` names this certificate in either accepted encoding.
pub fn fingerprint_matches(der: &[u8], candidate: &str) -> bool {
    candidate == fingerprint(der) || candidate.eq_ignore_ascii_case(&fingerprint_hex(der))
}

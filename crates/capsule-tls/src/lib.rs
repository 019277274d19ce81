//! TLS plumbing shared by the Gemini client and server.
//!
//! Gemini inverts the usual web trust model: certificates are self-signed by
//! convention and trust is pinned out of band, by remembering the SHA-256
//! fingerprint of a peer's DER certificate on first use. The verifiers in
//! this crate therefore pass every certificate through the handshake and
//! leave the trust decision to the caller.

mod fingerprint;
mod identity;
mod sni;
mod validity;
mod verify;

pub use fingerprint::{fingerprint, fingerprint_hex, fingerprint_matches};
pub use identity::{Identity, TlsError};
pub use sni::SniResolver;
pub use validity::{check_validity, ValidityError};
pub use verify::{AcceptAnyServerCert, OptionalClientCert};

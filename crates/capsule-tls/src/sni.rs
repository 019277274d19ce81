use std::collections::HashMap;
use std::sync::Arc;

use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::identity::{Identity, TlsError};

/// Picks the server identity from the SNI hostname in the client hello.
///
/// Names are lowercased at insertion and at lookup, so `A-H.GeMiNi` resolves
/// the identity registered for `a-h.gemini`. A hello without a recognised
/// name resolves nothing, which fails the handshake.
#[derive(Debug, Default)]
pub struct SniResolver {
    by_name: HashMap<String, Arc<CertifiedKey>>,
}

impl SniResolver {
    pub fn new() -> SniResolver {
        SniResolver::default()
    }

    pub fn add(&mut self, server_name: &str, identity: &Identity) -> Result<(), TlsError> {
        self.by_name
            .insert(server_name.to_ascii_lowercase(), identity.to_certified_key()?);
        Ok(())
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?;
        self.by_name.get(&name.to_ascii_lowercase()).cloned()
    }
}

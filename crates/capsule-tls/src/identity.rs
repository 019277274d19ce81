use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::sign::CertifiedKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("unsupported private key: {0}")]
    UnsupportedKey(#[source] rustls::Error),
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),
}

/// A certificate chain with its private key, as loaded from PEM files or
/// generated in memory.
#[derive(Debug)]
pub struct Identity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Clone for Identity {
    fn clone(&self) -> Identity {
        Identity {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl Identity {
    /// Loads a PEM certificate chain and PEM private key from disk.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> Result<Identity, TlsError> {
        let mut cert_reader = open(cert_path)?;
        let cert_chain = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::Read {
                path: cert_path.to_path_buf(),
                source,
            })?;
        if cert_chain.is_empty() {
            return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
        }

        let mut key_reader = open(key_path)?;
        let key = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|source| TlsError::Read {
                path: key_path.to_path_buf(),
                source,
            })?
            .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;

        Ok(Identity { cert_chain, key })
    }

    /// Generates a self-signed identity for the given hostnames. Suitable
    /// for Gemini, where self-signed certificates are the norm, and for
    /// tests.
    pub fn self_signed<I, S>(hostnames: I) -> Result<Identity, TlsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = hostnames.into_iter().map(Into::into).collect();
        let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)?;
        Ok(Identity {
            cert_chain: vec![cert.der().clone()],
            key: PrivatePkcs8KeyDer::from(key_pair.serialize_der()).into(),
        })
    }

    /// The leaf certificate presented to peers.
    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.cert_chain[0]
    }

    /// Converts into the form rustls wants for SNI resolution.
    pub fn to_certified_key(&self) -> Result<Arc<CertifiedKey>, TlsError> {
        let key = rustls::crypto::ring::sign::any_supported_type(&self.key)
            .map_err(TlsError::UnsupportedKey)?;
        Ok(Arc::new(CertifiedKey::new(self.cert_chain.clone(), key)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_a_usable_self_signed_identity() {
        let identity = Identity::self_signed(["localhost"]).expect("generate");
        assert_eq!(identity.cert_chain.len(), 1);
        assert!(!identity.leaf().as_ref().is_empty());
        identity.to_certified_key().expect("certified key");
    }
}

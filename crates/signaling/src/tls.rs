//! Certificate loading for the optional encrypted listener
//!
//! The server falls back to a plaintext listener when this fails, so every
//! problem here surfaces as a `TlsError` rather than aborting startup.

use crate::error::{Error, Result};
use rustls::{Certificate, PrivateKey, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Build a TLS acceptor from PEM certificate chain and private key files
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::TlsError(format!("invalid certificate/key pair: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<Certificate>> {
    let file = File::open(path)
        .map_err(|e| Error::TlsError(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| Error::TlsError(format!("cannot parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(Error::TlsError(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn load_private_key(path: &Path) -> Result<PrivateKey> {
    let file = File::open(path)
        .map_err(|e| Error::TlsError(format!("cannot open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(file);

    // PKCS#8 first, then legacy RSA
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| Error::TlsError(format!("cannot parse {}: {e}", path.display())))?;
    if keys.is_empty() {
        let file = File::open(path)
            .map_err(|e| Error::TlsError(format!("cannot open {}: {e}", path.display())))?;
        let mut reader = BufReader::new(file);
        keys = rustls_pemfile::rsa_private_keys(&mut reader)
            .map_err(|e| Error::TlsError(format!("cannot parse {}: {e}", path.display())))?;
    }

    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| Error::TlsError(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_cert_file_is_tls_error() {
        let err = load_acceptor(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .err()
            .unwrap();
        assert!(err.is_tls_error());
    }

    #[test]
    fn test_garbage_pem_is_tls_error() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "this is not a certificate").unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "this is not a key").unwrap();

        let err = load_acceptor(cert.path(), key.path()).err().unwrap();
        assert!(err.is_tls_error());
    }
}

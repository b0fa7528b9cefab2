use std::fs;
use std::io::BufReader;
use std::sync::Arc;

use rustls::ServerConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read serving certificate '{path}': {source}")]
    CertRead {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to read serving key '{path}': {source}")]
    KeyRead {
        path: String,
        source: std::io::Error,
    },
    #[error("no PEM certificates found in '{0}'")]
    NoCerts(String),
    #[error("no PEM private key found in '{0}'")]
    NoKey(String),
    #[error("failed to build TLS config: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Builds the serving config for the webhook listener from PEM files.
pub fn load_tls_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_err = |source| TlsError::CertRead {
        path: cert_path.to_string(),
        source,
    };
    let key_err = |source| TlsError::KeyRead {
        path: key_path.to_string(),
        source,
    };

    let cert_pem = fs::read(cert_path).map_err(cert_err)?;
    let key_pem = fs::read(key_path).map_err(key_err)?;

    let chain = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(cert_err)?;
    if chain.is_empty() {
        return Err(TlsError::NoCerts(cert_path.to_string()));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))
        .map_err(key_err)?
        .ok_or_else(|| TlsError::NoKey(key_path.to_string()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_cert_file() {
        let err = load_tls_config("/nonexistent/tls.crt", "/nonexistent/tls.key").unwrap_err();
        assert!(matches!(err, TlsError::CertRead { .. }));
        assert!(err.to_string().contains("/nonexistent/tls.crt"));
    }

    #[test]
    fn test_file_without_pem_blocks() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        writeln!(key, "not a key").unwrap();

        let cert_path = cert.path().to_str().unwrap();
        let key_path = key.path().to_str().unwrap();
        let err = load_tls_config(cert_path, key_path).unwrap_err();
        assert!(matches!(err, TlsError::NoCerts(ref p) if p == cert_path));
    }
}

//! Mutual-TLS security context for the secured stream listener.
//!
//! # Responsibilities
//! - Load the server certificate chain and private key (PEM)
//! - Build the client trust pool from the CA bundle
//! - Produce an immutable acceptor that requires and verifies client certificates
//!
//! # Design Decisions
//! - Client authentication is mandatory; there is no skip-verify switch
//! - Any failure is fatal to startup, there is no partially built context

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// Errors raised while building a [`SecurityContext`].
#[derive(Debug, Error)]
pub enum TlsError {
    /// Certificate or private key could not be loaded, or they do not match.
    #[error("failed to load certificate '{}' / key '{}': {message}", cert.display(), key.display())]
    CertLoad {
        cert: PathBuf,
        key: PathBuf,
        message: String,
    },

    /// CA bundle could not be read.
    #[error("failed to read CA bundle '{}': {source}", path.display())]
    CaRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CA bundle yielded no usable trust anchor.
    #[error("CA bundle '{}' contains no usable certificate: {message}", path.display())]
    CaPool { path: PathBuf, message: String },
}

/// Immutable server-side TLS settings enforcing mutual authentication.
///
/// Cheap to clone; every secured connection shares the same inner config.
#[derive(Clone)]
pub struct SecurityContext {
    config: Arc<ServerConfig>,
    trust_anchors: usize,
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("trust_anchors", &self.trust_anchors)
            .finish()
    }
}

impl SecurityContext {
    /// Build the context from a certificate, its private key, and a CA bundle
    /// used to verify client certificates.
    pub fn build(cert_path: &Path, key_path: &Path, ca_path: &Path) -> Result<Self, TlsError> {
        let cert_err = |message: String| TlsError::CertLoad {
            cert: cert_path.to_path_buf(),
            key: key_path.to_path_buf(),
            message,
        };

        let chain = load_certificates(cert_path).map_err(&cert_err)?;
        let key = load_private_key(key_path).map_err(&cert_err)?;

        let ca = std::fs::read(ca_path).map_err(|source| TlsError::CaRead {
            path: ca_path.to_path_buf(),
            source,
        })?;
        let roots = trust_pool(&ca).map_err(|message| TlsError::CaPool {
            path: ca_path.to_path_buf(),
            message,
        })?;
        let trust_anchors = roots.len();

        let provider = Arc::new(ring::default_provider());
        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| TlsError::CaPool {
                path: ca_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let config = server_config(provider)
            .map_err(|e| cert_err(e.to_string()))?
            .with_client_cert_verifier(verifier)
            .with_single_cert(chain, key)
            .map_err(|e| cert_err(e.to_string()))?;

        tracing::info!(
            cert = %cert_path.display(),
            ca = %ca_path.display(),
            trust_anchors,
            "TLS security context built"
        );

        Ok(Self {
            config: Arc::new(config),
            trust_anchors,
        })
    }

    /// Acceptor performing the server side of the mutual handshake.
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(Arc::clone(&self.config))
    }

    /// Number of CA certificates in the client trust pool.
    pub fn trust_anchors(&self) -> usize {
        self.trust_anchors
    }
}

fn server_config(
    provider: Arc<CryptoProvider>,
) -> Result<rustls::ConfigBuilder<ServerConfig, rustls::WantsVerifier>, rustls::Error> {
    ServerConfig::builder_with_provider(provider).with_safe_default_protocol_versions()
}

fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("{}: {}", path.display(), e))?;

    if certs.is_empty() {
        return Err(format!("{}: no certificates found", path.display()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| format!("{}: {}", path.display(), e))?
        .ok_or_else(|| format!("{}: no private key found", path.display()))
}

/// Turn a PEM bundle into a root store. Malformed blocks are skipped; an
/// empty result is an error.
fn trust_pool(pem: &[u8]) -> Result<RootCertStore, String> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .filter_map(Result::ok)
        .collect();

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(format!("{} certificate(s) rejected", ignored));
    }
    if ignored > 0 {
        tracing::warn!(added, ignored, "Some CA certificates were not usable");
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn pem_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    struct Pki {
        cert: NamedTempFile,
        key: NamedTempFile,
        ca: NamedTempFile,
    }

    fn pki() -> Pki {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec!["localhost".to_string()])
            .unwrap()
            .signed_by(&key, &ca_cert, &ca_key)
            .unwrap();

        Pki {
            cert: pem_file(&cert.pem()),
            key: pem_file(&key.serialize_pem()),
            ca: pem_file(&ca_cert.pem()),
        }
    }

    #[test]
    fn builds_with_valid_material() {
        let pki = pki();
        let ctx = SecurityContext::build(pki.cert.path(), pki.key.path(), pki.ca.path()).unwrap();
        assert_eq!(ctx.trust_anchors(), 1);
    }

    #[test]
    fn missing_certificate_is_cert_load_error() {
        let pki = pki();
        let err = SecurityContext::build(
            Path::new("/nonexistent/server.pem"),
            pki.key.path(),
            pki.ca.path(),
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::CertLoad { .. }));
        assert!(err.to_string().contains("/nonexistent/server.pem"));
    }

    #[test]
    fn corrupt_certificate_is_cert_load_error() {
        let pki = pki();
        let garbage = pem_file("this is not a certificate\n");
        let err = SecurityContext::build(garbage.path(), pki.key.path(), pki.ca.path()).unwrap_err();
        assert!(matches!(err, TlsError::CertLoad { .. }));
    }

    #[test]
    fn missing_key_is_cert_load_error() {
        let pki = pki();
        let empty = pem_file("");
        let err = SecurityContext::build(pki.cert.path(), empty.path(), pki.ca.path()).unwrap_err();
        assert!(matches!(err, TlsError::CertLoad { .. }));
    }

    #[test]
    fn key_mismatch_is_cert_load_error() {
        let pki = pki();
        let other = self::pki();
        let err = SecurityContext::build(pki.cert.path(), other.key.path(), pki.ca.path()).unwrap_err();
        assert!(matches!(err, TlsError::CertLoad { .. }));
    }

    #[test]
    fn unreadable_ca_is_ca_read_error() {
        let pki = pki();
        let err = SecurityContext::build(
            pki.cert.path(),
            pki.key.path(),
            Path::new("/nonexistent/ca.pem"),
        )
        .unwrap_err();
        assert!(matches!(err, TlsError::CaRead { .. }));
    }

    #[test]
    fn ca_without_certificates_is_ca_pool_error() {
        let pki = pki();
        let empty = pem_file("-- nothing here --\n");
        let err = SecurityContext::build(pki.cert.path(), pki.key.path(), empty.path()).unwrap_err();
        assert!(matches!(err, TlsError::CaPool { .. }));
    }
}

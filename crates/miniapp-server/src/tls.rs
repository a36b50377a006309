//! Certificate material for the loopback server.
//!
//! One self-issued certificate is generated per process, for `localhost`
//! and `127.0.0.1`, and shared by every server instance. It has no CA
//! behind it; clients recognise it by its SHA-256 fingerprint.

use std::fmt;
use std::sync::{Arc, OnceLock};

use miniapp_common::ServerError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha2::{Digest, Sha256};
use tracing::info;

/// SHA-256 over a certificate's DER encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CertificateFingerprint([u8; 32]);

impl CertificateFingerprint {
    pub fn of(der: &[u8]) -> Self {
        Self(Sha256::digest(der).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CertificateFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CertificateFingerprint({self})")
    }
}

/// A certificate and its private key.
#[derive(Clone)]
pub struct CertificateMaterial {
    certificate: CertificateDer<'static>,
    private_key: Arc<Vec<u8>>,
    fingerprint: CertificateFingerprint,
}

static PROCESS_CERTIFICATE: OnceLock<CertificateMaterial> = OnceLock::new();

impl CertificateMaterial {
    /// Generate a fresh self-issued certificate for the loopback names.
    pub fn generate() -> Result<Self, ServerError> {
        let names = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        let certified = rcgen::generate_simple_self_signed(names)
            .map_err(|e| ServerError::TrustSetup(format!("certificate generation failed: {e}")))?;

        let certificate = certified.cert.der().clone();
        let fingerprint = CertificateFingerprint::of(certificate.as_ref());
        Ok(Self {
            certificate,
            private_key: Arc::new(certified.key_pair.serialize_der()),
            fingerprint,
        })
    }

    /// The certificate shared by every server in this process, generated on
    /// first use. A failed generation is not cached.
    pub fn process_default() -> Result<Self, ServerError> {
        if let Some(existing) = PROCESS_CERTIFICATE.get() {
            return Ok(existing.clone());
        }
        let generated = Self::generate()?;
        let material = PROCESS_CERTIFICATE.get_or_init(|| generated);
        info!(fingerprint = %material.fingerprint, "generated loopback certificate");
        Ok(material.clone())
    }

    pub fn certificate_der(&self) -> &CertificateDer<'static> {
        &self.certificate
    }

    pub fn fingerprint(&self) -> CertificateFingerprint {
        self.fingerprint
    }

    /// Build a rustls server config presenting this certificate.
    pub fn server_config(&self) -> Result<Arc<rustls::ServerConfig>, ServerError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.private_key.as_ref().clone()));

        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ServerError::TrustSetup(format!("unsupported protocol versions: {e}")))?
            .with_no_client_auth()
            .with_single_cert(vec![self.certificate.clone()], key)
            .map_err(|e| ServerError::TrustSetup(format!("certificate rejected: {e}")))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

impl fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

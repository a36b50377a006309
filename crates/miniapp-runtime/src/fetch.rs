//! Initial entry-document fetch.
//!
//! A `reqwest` client whose TLS certificate check is delegated to the
//! [`TrustNegotiator`], so the embedded server's self-issued certificate is
//! accepted by fingerprint while remote hosts get ordinary WebPKI
//! verification. `401` responses carrying a Basic challenge are answered
//! from the negotiator's credential store, once.

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use miniapp_common::FetchError;
use miniapp_server::CertificateFingerprint;
use reqwest::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::trust::{
    Challenge, Credential, CredentialChallenge, Disposition, ProtectionSpace,
    ServerTrustChallenge, TrustNegotiator,
};

// =============================================================================
// CERTIFICATE VERIFICATION
// =============================================================================

#[derive(Debug)]
struct NegotiatingVerifier {
    negotiator: Arc<TrustNegotiator>,
    fallback: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NegotiatingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let challenge = Challenge::ServerTrust(ServerTrustChallenge {
            host: server_name.to_str().into_owned(),
            fingerprint: CertificateFingerprint::of(end_entity.as_ref()),
        });
        match self.negotiator.decide(&challenge) {
            Disposition::UseCredential(_) => Ok(ServerCertVerified::assertion()),
            Disposition::PerformDefault => self.fallback.verify_server_cert(
                end_entity,
                intermediates,
                server_name,
                ocsp_response,
                now,
            ),
            Disposition::Cancel => Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            )),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn client_tls_config(negotiator: Arc<TrustNegotiator>) -> Result<rustls::ClientConfig, FetchError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let fallback = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| FetchError::Trust(format!("verifier setup failed: {e}")))?;

    let verifier = NegotiatingVerifier {
        negotiator,
        fallback,
        provider: provider.clone(),
    };

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::Trust(format!("TLS config failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

// =============================================================================
// FETCHER
// =============================================================================

/// Maximum credential attempts per fetch; the negotiator cancels after the
/// first rejection, this only bounds a misbehaving store.
const MAX_AUTH_ATTEMPTS: u32 = 3;

pub struct ContentFetcher {
    http: reqwest::Client,
    negotiator: Arc<TrustNegotiator>,
}

/// A successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl ContentFetcher {
    pub fn new(negotiator: Arc<TrustNegotiator>, timeout: Duration) -> Result<Self, FetchError> {
        let tls = client_tls_config(Arc::clone(&negotiator))?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("client setup failed: {e}")))?;
        Ok(Self { http, negotiator })
    }

    pub fn negotiator(&self) -> &Arc<TrustNegotiator> {
        &self.negotiator
    }

    /// GET `url` and return the body.
    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.fetch_resource(url).await.map(|fetched| fetched.body)
    }

    /// GET `url` and return the body with its declared content type.
    pub async fn fetch_resource(&self, url: &Url) -> Result<Fetched, FetchError> {
        let mut credential: Option<(String, String)> = None;
        let mut failures = 0u32;

        loop {
            let mut request = self.http.get(url.clone());
            if let Some((user, password)) = &credential {
                request = request.basic_auth(user, Some(password));
            }

            debug!(url = %url, attempt = failures, "fetching");
            let response = request.send().await.map_err(classify_error)?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                let realm = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(basic_realm);
                let Some(realm) = realm else {
                    return Err(FetchError::Status(status.as_u16()));
                };

                // A rejected credential counts as a failure for the next round.
                if credential.is_some() {
                    failures += 1;
                }
                if failures >= MAX_AUTH_ATTEMPTS {
                    return Err(FetchError::Trust(format!(
                        "authentication failed for {}",
                        url.host_str().unwrap_or_default()
                    )));
                }

                let challenge = Challenge::Credential(CredentialChallenge {
                    space: protection_space(url, realm),
                    previous_failure_count: failures,
                });
                match self.negotiator.decide(&challenge) {
                    Disposition::UseCredential(Credential::Basic { user, password }) => {
                        credential = Some((user, password));
                        continue;
                    }
                    Disposition::UseCredential(Credential::ServerTrust(_))
                    | Disposition::PerformDefault => {
                        return Err(FetchError::Status(status.as_u16()));
                    }
                    Disposition::Cancel => {
                        return Err(FetchError::Trust(format!(
                            "credential challenge cancelled for {}",
                            url.host_str().unwrap_or_default()
                        )));
                    }
                }
            }

            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.map_err(classify_error)?;
            debug!(url = %url, bytes = body.len(), "fetched");
            return Ok(Fetched {
                content_type,
                body: body.to_vec(),
            });
        }
    }

    /// Like [`fetch`](Self::fetch), abandoned with [`FetchError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn fetch_until_cancelled(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch(url) => result,
        }
    }

    /// Like [`fetch_resource`](Self::fetch_resource), abandoned with
    /// [`FetchError::Cancelled`] as soon as `cancel` fires.
    pub async fn fetch_resource_until_cancelled(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Fetched, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_resource(url) => result,
        }
    }
}

fn protection_space(url: &Url, realm: Option<String>) -> ProtectionSpace {
    ProtectionSpace {
        host: url.host_str().unwrap_or_default().to_string(),
        port: url.port_or_known_default().unwrap_or_default(),
        scheme: url.scheme().to_string(),
        realm,
    }
}

/// Parse a `WWW-Authenticate` value. `Some(realm)` for a Basic challenge,
/// `None` for any other scheme.
fn basic_realm(header: &str) -> Option<Option<String>> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let realm = params.split(',').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("realm")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    Some(realm)
}

/// Map a transport failure onto the fetch taxonomy. Certificate rejections
/// surface as a `rustls::Error` somewhere in the source chain.
fn classify_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout;
    }

    if let Some(tls) = find_tls_error(&error) {
        warn!(error = %tls, "TLS handshake refused");
        return FetchError::Trust(tls.to_string());
    }

    FetchError::Network(error.to_string())
}

/// Walk the source chain looking for a `rustls::Error`. The TLS layers wrap
/// it in one or more custom `io::Error`s, whose `source()` skips the wrapped
/// error itself, so those are unwrapped with `get_ref()` instead.
fn find_tls_error<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(tls) = err.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        current = match err.downcast_ref::<io::Error>().and_then(|io| io.get_ref()) {
            Some(inner) => Some(inner as &(dyn Error + 'static)),
            None => err.source(),
        };
    }
    None
}

#[cfg(test)]
mod tests;

//! Challenge resolution for TLS server trust and HTTP credentials.
//!
//! Two tiers, never mixed:
//! - Server trust for a loopback host is answered from the set of locally
//!   generated certificate fingerprints. A match is trusted outright; any
//!   other certificate on a loopback host is refused.
//! - Server trust for every other host, and every credential challenge,
//!   goes through the normal rules: system roots for certificates, the
//!   credential store for authentication, with no retry after a failure.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::RwLock;

use miniapp_server::CertificateFingerprint;
use tracing::{debug, warn};

// =============================================================================
// CHALLENGES
// =============================================================================

/// Where a credential applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtectionSpace {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub realm: Option<String>,
}

/// A server presented a certificate during the TLS handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTrustChallenge {
    pub host: String,
    pub fingerprint: CertificateFingerprint,
}

/// A server asked for authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialChallenge {
    pub space: ProtectionSpace,
    /// How many times a credential for this space was already rejected
    /// during the current request.
    pub previous_failure_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    ServerTrust(ServerTrustChallenge),
    Credential(CredentialChallenge),
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Trust the certificate with this fingerprint.
    ServerTrust(CertificateFingerprint),
    Basic { user: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::ServerTrust(fp) => f.debug_tuple("ServerTrust").field(fp).finish(),
            Credential::Basic { user, .. } => f
                .debug_struct("Basic")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    UseCredential(Credential),
    PerformDefault,
    Cancel,
}

/// True for `localhost` and loopback IP literals, bracketed or not.
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

// =============================================================================
// NEGOTIATOR
// =============================================================================

/// Answers challenges for the embedded server and for host-level fetches.
///
/// Shared between the fetch client and the web surface; all methods take
/// `&self`.
#[derive(Debug, Default)]
pub struct TrustNegotiator {
    local_certificates: RwLock<HashSet<CertificateFingerprint>>,
    credentials: RwLock<HashMap<ProtectionSpace, Credential>>,
}

impl TrustNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the certificate of an embedded loopback server.
    pub fn trust_local_certificate(&self, fingerprint: CertificateFingerprint) {
        if let Ok(mut certs) = self.local_certificates.write() {
            if certs.insert(fingerprint) {
                debug!(%fingerprint, "local certificate registered");
            }
        }
    }

    pub fn is_local_certificate(&self, fingerprint: &CertificateFingerprint) -> bool {
        self.local_certificates
            .read()
            .map(|certs| certs.contains(fingerprint))
            .unwrap_or(false)
    }

    /// Store the default credential for a protection space.
    pub fn set_default_credential(&self, space: ProtectionSpace, credential: Credential) {
        if let Ok(mut credentials) = self.credentials.write() {
            credentials.insert(space, credential);
        }
    }

    pub fn default_credential(&self, space: &ProtectionSpace) -> Option<Credential> {
        self.credentials
            .read()
            .ok()
            .and_then(|credentials| credentials.get(space).cloned())
    }

    pub fn decide(&self, challenge: &Challenge) -> Disposition {
        match challenge {
            Challenge::ServerTrust(trust) => self.decide_server_trust(trust),
            Challenge::Credential(credential) => self.decide_credential(credential),
        }
    }

    fn decide_server_trust(&self, challenge: &ServerTrustChallenge) -> Disposition {
        if !is_loopback_host(&challenge.host) {
            return Disposition::PerformDefault;
        }
        if self.is_local_certificate(&challenge.fingerprint) {
            debug!(host = %challenge.host, "trusting local server certificate");
            Disposition::UseCredential(Credential::ServerTrust(challenge.fingerprint))
        } else {
            warn!(
                host = %challenge.host,
                fingerprint = %challenge.fingerprint,
                "unknown certificate on loopback host, cancelling"
            );
            Disposition::Cancel
        }
    }

    fn decide_credential(&self, challenge: &CredentialChallenge) -> Disposition {
        let space = &challenge.space;
        if challenge.previous_failure_count > 0 {
            warn!(
                host = %space.host,
                realm = ?space.realm,
                failures = challenge.previous_failure_count,
                "credential rejected, cancelling challenge"
            );
            return Disposition::Cancel;
        }
        match self.default_credential(space) {
            Some(credential) => {
                debug!(host = %space.host, realm = ?space.realm, "using stored credential");
                Disposition::UseCredential(credential)
            }
            None => Disposition::PerformDefault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(seed: u8) -> CertificateFingerprint {
        CertificateFingerprint::of(&[seed; 16])
    }

    fn space() -> ProtectionSpace {
        ProtectionSpace {
            host: "127.0.0.1".into(),
            port: 8443,
            scheme: "https".into(),
            realm: Some("bundles".into()),
        }
    }

    fn trust(host: &str, fp: CertificateFingerprint) -> Challenge {
        Challenge::ServerTrust(ServerTrustChallenge {
            host: host.into(),
            fingerprint: fp,
        })
    }

    fn basic() -> Credential {
        Credential::Basic {
            user: "dev".into(),
            password: "secret".into(),
        }
    }

    #[test]
    fn local_certificate_is_always_trusted() {
        let negotiator = TrustNegotiator::new();
        negotiator.trust_local_certificate(fingerprint(1));
        for host in ["127.0.0.1", "localhost", "LOCALHOST", "[::1]", "::1"] {
            assert_eq!(
                negotiator.decide(&trust(host, fingerprint(1))),
                Disposition::UseCredential(Credential::ServerTrust(fingerprint(1))),
                "{host}"
            );
        }
    }

    #[test]
    fn unknown_certificate_on_loopback_is_cancelled() {
        let negotiator = TrustNegotiator::new();
        negotiator.trust_local_certificate(fingerprint(1));
        assert_eq!(
            negotiator.decide(&trust("127.0.0.1", fingerprint(2))),
            Disposition::Cancel
        );
    }

    #[test]
    fn local_fingerprint_is_not_trusted_for_remote_hosts() {
        let negotiator = TrustNegotiator::new();
        negotiator.trust_local_certificate(fingerprint(1));
        assert_eq!(
            negotiator.decide(&trust("example.com", fingerprint(1))),
            Disposition::PerformDefault
        );
        assert_eq!(
            negotiator.decide(&trust("10.0.0.1", fingerprint(1))),
            Disposition::PerformDefault
        );
    }

    #[test]
    fn first_credential_challenge_uses_stored_default() {
        let negotiator = TrustNegotiator::new();
        negotiator.set_default_credential(space(), basic());
        let challenge = Challenge::Credential(CredentialChallenge {
            space: space(),
            previous_failure_count: 0,
        });
        assert_eq!(
            negotiator.decide(&challenge),
            Disposition::UseCredential(basic())
        );
    }

    #[test]
    fn first_credential_challenge_without_default_performs_default() {
        let negotiator = TrustNegotiator::new();
        let challenge = Challenge::Credential(CredentialChallenge {
            space: space(),
            previous_failure_count: 0,
        });
        assert_eq!(negotiator.decide(&challenge), Disposition::PerformDefault);
    }

    #[test]
    fn repeated_credential_failure_is_cancelled() {
        let negotiator = TrustNegotiator::new();
        negotiator.set_default_credential(space(), basic());
        for failures in [1, 2, 10] {
            let challenge = Challenge::Credential(CredentialChallenge {
                space: space(),
                previous_failure_count: failures,
            });
            assert_eq!(negotiator.decide(&challenge), Disposition::Cancel);
        }
    }

    #[test]
    fn credential_lookup_is_per_realm() {
        let negotiator = TrustNegotiator::new();
        negotiator.set_default_credential(space(), basic());
        let other = ProtectionSpace {
            realm: Some("admin".into()),
            ..space()
        };
        assert!(negotiator.default_credential(&other).is_none());
    }

    #[test]
    fn basic_credential_debug_redacts_password() {
        let rendered = format!("{:?}", basic());
        assert!(rendered.contains("dev"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn loopback_host_detection() {
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("127.1.2.3"));
        assert!(is_loopback_host("localhost"));
        assert!(!is_loopback_host("localhost.example.com"));
        assert!(!is_loopback_host("192.168.1.1"));
        assert!(!is_loopback_host(""));
    }
}

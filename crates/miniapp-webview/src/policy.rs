//! Navigation policy for the hosted page.
//!
//! Every navigation the engine is about to perform is classified here.
//! URLs with an external scheme (`tel:` by default) are handed to an
//! [`ExternalOpener`] and cancelled in the page. Anything whose scheme
//! cannot be read is cancelled as well.

use std::collections::HashSet;
use std::sync::Arc;

use miniapp_common::DEFAULT_EXTERNAL_SCHEMES;
use tracing::{debug, warn};
use url::Url;

// =============================================================================
// DECISIONS
// =============================================================================

/// Why a navigation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The URL was handed to the OS; the page itself never navigates.
    DelegatedExternally,
    /// No usable scheme could be read from the URL.
    Unclassifiable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Cancel(CancelReason),
}

impl PolicyDecision {
    pub fn is_allowed(self) -> bool {
        self == PolicyDecision::Allow
    }
}

/// Opens a URL outside the web surface (dialer, mail client, ...).
pub trait ExternalOpener: Send + Sync {
    fn open(&self, url: &Url);
}

/// Opener used when the host did not provide one: logs and drops.
#[derive(Debug, Default)]
pub struct UnhandledExternalOpener;

impl ExternalOpener for UnhandledExternalOpener {
    fn open(&self, url: &Url) {
        warn!(scheme = url.scheme(), "no external opener configured, dropping URL");
    }
}

// =============================================================================
// GATE
// =============================================================================

/// Decides, once per navigation attempt, whether the page may proceed.
///
/// Fails closed: a URL whose scheme cannot be read is cancelled.
pub struct NavigationPolicyGate {
    external_schemes: HashSet<String>,
    opener: Arc<dyn ExternalOpener>,
}

impl NavigationPolicyGate {
    pub fn new<I, S>(external_schemes: I, opener: Arc<dyn ExternalOpener>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            external_schemes: external_schemes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
            opener,
        }
    }

    pub fn with_default_schemes(opener: Arc<dyn ExternalOpener>) -> Self {
        Self::new(DEFAULT_EXTERNAL_SCHEMES.iter().copied(), opener)
    }

    pub fn is_external_scheme(&self, scheme: &str) -> bool {
        self.external_schemes
            .contains(&scheme.to_ascii_lowercase())
    }

    /// Classify a raw request URL as reported by the engine.
    pub fn classify(&self, request_url: &str) -> PolicyDecision {
        match Url::parse(request_url) {
            Ok(url) => self.classify_url(&url),
            Err(e) => {
                warn!(url = %request_url, error = %e, "navigation cancelled: unparseable URL");
                PolicyDecision::Cancel(CancelReason::Unclassifiable)
            }
        }
    }

    pub fn classify_url(&self, url: &Url) -> PolicyDecision {
        if self.external_schemes.contains(url.scheme()) {
            debug!(scheme = url.scheme(), "navigation delegated to OS");
            self.opener.open(url);
            return PolicyDecision::Cancel(CancelReason::DelegatedExternally);
        }
        debug!(url = %url, "navigation allowed");
        PolicyDecision::Allow
    }
}

// =============================================================================
// TESTS
// =============================================================================

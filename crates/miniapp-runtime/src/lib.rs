//! Runtime for hosting one mini-app bundle in a web surface.
//!
//! [`MiniAppRuntimeShell`] ties the pieces together: it owns the loopback
//! [`LocalContentServer`](miniapp_server::LocalContentServer), fetches the
//! entry document through a client that trusts only that server's own
//! certificate on loopback ([`TrustNegotiator`]), and routes navigation,
//! bridge traffic and affordance updates for the surface it drives. The
//! same client answers the page's subresource requests through
//! [`BundleResourceLoader`].

pub mod fetch;
pub mod resources;
pub mod shell;
pub mod trust;

pub use fetch::{ContentFetcher, Fetched};
pub use resources::BundleResourceLoader;
pub use shell::{AffordanceView, DefaultNavigationBar, MiniAppRuntimeShell, ShellConfig};
pub use trust::{
    is_loopback_host, Challenge, Credential, CredentialChallenge, Disposition, ProtectionSpace,
    ServerTrustChallenge, TrustNegotiator,
};

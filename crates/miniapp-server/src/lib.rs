//! Loopback content server for mini-app bundles.
//!
//! Serves one `(app_id, version_id)` bundle over HTTPS on a loopback
//! socket, under the URL convention
//! `{scheme}://{host}:{port}/{version_id}/{relative_path}`.
//! - Per-process self-issued certificate (see [`tls`])
//! - Traversal-safe resolution rooted at the bundle directory
//! - One task per connection, files streamed from disk

pub mod content;
pub mod server;
mod service;
pub mod tls;

pub use content::{BundleAsset, BundleProvider};
pub use server::{LocalContentServer, ServerHandle, ServerSettings, ServerState};
pub use tls::{CertificateFingerprint, CertificateMaterial};

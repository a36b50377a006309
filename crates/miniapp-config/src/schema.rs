//! Configuration schema types.
//!
//! All structs use `serde(default)` so partial configs work correctly.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use miniapp_common::{default_external_schemes, NavBarVisibility};
use serde::{Deserialize, Serialize};

/// Root configuration for one hosted mini-app instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MiniAppConfig {
    pub app: AppSection,
    pub navigation: NavigationConfig,
    pub server: ServerConfig,
    pub fetch: FetchConfig,
}

/// Which bundle to host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub app_id: String,
    pub version_id: String,
    pub title: String,
}

/// Navigation affordance and outbound navigation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub visibility: NavBarVisibility,
    /// URL schemes handed to the OS instead of loading in the page.
    pub external_schemes: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            visibility: NavBarVisibility::Never,
            external_schemes: default_external_schemes(),
        }
    }
}

/// Loopback content server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `{app_id}/{version_id}` bundle trees.
    pub bundles_dir: PathBuf,
    /// Bind address. Must be a loopback address.
    pub host: IpAddr,
    /// Bind port; 0 picks an ephemeral port.
    pub port: u16,
    /// Serve over TLS with a per-process self-issued certificate.
    pub secure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bundles_dir: default_bundles_dir(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            secure: true,
        }
    }
}

fn default_bundles_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("miniapp").join("bundles"))
        .unwrap_or_else(|| PathBuf::from("bundles"))
}

/// Initial entry-document fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u32,
    pub entry_document: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            entry_document: "index.html".into(),
        }
    }
}

//! Core TOML config loading: read from path, string, or platform default.

use crate::schema::MiniAppConfig;
use crate::validation;
use miniapp_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Parse config from TOML text.
///
/// Missing fields take serde defaults. Validation failures are logged,
/// not returned; call [`validation::validate`] to enforce them.
pub fn load_from_str(content: &str) -> Result<MiniAppConfig, ConfigError> {
    let config: MiniAppConfig = toml::from_str(content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }
    Ok(config)
}

/// Load config from a specific TOML file path.
pub fn load_from_path(path: &Path) -> Result<MiniAppConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let config = load_from_str(&content)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/miniapp/config.toml`
///
/// If the file does not exist, writes a commented template and returns defaults.
pub fn load_default() -> Result<MiniAppConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(MiniAppConfig::default())
        }
        Err(e) => Err(e),
    }
}

//! Full configuration validation.
//!
//! Each section has its own check; this orchestrator runs them all and
//! collects errors into a single `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use std::sync::OnceLock;

use miniapp_common::{AppId, ConfigError, VersionId};
use regex::Regex;

use crate::schema::MiniAppConfig;
use helpers::validate_range;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &MiniAppConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_app(&mut errors, config);
    validate_navigation(&mut errors, config);
    validate_server(&mut errors, config);
    validate_fetch(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_app(errors: &mut Vec<String>, config: &MiniAppConfig) {
    if !AppId::new(config.app.app_id.as_str()).is_path_safe() {
        errors.push(format!(
            "app.app_id = {:?} must be a non-empty single path segment",
            config.app.app_id
        ));
    }
    if !VersionId::new(config.app.version_id.as_str()).is_path_safe() {
        errors.push(format!(
            "app.version_id = {:?} must be a non-empty single path segment",
            config.app.version_id
        ));
    }
}

fn scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*$").expect("valid scheme regex"))
}

fn validate_navigation(errors: &mut Vec<String>, config: &MiniAppConfig) {
    for scheme in &config.navigation.external_schemes {
        if !scheme_pattern().is_match(scheme) {
            errors.push(format!(
                "navigation.external_schemes entry {scheme:?} is not a URL scheme"
            ));
        }
    }
}

fn validate_server(errors: &mut Vec<String>, config: &MiniAppConfig) {
    if !config.server.host.is_loopback() {
        errors.push(format!(
            "server.host = {} is not a loopback address",
            config.server.host
        ));
    }
    if config.server.bundles_dir.as_os_str().is_empty() {
        errors.push("server.bundles_dir is empty".into());
    }
}

fn validate_fetch(errors: &mut Vec<String>, config: &MiniAppConfig) {
    validate_range(errors, "fetch.timeout_secs", config.fetch.timeout_secs, 1, 300);
    let entry = &config.fetch.entry_document;
    if entry.is_empty() || entry.starts_with('/') || entry.split('/').any(|s| s == "..") {
        errors.push(format!(
            "fetch.entry_document = {entry:?} must be a relative path inside the bundle"
        ));
    }
}

//! Tests for the full validation pipeline.

use super::*;
use std::net::{IpAddr, Ipv4Addr};

fn valid_config() -> MiniAppConfig {
    let mut config = MiniAppConfig::default();
    config.app.app_id = "shop".into();
    config.app.version_id = "v1".into();
    config.server.bundles_dir = "/srv/bundles".into();
    config
}

#[test]
fn populated_config_validates() {
    assert!(validate(&valid_config()).is_ok());
}

#[test]
fn default_config_fails_on_empty_ids() {
    let err = validate(&MiniAppConfig::default()).unwrap_err().to_string();
    assert!(err.contains("app.app_id"));
    assert!(err.contains("app.version_id"));
}

#[test]
fn catches_traversal_in_version_id() {
    let mut config = valid_config();
    config.app.version_id = "../other".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("app.version_id"));
}

#[test]
fn catches_non_loopback_host() {
    let mut config = valid_config();
    config.server.host = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("server.host"));
}

#[test]
fn catches_timeout_out_of_range() {
    let mut config = valid_config();
    config.fetch.timeout_secs = 0;
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("fetch.timeout_secs"));

    config.fetch.timeout_secs = 301;
    assert!(validate(&config).is_err());
}

#[test]
fn catches_escaping_entry_document() {
    let mut config = valid_config();
    config.fetch.entry_document = "../secret.html".into();
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("fetch.entry_document"));

    config.fetch.entry_document = "/index.html".into();
    assert!(validate(&config).is_err());
}

#[test]
fn catches_malformed_scheme() {
    let mut config = valid_config();
    config.navigation.external_schemes = vec!["tel".into(), "not a scheme".into(), "9p".into()];
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("\"not a scheme\""));
    assert!(err.contains("\"9p\""));
    assert!(!err.contains("\"tel\""));
}

#[test]
fn collects_multiple_errors() {
    let mut config = valid_config();
    config.fetch.timeout_secs = 0;
    config.server.host = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let err = validate(&config).unwrap_err().to_string();
    assert!(err.contains("; "));
}

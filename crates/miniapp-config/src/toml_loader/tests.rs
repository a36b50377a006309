//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use miniapp_common::{ConfigError, NavBarVisibility};
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_miniapp_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[app]
app_id = "shop"
version_id = "2024.1"
title = "Shop"

[navigation]
visibility = "always"
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.app.app_id, "shop");
    assert_eq!(config.app.version_id, "2024.1");
    assert_eq!(config.navigation.visibility, NavBarVisibility::Always);
    // Defaults preserved
    assert_eq!(config.fetch.entry_document, "index.html");
    assert!(config.server.secure);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let result = load_from_str("this is not valid toml {{{");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn unknown_visibility_is_a_parse_error() {
    let result = load_from_str("[navigation]\nvisibility = \"sometimes\"\n");
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn invalid_values_are_returned_as_parsed() {
    let config = load_from_str("[fetch]\ntimeout_secs = 0\n").unwrap();
    assert_eq!(config.fetch.timeout_secs, 0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("miniapp").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.navigation.visibility, NavBarVisibility::Never);
    assert_eq!(config.fetch.timeout_secs, 30);
}

#[test]
fn default_config_toml_is_valid() {
    use super::template::default_config_toml;
    use crate::schema::MiniAppConfig;

    let config: MiniAppConfig = toml::from_str(&default_config_toml()).unwrap();
    assert_eq!(config.navigation.external_schemes, vec!["tel".to_string()]);
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("miniapp"));
        assert!(path_str.ends_with("config.toml"));
    }
}

//! Mini-app host configuration.
//!
//! TOML-based, with `serde(default)` on every section so a partial file
//! (often just `[app]`) is enough. Validation collects every problem into
//! one `ConfigError`.
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! let config = miniapp_config::load_from_path(Path::new("miniapp.toml"))
//!     .expect("failed to load config");
//! miniapp_config::validation::validate(&config).expect("invalid config");
//! println!("{}", config.app.app_id);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{AppSection, FetchConfig, MiniAppConfig, NavigationConfig, ServerConfig};
pub use toml_loader::{default_config_path, load_from_path, load_from_str};

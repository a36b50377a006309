use serde::{Deserialize, Serialize};

/// URL schemes handed to the OS instead of loaded in the page, when none
/// are configured.
pub const DEFAULT_EXTERNAL_SCHEMES: &[&str] = &["tel"];

/// Owned copy of [`DEFAULT_EXTERNAL_SCHEMES`] for configuration structs.
pub fn default_external_schemes() -> Vec<String> {
    DEFAULT_EXTERNAL_SCHEMES.iter().map(|s| s.to_string()).collect()
}

/// A history traversal the navigation affordance can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    Back,
    Forward,
}

/// When the back/forward affordance may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavBarVisibility {
    /// Never shown.
    #[default]
    Never,
    /// Shown while at least one direction is navigable.
    Auto,
    /// Always shown with both directions offered.
    Always,
}

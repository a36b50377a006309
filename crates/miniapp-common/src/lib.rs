pub mod errors;
pub mod id;
pub mod navigation;

pub use errors::{ConfigError, FetchError, MiniAppError, ServerError, SurfaceError};
pub use id::{new_correlation_id, AppId, MessageId, VersionId};
pub use navigation::{
    default_external_schemes, NavBarVisibility, NavigationAction, DEFAULT_EXTERNAL_SCHEMES,
};

pub type Result<T> = std::result::Result<T, MiniAppError>;

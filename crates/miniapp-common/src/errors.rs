use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures while bringing up the loopback content server.
///
/// All of these are fatal to the mini-app instance and are reported once
/// to whoever constructed it; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server start error: failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("trust setup error: {0}")]
    TrustSetup(String),

    #[error("invalid bundle identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("server already running on port {0}")]
    AlreadyRunning(u16),
}

/// Failures of the initial entry-document fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("fetch error: {0}")]
    Network(String),

    #[error("fetch error: request timed out")]
    Timeout,

    #[error("fetch error: server responded with status {0}")]
    Status(u16),

    #[error("trust error: {0}")]
    Trust(String),

    #[error("fetch error: invalid url {0}")]
    InvalidUrl(String),

    #[error("fetch error: cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface load error: {0}")]
    Load(String),

    #[error("surface script error: {0}")]
    Script(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MiniAppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! Error types for the HTTP server.

use hotreload_watch::WatchError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Live reload failed to start, or failed while running.
    #[error("Live reload error: {0}")]
    Watch(#[from] WatchError),

    /// The live reload endpoint path cannot be routed.
    #[error("Invalid live reload path {0:?}: must be a path below the site root")]
    InvalidWsPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

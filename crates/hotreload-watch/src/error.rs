//! Watcher error types.

/// Error returned by a change handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Watcher error.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// `startup` was called while a watch task is running.
    #[error("File watcher already started")]
    AlreadyStarted,
    /// `shutdown` was called without a running watch task.
    #[error("File watcher was not started")]
    NotStarted,
    /// `startup` was called on a watcher without paths.
    #[error("No paths to watch")]
    NoPaths,
    /// The filesystem event source could not be created or attached.
    #[error("Failed to watch files: {0}")]
    Notify(#[from] notify::Error),
    /// A watch or ignore pattern is not a valid glob.
    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    /// The filesystem event source stopped delivering events.
    #[error("Filesystem event source closed unexpectedly")]
    SourceClosed,
    /// The registered change handler failed.
    #[error("Change handler failed: {0}")]
    Handler(HandlerError),
    /// The background watch task panicked or was aborted.
    #[error("Watch task failed: {0}")]
    Panicked(String),
}

impl WatchError {
    /// Whether this error is caller misuse of the start/stop lifecycle.
    #[must_use]
    pub fn is_misuse(&self) -> bool {
        matches!(self, Self::AlreadyStarted | Self::NotStarted)
    }
}

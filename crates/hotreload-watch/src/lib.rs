//! Debounced filesystem watching for live reload.
//!
//! This crate provides [`Watcher`], a background task that observes one or
//! more directory trees and reports each burst of filesystem activity as a
//! single [`ChangeSet`] to a registered [`ChangeHandler`].
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use hotreload_watch::{ChangeSet, HandlerError, Watcher};
//!
//! let mut watcher = Watcher::new(vec![PathBuf::from("public")], |changes: ChangeSet| async move {
//!     tracing::info!(?changes, "Files changed");
//!     Ok::<(), HandlerError>(())
//! });
//!
//! watcher.startup()?;
//! // ... serve requests ...
//! watcher.shutdown().await?;
//! ```
//!
//! # Lifecycle
//!
//! - [`Watcher::startup`] fails with [`WatchError::AlreadyStarted`] while a
//!   task is running.
//! - [`Watcher::shutdown`] fails with [`WatchError::NotStarted`] when none is.
//! - A handler failure ends the background task; the error is logged and
//!   returned by the next `shutdown` call. [`Watcher::state`] reports
//!   [`WatcherState::Finished`] in the meantime.

mod change;
mod debouncer;
mod error;
mod filter;
mod watcher;

pub use change::{ChangeKind, ChangeSet};
pub use error::{HandlerError, WatchError};
pub use filter::DEFAULT_IGNORE_PATTERNS;
pub use watcher::{ChangeHandler, WatchOptions, Watcher, WatcherState};

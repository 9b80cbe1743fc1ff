//! Live reload manager.
//!
//! Owns the file watcher and the broadcaster, and wires them into an axum
//! router: file changes become `reload` frames on every live connection.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use hotreload_watch::{
    ChangeHandler, ChangeSet, HandlerError, WatchError, WatchOptions, Watcher, WatcherState,
};

use super::broadcast::Broadcaster;
use super::script::{client_script, script_tag};
use super::websocket::ws_handler;
use crate::error::ServerError;
use crate::middleware::inject::inject_live_reload;

/// File name of the client script, served below the WebSocket path.
const CLIENT_SCRIPT_NAME: &str = "client.js";

/// Default delay before a disconnected browser reconnects.
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

/// Live reload settings.
#[derive(Clone, Debug)]
pub struct LiveReloadOptions {
    /// Paths to watch for changes.
    pub watch_paths: Vec<PathBuf>,
    /// Endpoint path for live connections.
    pub ws_path: String,
    /// How long the browser waits before reconnecting.
    pub reconnect_interval: Duration,
    /// Aggregation and filtering options for the watcher.
    pub watch: WatchOptions,
}

impl Default for LiveReloadOptions {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            ws_path: hotreload_config::DEFAULT_WS_PATH.to_owned(),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            watch: WatchOptions::default(),
        }
    }
}

impl LiveReloadOptions {
    /// Build options from loaded configuration.
    ///
    /// Watch paths default to the site root directory.
    #[must_use]
    pub fn from_config(config: &hotreload_config::Config) -> Self {
        let live_reload = &config.live_reload;

        let mut watch = WatchOptions {
            debounce: Duration::from_millis(live_reload.debounce_ms),
            ..WatchOptions::default()
        };
        if let Some(patterns) = &live_reload.watch_patterns {
            watch.watch_patterns.clone_from(patterns);
        }
        if let Some(patterns) = &live_reload.ignore_patterns {
            watch.ignore_patterns.clone_from(patterns);
        }

        Self {
            watch_paths: live_reload.effective_watch_paths(&config.site_resolved.root_dir),
            ws_path: live_reload.ws_path.clone(),
            reconnect_interval: Duration::from_millis(live_reload.reconnect_interval_ms),
            watch,
        }
    }

    /// Watch `dir` if no watch paths are configured.
    #[must_use]
    pub fn with_default_watch_path(mut self, dir: impl Into<PathBuf>) -> Self {
        if self.watch_paths.is_empty() {
            self.watch_paths.push(dir.into());
        }
        self
    }
}

/// State shared by the live reload routes.
#[derive(Clone)]
pub(crate) struct LiveReloadState {
    pub(crate) broadcaster: Arc<Broadcaster>,
    script: Arc<str>,
}

/// Forwards every change set to the broadcaster.
struct ReloadHandler {
    broadcaster: Arc<Broadcaster>,
}

impl ChangeHandler for ReloadHandler {
    fn on_change(
        &self,
        changes: ChangeSet,
    ) -> impl Future<Output = Result<(), HandlerError>> + Send {
        let broadcaster = Arc::clone(&self.broadcaster);
        async move {
            tracing::info!(
                changes = %serde_json::to_string(&changes).unwrap_or_default(),
                "Files changed, reloading clients"
            );
            let report = broadcaster.notify_changed().await;
            tracing::debug!(
                delivered = report.delivered,
                dropped = report.dropped,
                "Reload broadcast finished"
            );
            Ok(())
        }
    }
}

/// Coordinates file watching and reload broadcasting.
pub struct LiveReload {
    watcher: Watcher<ReloadHandler>,
    broadcaster: Arc<Broadcaster>,
    ws_path: String,
    script_path: String,
    script: Arc<str>,
}

impl LiveReload {
    /// Create a stopped controller.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidWsPath`] unless `ws_path` is an absolute
    /// path below the site root, such as `/__hotreload__`.
    pub fn new(options: LiveReloadOptions) -> Result<Self, ServerError> {
        if !options.ws_path.starts_with('/') || options.ws_path.trim_matches('/').is_empty() {
            return Err(ServerError::InvalidWsPath(options.ws_path));
        }

        let broadcaster = Arc::new(Broadcaster::new());
        let handler = ReloadHandler {
            broadcaster: Arc::clone(&broadcaster),
        };
        let watcher = Watcher::with_options(options.watch_paths, handler, options.watch);

        let ws_path = options.ws_path;
        let script_path = format!("{}/{CLIENT_SCRIPT_NAME}", ws_path.trim_end_matches('/'));
        let script = client_script(&ws_path, options.reconnect_interval).into();

        Ok(Self {
            watcher,
            broadcaster,
            ws_path,
            script_path,
            script,
        })
    }

    /// Start watching for changes.
    ///
    /// # Errors
    ///
    /// Same as [`Watcher::startup`].
    pub fn startup(&mut self) -> Result<(), WatchError> {
        self.watcher.startup()
    }

    /// Stop watching and disconnect all clients.
    ///
    /// # Errors
    ///
    /// Same as [`Watcher::shutdown`]. Clients are disconnected even when the
    /// watcher reports a deferred failure.
    pub async fn shutdown(&mut self) -> Result<(), WatchError> {
        let result = self.watcher.shutdown().await;
        if !matches!(result, Err(WatchError::NotStarted)) {
            self.broadcaster.close_all().await;
        }
        result
    }

    /// Lifecycle state of the underlying watcher.
    pub fn state(&self) -> WatcherState {
        self.watcher.state()
    }

    /// Broadcaster shared with the WebSocket endpoint.
    #[must_use]
    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Endpoint path for live connections.
    #[must_use]
    pub fn ws_path(&self) -> &str {
        &self.ws_path
    }

    /// Path the client script is served from.
    #[must_use]
    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    /// Routes for the client script and the live connection endpoint.
    pub fn routes(&self) -> Router {
        let state = LiveReloadState {
            broadcaster: Arc::clone(&self.broadcaster),
            script: Arc::clone(&self.script),
        };

        Router::new()
            .route(&self.script_path, get(serve_client_script))
            .route(&self.ws_path, get(ws_handler))
            .with_state(state)
    }

    /// Inject the client script into `app`'s HTML responses and add the live
    /// reload routes.
    pub fn attach(&self, app: Router) -> Router {
        let fragment: Arc<str> = script_tag(&self.script_path).into();

        app.layer(axum::middleware::from_fn_with_state(
            fragment,
            inject_live_reload,
        ))
        .merge(self.routes())
    }
}

/// Serve the client script.
async fn serve_client_script(State(state): State<LiveReloadState>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        String::from(&*state.script),
    )
}

//! Live reload HTTP server.
//!
//! This crate serves a directory of pages during development and reloads
//! connected browsers when files change:
//! - Static files from the site directory, re-read on every request
//! - A client script injected into every HTML page
//! - WebSocket endpoint broadcasting `reload` to connected pages
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use hotreload_server::{LiveReloadOptions, ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         host: "127.0.0.1".to_owned(),
//!         port: 7878,
//!         root_dir: PathBuf::from("public"),
//!         live_reload: Some(LiveReloadOptions::default()),
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (hotreload-server)
//!    ▲                   │
//!    │                   ├─► Static files (tower-http ServeDir) + script injection
//!    │                   │
//!    └──── "reload" ─────┴─► WebSocket endpoint ◄── Broadcaster ◄── Watcher (notify)
//! ```

mod app;
mod error;
mod live_reload;
mod middleware;

use std::path::PathBuf;
use std::sync::Arc;

pub use app::create_router;
pub use error::ServerError;
pub use live_reload::{
    BroadcastReport, Broadcaster, Connection, ConnectionError, LiveReload, LiveReloadOptions,
    RELOAD_MESSAGE,
};
pub use middleware::inject::{Injection, inject_script};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory pages are served from.
    pub root_dir: PathBuf,
    /// Live reload settings (`None` disables live reload).
    pub live_reload: Option<LiveReloadOptions>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
            root_dir: PathBuf::from("public"),
            live_reload: Some(LiveReloadOptions::default()),
        }
    }
}

/// Run the server until Ctrl-C.
///
/// Live reload watches the configured paths, or `root_dir` when none are
/// set. On shutdown, clients are disconnected and the watcher is stopped.
///
/// # Errors
///
/// Returns an error if the server fails to start, or if the watcher failed
/// while the server was running.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let mut live_reload = config
        .live_reload
        .map(|options| LiveReload::new(options.with_default_watch_path(&config.root_dir)))
        .transpose()?;

    if let Some(live_reload) = live_reload.as_mut() {
        live_reload.startup()?;
    }

    let app = create_router(&config.root_dir, live_reload.as_ref());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        root = %config.root_dir.display(),
        "Starting server"
    );

    let broadcaster = live_reload.as_ref().map(LiveReload::broadcaster);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(broadcaster))
        .await;

    // Stop watching even if serving failed, so deferred errors are reported
    let stopped = match live_reload.as_mut() {
        Some(live_reload) => live_reload.shutdown().await,
        None => Ok(()),
    };

    served?;
    stopped?;
    Ok(())
}

/// Wait for shutdown signal (Ctrl-C), then disconnect live clients.
///
/// Open WebSockets would otherwise keep graceful shutdown waiting.
async fn shutdown_signal(broadcaster: Option<Arc<Broadcaster>>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");

    if let Some(broadcaster) = broadcaster {
        broadcaster.close_all().await;
    }
}

/// Create server configuration from hotreload config.
#[must_use]
pub fn server_config_from_config(config: &hotreload_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root_dir: config.site_resolved.root_dir.clone(),
        live_reload: config
            .live_reload
            .enabled
            .then(|| LiveReloadOptions::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_server_config_from_config() {
        let mut config = hotreload_config::Config::default();
        config.server.port = 9000;
        config.site_resolved.root_dir = PathBuf::from("/srv/site");

        let server_config = server_config_from_config(&config);

        assert_eq!(server_config.port, 9000);
        assert_eq!(server_config.root_dir, PathBuf::from("/srv/site"));
        let live_reload = server_config.live_reload.unwrap();
        assert_eq!(live_reload.watch_paths, vec![PathBuf::from("/srv/site")]);
    }

    #[test]
    fn test_server_config_live_reload_disabled() {
        let mut config = hotreload_config::Config::default();
        config.live_reload.enabled = false;

        assert!(server_config_from_config(&config).live_reload.is_none());
    }
}

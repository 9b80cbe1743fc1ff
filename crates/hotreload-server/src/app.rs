//! Router construction.
//!
//! Serves the site directory, with the live reload routes and script
//! injection layered on when enabled.

use std::path::Path;

use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::live_reload::LiveReload;

/// Create the application router.
///
/// Files are read from `root_dir` on every request, so edits are visible on
/// the next page load. Directory requests fall back to `index.html`.
pub fn create_router(root_dir: &Path, live_reload: Option<&LiveReload>) -> Router {
    let site = Router::new()
        .fallback_service(ServeDir::new(root_dir).append_index_html_on_directories(true));

    let router = match live_reload {
        Some(live_reload) => live_reload.attach(site),
        None => site,
    };

    router.layer(TraceLayer::new_for_http())
}

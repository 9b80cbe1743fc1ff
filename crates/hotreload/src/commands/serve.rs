//! `hotreload serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use hotreload_config::{CliSettings, Config};
use hotreload_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover hotreload.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to serve (overrides config).
    #[arg(short, long)]
    root_dir: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long, env = "HOTRELOAD_HOST")]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long, env = "HOTRELOAD_PORT")]
    port: Option<u16>,

    /// Path to watch for changes, repeatable (default: the served directory).
    #[arg(short, long = "watch", value_name = "PATH")]
    watch: Vec<PathBuf>,

    /// Endpoint path for live reload connections (overrides config).
    #[arg(long)]
    ws_path: Option<String>,

    /// Milliseconds a browser waits before reconnecting (overrides config).
    #[arg(long)]
    reconnect_interval_ms: Option<u64>,

    /// Enable verbose output (request and reload logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable live reload (default: enabled).
    #[arg(long)]
    live_reload: Option<bool>,

    /// Disable live reload.
    #[arg(long, conflicts_with = "live_reload")]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;

        output.highlight(&format!(
            "Serving {} on http://{}:{}",
            config.site_resolved.root_dir.display(),
            config.server.host,
            config.server.port
        ));
        if let Some(path) = &config.config_path {
            output.info(&format!("Config: {}", path.display()));
        }

        if config.live_reload.enabled {
            let watched: Vec<String> = config
                .live_reload
                .effective_watch_paths(&config.site_resolved.root_dir)
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            output.info(&format!("Live reload: watching {}", watched.join(", ")));
        } else {
            output.info("Live reload: disabled");
        }

        run_server(server_config_from_config(&config)).await?;

        Ok(())
    }

    /// Build config overrides from the parsed arguments.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root_dir: self.root_dir.clone(),
            live_reload_enabled: self.resolve_live_reload_enabled(),
            watch_paths: (!self.watch.is_empty()).then(|| self.watch.clone()),
            ws_path: self.ws_path.clone(),
            reconnect_interval_ms: self.reconnect_interval_ms,
        }
    }

    /// Resolve `live_reload_enabled` from --live-reload/--no-live-reload flags.
    fn resolve_live_reload_enabled(&self) -> Option<bool> {
        self.no_live_reload.then_some(false).or(self.live_reload)
    }
}

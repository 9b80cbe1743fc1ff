//! Configuration management for hotreload.
//!
//! Parses `hotreload.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `site.root_dir`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the directory pages are served from.
    pub root_dir: Option<PathBuf>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
    /// Override watched paths.
    pub watch_paths: Option<Vec<PathBuf>>,
    /// Override the live connection endpoint path.
    pub ws_path: Option<String>,
    /// Override the client reconnect interval.
    pub reconnect_interval_ms: Option<u64>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "hotreload.toml";

/// Default live connection endpoint.
pub const DEFAULT_WS_PATH: &str = "/__hotreload__";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Site configuration (paths are relative strings from TOML).
    site: SiteConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,

    /// Resolved site configuration (set after loading).
    #[serde(skip)]
    pub site_resolved: SiteConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7878,
        }
    }
}

/// Raw site configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SiteConfigRaw {
    root_dir: Option<String>,
}

/// Resolved site configuration with absolute paths.
#[derive(Debug, Default)]
pub struct SiteConfig {
    /// Directory pages are served from.
    pub root_dir: PathBuf,
}

/// Live reload configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Paths to watch. Empty means the site root directory.
    ///
    /// Relative paths are resolved against the config file directory.
    pub watch_paths: Vec<PathBuf>,
    /// How long the browser waits before reconnecting, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Endpoint path for live connections.
    pub ws_path: String,
    /// Quiet period before a batch of changes is reported, in milliseconds.
    pub debounce_ms: u64,
    /// Glob patterns of files to watch (default: everything).
    pub watch_patterns: Option<Vec<String>>,
    /// Glob patterns of files to ignore (default: VCS and editor files).
    pub ignore_patterns: Option<Vec<String>>,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_paths: Vec::new(),
            reconnect_interval_ms: 1000,
            ws_path: DEFAULT_WS_PATH.to_owned(),
            debounce_ms: 50,
            watch_patterns: None,
            ignore_patterns: None,
        }
    }
}

impl LiveReloadConfig {
    /// Watched paths, falling back to `root_dir` when none are configured.
    #[must_use]
    pub fn effective_watch_paths(&self, root_dir: &Path) -> Vec<PathBuf> {
        if self.watch_paths.is_empty() {
            vec![root_dir.to_path_buf()]
        } else {
            self.watch_paths.clone()
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`HOST`} environment variable not found").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a numeric field to be non-zero.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `hotreload.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing CLI
    /// arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing fails,
    /// or the final configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(root_dir) = &settings.root_dir {
            self.site_resolved.root_dir.clone_from(root_dir);
        }
        if let Some(enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = enabled;
        }
        if let Some(watch_paths) = &settings.watch_paths {
            self.live_reload.watch_paths.clone_from(watch_paths);
        }
        if let Some(ws_path) = &settings.ws_path {
            self.live_reload.ws_path.clone_from(ws_path);
        }
        if let Some(interval) = settings.reconnect_interval_ms {
            self.live_reload.reconnect_interval_ms = interval;
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            site: SiteConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            site_resolved: SiteConfig {
                root_dir: base.join("public"),
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically by [`Config::load`] after CLI settings are applied.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_live_reload()?;
        Ok(())
    }

    /// Validate server configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;

        // Port 0 is technically valid (OS assigns a random port), but it's
        // unlikely to be intentional in a config file
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate live reload configuration.
    fn validate_live_reload(&self) -> Result<(), ConfigError> {
        let live_reload = &self.live_reload;

        if !live_reload.ws_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "live_reload.ws_path must start with /".to_owned(),
            ));
        }
        if live_reload.ws_path.len() < 2 {
            return Err(ConfigError::Validation(
                "live_reload.ws_path cannot be the site root".to_owned(),
            ));
        }
        require_positive(
            live_reload.reconnect_interval_ms,
            "live_reload.reconnect_interval_ms",
        )?;
        require_positive(live_reload.debounce_ms, "live_reload.debounce_ms")?;

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref root_dir) = self.site.root_dir {
            self.site.root_dir = Some(expand::expand_env(root_dir, "site.root_dir")?);
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.site_resolved = SiteConfig {
            root_dir: config_dir.join(self.site.root_dir.as_deref().unwrap_or("public")),
        };

        self.live_reload.watch_paths = self
            .live_reload
            .watch_paths
            .iter()
            .map(|p| config_dir.join(p))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7878);
        assert_eq!(config.site_resolved.root_dir, PathBuf::from("/test/public"));
        assert!(config.live_reload.enabled);
        assert_eq!(config.live_reload.ws_path, "/__hotreload__");
        assert_eq!(config.live_reload.reconnect_interval_ms, 1000);
        assert_eq!(config.live_reload.debounce_ms, 50);
        assert!(config.live_reload.watch_paths.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 7878);
    }

    #[test]
    fn test_parse_server_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_parse_live_reload_config() {
        let toml = r#"
[live_reload]
enabled = false
watch_paths = ["templates", "static"]
reconnect_interval_ms = 2500
ws_path = "/livereload"
watch_patterns = ["**/*.html"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.live_reload.enabled);
        assert_eq!(
            config.live_reload.watch_paths,
            vec![PathBuf::from("templates"), PathBuf::from("static")]
        );
        assert_eq!(config.live_reload.reconnect_interval_ms, 2500);
        assert_eq!(config.live_reload.ws_path, "/livereload");
        assert_eq!(
            config.live_reload.watch_patterns,
            Some(vec!["**/*.html".to_owned()])
        );
        assert_eq!(config.live_reload.ignore_patterns, None);
    }

    #[test]
    fn test_resolve_paths() {
        let toml = r#"
[site]
root_dir = "dist"

[live_reload]
watch_paths = ["templates", "/abs/assets"]
"#;
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.site_resolved.root_dir, PathBuf::from("/project/dist"));
        assert_eq!(
            config.live_reload.watch_paths,
            vec![
                PathBuf::from("/project/templates"),
                PathBuf::from("/abs/assets")
            ]
        );
    }

    #[test]
    fn test_effective_watch_paths_default_to_root() {
        let config = Config::default_with_base(Path::new("/test"));

        assert_eq!(
            config
                .live_reload
                .effective_watch_paths(&config.site_resolved.root_dir),
            vec![PathBuf::from("/test/public")]
        );
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            port: Some(9000),
            root_dir: Some(PathBuf::from("/custom/site")),
            live_reload_enabled: Some(false),
            watch_paths: Some(vec![PathBuf::from("/custom/templates")]),
            ws_path: Some("/ws".to_owned()),
            reconnect_interval_ms: Some(250),
            ..Default::default()
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1"); // Unchanged
        assert_eq!(config.site_resolved.root_dir, PathBuf::from("/custom/site"));
        assert!(!config.live_reload.enabled);
        assert_eq!(
            config.live_reload.watch_paths,
            vec![PathBuf::from("/custom/templates")]
        );
        assert_eq!(config.live_reload.ws_path, "/ws");
        assert_eq!(config.live_reload.reconnect_interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.server.port = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_validate_rejects_relative_ws_path() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.ws_path = "livereload".to_owned();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("ws_path"));
    }

    #[test]
    fn test_validate_rejects_root_ws_path() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.ws_path = "/".to_owned();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_with_base(Path::new("/test"));
        config.live_reload.debounce_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/hotreload.toml")), None);

        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_from_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
[server]
host = "${HOTRELOAD_TEST_UNSET_HOST:-localhost}"

[site]
root_dir = "www"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path), None).unwrap();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.site_resolved.root_dir, dir.path().join("www"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_validates_after_cli_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "").unwrap();
        let overrides = CliSettings {
            ws_path: Some("no-slash".to_owned()),
            ..Default::default()
        };

        let result = Config::load(Some(&path), Some(&overrides));

        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[server\nport = ").unwrap();

        let result = Config::load(Some(&path), None);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

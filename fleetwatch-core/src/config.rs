//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/fleetwatch/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/fleetwatch/` (~/.config/fleetwatch/)
//! - State/Logs: `$XDG_STATE_HOME/fleetwatch/` (~/.local/state/fleetwatch/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `watch.root`
pub const ROOT_ENV_VAR: &str = "FLEETWATCH_ROOT";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Expands a leading `~` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Transcript discovery settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Session lifecycle timers
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Broadcast sink configuration
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where transcripts live and how often to rescan for them
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Root directory to watch recursively (defaults to ~/.claude)
    pub root: Option<PathBuf>,

    /// Transcript file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Seconds between full rescans of the root directory
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,

    /// Classify lines piped on stdin as an extra session
    #[serde(default = "default_read_stdin")]
    pub read_stdin: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: None,
            extension: default_extension(),
            rescan_interval_secs: default_rescan_interval(),
            read_stdin: default_read_stdin(),
        }
    }
}

impl WatchConfig {
    /// Resolve the root directory.
    ///
    /// Precedence: `FLEETWATCH_ROOT`, then `watch.root`, then `~/.claude`.
    pub fn resolved_root(&self) -> PathBuf {
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return expand_home(Path::new(&root));
        }
        match &self.root {
            Some(root) => expand_home(root),
            None => home_dir().join(".claude"),
        }
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }
}

fn default_extension() -> String {
    "jsonl".to_string()
}

fn default_rescan_interval() -> u64 {
    5
}

fn default_read_stdin() -> bool {
    true
}

/// Idle detection and summary timers
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Seconds without activity before a session is marked idle
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// Seconds between idle sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds between fleet summaries
    #[serde(default = "default_summary_interval")]
    pub summary_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold(),
            sweep_interval_secs: default_sweep_interval(),
            summary_interval_secs: default_summary_interval(),
        }
    }
}

impl SessionConfig {
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }
}

fn default_idle_threshold() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_summary_interval() -> u64 {
    30
}

/// Broadcast sink configuration
///
/// When enabled, events are posted to a realtime broadcast endpoint.
/// Otherwise they are written to stdout as JSON lines.
#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    /// Enable/disable the realtime sink
    #[serde(default)]
    pub enabled: bool,

    /// Realtime server URL (e.g., `https://xyz.supabase.co`)
    pub server_url: Option<String>,

    /// API key sent as `apikey` and bearer token
    pub api_key: Option<String>,

    /// Channel (topic) events are broadcast on
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Event name attached to every broadcast message
    #[serde(default = "default_event_name")]
    pub event_name: String,

    /// Minimum milliseconds between two publishes
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_broadcast_timeout")]
    pub timeout_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            api_key: None,
            channel: default_channel(),
            event_name: default_event_name(),
            min_interval_ms: default_min_interval(),
            timeout_secs: default_broadcast_timeout(),
        }
    }
}

impl BroadcastConfig {
    /// Check if the realtime sink is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.min_interval_ms == 0 {
            return Err(Error::Config(
                "broadcast.min_interval_ms must be greater than 0".to_string(),
            ));
        }

        if !self.enabled {
            return Ok(());
        }

        if self.server_url.is_none() {
            return Err(Error::Config(
                "broadcast.server_url is required when broadcast is enabled".to_string(),
            ));
        }
        if self.api_key.is_none() {
            return Err(Error::Config(
                "broadcast.api_key is required when broadcast is enabled".to_string(),
            ));
        }
        if self.channel.trim().is_empty() {
            return Err(Error::Config(
                "broadcast.channel must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_channel() -> String {
    "fleet-stream".to_string()
}

fn default_event_name() -> String {
    "fleet-event".to_string()
}

fn default_min_interval() -> u64 {
    200
}

fn default_broadcast_timeout() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        let timers = [
            ("watch.rescan_interval_secs", self.watch.rescan_interval_secs),
            ("sessions.idle_threshold_secs", self.sessions.idle_threshold_secs),
            ("sessions.sweep_interval_secs", self.sessions.sweep_interval_secs),
            ("sessions.summary_interval_secs", self.sessions.summary_interval_secs),
        ];
        if let Some((name, _)) = timers.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::Config(format!("{} must be greater than 0", name)));
        }

        if self.watch.extension.trim_start_matches('.').is_empty() {
            return Err(Error::Config("watch.extension must not be empty".to_string()));
        }

        self.broadcast.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/fleetwatch/config.toml` (~/.config/fleetwatch/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("fleetwatch").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/fleetwatch/` (~/.local/state/fleetwatch/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("fleetwatch")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("fleetwatch.log")
    }
}

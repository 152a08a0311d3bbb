//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$CLICKGUARD_CONFIG` (environment variable)
//! 2. `~/.config/clickguard/config.toml` (Linux/macOS)
//!    `%APPDATA%\clickguard\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::rewrite::classifier::SkipPattern;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Link rewriting settings.
    pub rewrite: RewriteConfig,
    /// Sender allow-list.
    pub senders: SendersConfig,
    /// Content store used by the gateway.
    pub store: StoreConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override directory for the log file.
    pub log_dir: Option<PathBuf>,
}

/// Link rewriting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    /// Host of the click-time checking service.
    pub check_host: String,
    /// Extra links to leave alone, on top of the built-in conferencing table.
    pub skip_patterns: Vec<SkipPattern>,
}

/// Senders whose mail is delivered without inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendersConfig {
    /// Envelope sender addresses, compared case-insensitively.
    pub safe: Vec<String>,
}

/// Content store settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for stored messages.
    pub root: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            log_dir: None,
        }
    }
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            check_host: "check.example.com".to_string(),
            skip_patterns: Vec::new(),
        }
    }
}

impl Default for SendersConfig {
    fn default() -> Self {
        Self {
            safe: vec!["noreply@example.com".to_string()],
        }
    }
}

impl SendersConfig {
    /// Lower-cased allow-list for membership checks.
    pub fn safe_set(&self) -> HashSet<String> {
        self.safe
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    }
}

/// Load configuration from an explicit file.
///
/// A missing file yields the defaults silently; read and parse errors are
/// logged and also yield the defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to `path`, or to the standard location.
pub fn save_config(config: &Config, path: Option<&Path>) -> anyhow::Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("CLICKGUARD_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("clickguard").join("config.toml"))
}

/// Return the directory holding the log file.
pub fn log_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.log_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("clickguard")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    log_dir(config).join("clickguard.log")
}

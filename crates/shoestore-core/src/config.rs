//! Configuration resolution for shoestore.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/shoestore/settings.json)
//! 3. Project config (.shoestore/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete shoestore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Local mock store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// SQLite file backing the mock store. `None` means the platform default.
    pub database_path: Option<PathBuf>,
}

/// Session lifecycle timings. All durations are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Simulated network latency of the mock credential exchange.
    pub sign_in_latency_ms: u64,
    /// Lifetime of issued access tokens (seconds).
    pub session_ttl_secs: u64,
    /// Per-attempt profile fetch timeout after an interactive login.
    pub manual_fetch_timeout_ms: u64,
    /// Extra profile fetch attempts after an interactive login.
    pub manual_fetch_retries: u32,
    /// Per-attempt profile fetch timeout for restored sessions.
    pub auto_fetch_timeout_ms: u64,
    /// Extra profile fetch attempts for restored sessions.
    pub auto_fetch_retries: u32,
    /// Fixed wait between profile fetch attempts.
    pub retry_backoff_ms: u64,
    /// Upper bound on how long the loading flag may stay set.
    pub loading_ceiling_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            sign_in_latency_ms: 400,
            session_ttl_secs: 3600,
            manual_fetch_timeout_ms: 6_000,
            manual_fetch_retries: 2,
            auto_fetch_timeout_ms: 3_000,
            auto_fetch_retries: 1,
            retry_backoff_ms: 1_000,
            loading_ceiling_ms: 12_000,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        config = load_config_file(&global_path)?;
    }

    if let Some(dir) = project_dir {
        let project_path = dir.join(".shoestore").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Base directory for shoestore's own files (`$XDG_CONFIG_HOME/shoestore`).
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".shoestore"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/shoestore"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("shoestore"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.json"))
}

/// Default location of the mock store database.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("mock.db"))
}

impl Config {
    /// Resolved database path: explicit setting first, then the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.store.database_path.clone().or_else(database_path)
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.store.database_path.is_some() {
        base.store.database_path = overlay.store.database_path;
    }
    base.auth = overlay.auth;
    base.log_level = overlay.log_level;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("SHOESTORE_DB_PATH") {
        config.store.database_path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("SHOESTORE_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Ok(val) = std::env::var("SHOESTORE_SIGN_IN_LATENCY_MS")
        && let Ok(n) = val.parse()
    {
        config.auth.sign_in_latency_ms = n;
    }
    if let Ok(val) = std::env::var("SHOESTORE_LOADING_CEILING_MS")
        && let Ok(n) = val.parse()
    {
        config.auth.loading_ceiling_ms = n;
    }
}

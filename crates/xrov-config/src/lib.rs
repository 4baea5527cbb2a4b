//! # xrov-config
//!
//! Configuration management for the XR overlay layer.
//!
//! Loads configuration from:
//! 1. `~/.xr_overlay/config.toml` (global)
//! 2. `.xr_overlay/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

/// Global config instance
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::load().unwrap_or_default()));

/// Get global config (read-only)
pub fn config() -> std::sync::RwLockReadGuard<'static, Config> {
    CONFIG.read().unwrap_or_else(PoisonError::into_inner)
}

/// Reload config from disk
pub fn reload() -> Result<(), ConfigError> {
    let new_config = Config::load()?;
    *CONFIG.write().unwrap_or_else(PoisonError::into_inner) = new_config;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub sync: SyncConfig,
    pub events: EventConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        let mut config = Self::load_from(global.as_deref(), Path::new(".xr_overlay/config.toml"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load and merge a global and a project file. Missing files are skipped.
    pub fn load_from(global_path: Option<&Path>, project_path: &Path) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();

        if let Some(global_path) = global_path {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                merged = toml::from_str(&contents)?;
            }
        }

        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let contents = std::fs::read_to_string(project_path)?;
            let project: toml::Table = toml::from_str(&contents)?;
            merge_tables(&mut merged, project);
        }

        Ok(toml::Value::Table(merged).try_into::<Config>()?)
    }

    /// Global config path: ~/.xr_overlay/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".xr_overlay/config.toml"))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (environment or test fixture).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("XROV_SYNCHRONIZE_EVERY_CALL") {
            self.sync.synchronize_every_call = matches!(value.as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(size) = lookup("XROV_SHMEM_SIZE").and_then(|s| s.parse().ok()) {
            self.rpc.shmem_size = size;
        }
        if let Some(ms) = lookup("XROV_RESPONSE_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.rpc.response_timeout_ms = ms;
        }
        if let Some(level) = lookup("XROV_LOG") {
            self.logging.level = level;
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Shared-memory RPC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// Size of each overlay connection's shared region in bytes
    pub shmem_size: usize,
    /// Directory holding the backing files of shared regions
    pub shmem_dir: PathBuf,
    /// Give up waiting for the main process after this many ms (0 = wait forever)
    pub response_timeout_ms: u64,
}

impl RpcConfig {
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_timeout_ms > 0).then(|| Duration::from_millis(self.response_timeout_ms))
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            shmem_size: 1024 * 1024,
            shmem_dir: std::env::temp_dir(),
            response_timeout_ms: 0,
        }
    }
}

/// Downchain serialization
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Hold one process-wide recursive lock around every runtime call
    pub synchronize_every_call: bool,
}

/// Per-overlay event and layer limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventConfig {
    pub max_queued_events_per_overlay: usize,
    pub max_overlay_layers: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_queued_events_per_overlay: 16,
            max_overlay_layers: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// error, warn, info, debug or trace
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rpc.shmem_size, 1024 * 1024);
        assert_eq!(config.rpc.response_timeout(), None);
        assert!(!config.sync.synchronize_every_call);
        assert_eq!(config.events.max_queued_events_per_overlay, 16);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml().unwrap();
        assert!(toml_str.contains("[rpc]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("synchronize_every_call = false"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("XROV_SYNCHRONIZE_EVERY_CALL", "1"),
            ("XROV_SHMEM_SIZE", "65536"),
            ("XROV_RESPONSE_TIMEOUT_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.sync.synchronize_every_call);
        assert_eq!(config.rpc.shmem_size, 65536);
        assert_eq!(config.rpc.response_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "XROV_SHMEM_SIZE").then(|| "lots".to_string()));
        assert_eq!(config.rpc.shmem_size, 1024 * 1024);
    }
}

//! Configuration management for the directory sync service.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use dirsync_server::config::SyncConfig;
//!
//! // Load from file with env overrides
//! let config = SyncConfig::load("dirsync.yaml")?;
//!
//! // Or load from environment only
//! let config = SyncConfig::from_env()?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use dirsync_domain::{HierarchyCacheConfig, ParentStrategy, ScopeSettings};
use serde::{Deserialize, Serialize};

use crate::pool::QueueMode;

/// Environment variable prefix, e.g. `DIRSYNC_LEASE__STALENESS_WINDOW_MS`.
const ENV_PREFIX: &str = "DIRSYNC";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SyncConfig {
    /// Per-scope resolution settings, keyed by scope name
    #[serde(default)]
    pub scopes: HashMap<String, ScopeConfig>,

    /// Hierarchy cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// Lease settings
    #[serde(default)]
    pub lease: LeaseSettings,

    /// Batch dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Resolution settings for one scope.
///
/// # Example YAML Configuration
///
/// ```yaml
/// scopes:
///   corp:
///     parent_strategy: dn
///     structure_units: [Ops, Sales]
///     manager_suffix: _MGR
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScopeConfig {
    /// Parent strategy: "dn" or "attribute"
    #[serde(default = "default_parent_strategy")]
    pub parent_strategy: String,

    /// Group names treated as organizational structure units
    #[serde(default)]
    pub structure_units: Vec<String>,

    /// Suffix used to derive manager group names
    #[serde(default)]
    pub manager_suffix: Option<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            parent_strategy: default_parent_strategy(),
            structure_units: Vec::new(),
            manager_suffix: None,
        }
    }
}

fn default_parent_strategy() -> String {
    "dn".to_string()
}

impl ScopeConfig {
    /// Converts to domain settings. Call after [`SyncConfig::validate`].
    pub fn to_settings(&self) -> ScopeSettings {
        let strategy = match self.parent_strategy.to_lowercase().as_str() {
            "attribute" => ParentStrategy::ByAttribute,
            _ => ParentStrategy::ByDn,
        };
        ScopeSettings {
            parent_strategy: strategy,
            structure_units: self.structure_units.clone(),
            manager_suffix: self.manager_suffix.clone(),
        }
    }
}

/// Hierarchy cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Maximum main-parent hops followed during traversal
    #[serde(default = "default_max_hierarchy_depth")]
    pub max_hierarchy_depth: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: default_max_hierarchy_depth(),
        }
    }
}

fn default_max_hierarchy_depth() -> u32 {
    25
}

/// Lease settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LeaseSettings {
    /// Minimum time since the last refresh before an identity is refreshed again
    #[serde(default = "default_staleness_window_ms")]
    pub staleness_window_ms: u64,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            staleness_window_ms: default_staleness_window_ms(),
        }
    }
}

fn default_staleness_window_ms() -> u64 {
    // 15 minutes
    15 * 60 * 1000
}

/// Batch dispatcher settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DispatcherSettings {
    /// Name of the worker pool used for sync packages
    #[serde(default = "default_pool_name")]
    pub pool_name: String,

    /// Fixed number of pool workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Preferred number of items per package
    #[serde(default = "default_recommended_package_size")]
    pub recommended_package_size: usize,

    /// Base sleep between monitor passes, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for the scaled monitor sleep, in milliseconds
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// Pool queue: "unbounded" or "rendezvous"
    #[serde(default = "default_queue_mode")]
    pub queue_mode: String,

    /// Optional overall deadline for one dispatch, in seconds
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            pool_name: default_pool_name(),
            max_workers: default_max_workers(),
            recommended_package_size: default_recommended_package_size(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            queue_mode: default_queue_mode(),
            deadline_secs: None,
        }
    }
}

fn default_pool_name() -> String {
    "identity-sync".to_string()
}

fn default_max_workers() -> usize {
    10
}

fn default_recommended_package_size() -> usize {
    50
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_poll_interval_ms() -> u64 {
    5_000
}

fn default_queue_mode() -> String {
    "rendezvous".to_string()
}

impl DispatcherSettings {
    /// Parsed queue mode. Call after [`SyncConfig::validate`].
    pub fn queue_mode(&self) -> QueueMode {
        match self.queue_mode.to_lowercase().as_str() {
            "unbounded" => QueueMode::Unbounded,
            _ => QueueMode::Rendezvous,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl SyncConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `DIRSYNC_` and use `__` as separator,
    /// e.g. `DIRSYNC_DISPATCHER__MAX_WORKERS=4` overrides `dispatcher.max_workers`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&SyncConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let sync_config: SyncConfig = config.try_deserialize()?;
        sync_config.validate()?;

        Ok(sync_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&SyncConfig::default())?)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let sync_config: SyncConfig = config.try_deserialize()?;
        sync_config.validate()?;

        Ok(sync_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_strategies = ["dn", "attribute"];
        for (scope, settings) in &self.scopes {
            if scope.trim().is_empty() {
                return Err(ConfigLoadError::Invalid {
                    message: "scope names must not be blank".to_string(),
                });
            }
            if !valid_strategies.contains(&settings.parent_strategy.to_lowercase().as_str()) {
                return Err(ConfigLoadError::Invalid {
                    message: format!(
                        "scopes.{scope}.parent_strategy must be one of: {:?}, got: {}",
                        valid_strategies, settings.parent_strategy
                    ),
                });
            }
        }

        if self.cache.max_hierarchy_depth == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.max_hierarchy_depth must be greater than 0".to_string(),
            });
        }

        if self.lease.staleness_window_ms > i64::MAX as u64 {
            return Err(ConfigLoadError::Invalid {
                message: "lease.staleness_window_ms is out of range".to_string(),
            });
        }

        let dispatcher = &self.dispatcher;
        if dispatcher.pool_name.trim().is_empty() {
            return Err(ConfigLoadError::Invalid {
                message: "dispatcher.pool_name must not be blank".to_string(),
            });
        }
        if dispatcher.max_workers == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "dispatcher.max_workers must be greater than 0".to_string(),
            });
        }
        if dispatcher.recommended_package_size == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "dispatcher.recommended_package_size must be greater than 0"
                    .to_string(),
            });
        }
        if dispatcher.poll_interval_ms == 0
            || dispatcher.max_poll_interval_ms < dispatcher.poll_interval_ms
        {
            return Err(ConfigLoadError::Invalid {
                message: "dispatcher.poll_interval_ms must be > 0 and <= max_poll_interval_ms"
                    .to_string(),
            });
        }
        let valid_modes = ["unbounded", "rendezvous"];
        if !valid_modes.contains(&dispatcher.queue_mode.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "dispatcher.queue_mode must be one of: {:?}, got: {}",
                    valid_modes, dispatcher.queue_mode
                ),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }

    /// Builds the hierarchy cache configuration.
    pub fn hierarchy_cache_config(&self) -> HierarchyCacheConfig {
        self.scopes.iter().fold(
            HierarchyCacheConfig::default().with_max_depth(self.cache.max_hierarchy_depth),
            |config, (scope, settings)| config.with_scope(scope, settings.to_settings()),
        )
    }

    pub fn staleness_window_millis(&self) -> i64 {
        i64::try_from(self.lease.staleness_window_ms).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
scopes:
  corp:
    parent_strategy: dn
    structure_units: [Ops, Sales]
    manager_suffix: _MGR
  flat:
    parent_strategy: attribute

cache:
  max_hierarchy_depth: 10

lease:
  staleness_window_ms: 60000

dispatcher:
  pool_name: nightly
  max_workers: 4
  recommended_package_size: 25
  queue_mode: unbounded
  deadline_secs: 600

logging:
  level: debug
  json: true
"#
        )
        .unwrap();

        let config = SyncConfig::load(file.path()).unwrap();

        assert_eq!(config.scopes.len(), 2);
        let corp = &config.scopes["corp"];
        assert_eq!(corp.structure_units, vec!["Ops", "Sales"]);
        assert_eq!(corp.manager_suffix.as_deref(), Some("_MGR"));
        assert_eq!(
            config.scopes["flat"].to_settings().parent_strategy,
            ParentStrategy::ByAttribute
        );
        assert_eq!(config.cache.max_hierarchy_depth, 10);
        assert_eq!(config.staleness_window_millis(), 60_000);
        assert_eq!(config.dispatcher.pool_name, "nightly");
        assert_eq!(config.dispatcher.max_workers, 4);
        assert_eq!(config.dispatcher.recommended_package_size, 25);
        assert_eq!(config.dispatcher.queue_mode(), QueueMode::Unbounded);
        assert_eq!(config.dispatcher.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
dispatcher:
  max_workers: 4
  pool_name: nightly
"#
        )
        .unwrap();

        std::env::set_var("DIRSYNC_DISPATCHER__MAX_WORKERS", "16");
        std::env::set_var("DIRSYNC_LOGGING__LEVEL", "warn");

        let config = SyncConfig::load(file.path()).unwrap();

        std::env::remove_var("DIRSYNC_DISPATCHER__MAX_WORKERS");
        std::env::remove_var("DIRSYNC_LOGGING__LEVEL");

        assert_eq!(config.dispatcher.max_workers, 16);
        assert_eq!(config.dispatcher.pool_name, "nightly");
        assert_eq!(config.logging.level, "warn");
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("DIRSYNC_LEASE__STALENESS_WINDOW_MS", "5000");

        let config = SyncConfig::from_env().unwrap();

        std::env::remove_var("DIRSYNC_LEASE__STALENESS_WINDOW_MS");

        assert_eq!(config.lease.staleness_window_ms, 5000);
        assert_eq!(config.dispatcher.max_workers, 10);
    }

    #[test]
    fn test_config_validation_catches_errors() {
        let mut config = SyncConfig::default();
        config.scopes.insert(
            "corp".to_string(),
            ScopeConfig {
                parent_strategy: "tree".to_string(),
                ..Default::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("parent_strategy"));

        let mut config = SyncConfig::default();
        config.dispatcher.max_workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_workers"));

        let mut config = SyncConfig::default();
        config.dispatcher.recommended_package_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recommended_package_size"));

        let mut config = SyncConfig::default();
        config.dispatcher.max_poll_interval_ms = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        let mut config = SyncConfig::default();
        config.dispatcher.queue_mode = "lifo".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("queue_mode"));

        let mut config = SyncConfig::default();
        config.cache.max_hierarchy_depth = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_hierarchy_depth"));

        let mut config = SyncConfig::default();
        config.logging.level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = SyncConfig::load("/nonexistent/path/dirsync.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();

        let err = SyncConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());

        assert!(config.scopes.is_empty());
        assert_eq!(config.dispatcher.queue_mode(), QueueMode::Rendezvous);
        assert_eq!(config.dispatcher.deadline(), None);
        assert_eq!(config.staleness_window_millis(), 900_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_hierarchy_cache_config_carries_scopes() {
        let mut config = SyncConfig::default();
        config.scopes.insert(
            "Corp".to_string(),
            ScopeConfig {
                parent_strategy: "attribute".to_string(),
                structure_units: vec!["Ops".to_string()],
                manager_suffix: None,
            },
        );
        config.cache.max_hierarchy_depth = 7;

        let cache_config = config.hierarchy_cache_config();

        assert_eq!(cache_config.max_hierarchy_depth, 7);
        let corp = &cache_config.scopes["CORP"];
        assert_eq!(corp.parent_strategy, ParentStrategy::ByAttribute);
        assert!(corp.is_structure_unit("ops"));
    }
}

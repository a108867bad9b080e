//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/devpool.toml` (base configuration)
//! 2. Environment variables prefixed with `DEVPOOL_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use devpool::config::DevpoolConfig;
//!
//! let config = DevpoolConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), devpool::config::ConfigError>(())
//! ```

use devpool_broker::AccessLists;
use devpool_core::DeviceClass;
use devpool_driver_mock::{MockDeviceClass, MockDeviceClassConfig};
use devpool_driver_serial::{SerialByIdClass, SerialByIdConfig};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/devpool.toml";

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or environment could not be parsed into [`DevpoolConfig`].
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration parsed but is inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevpoolConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Broker settings
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Device classes to register, in order
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Seconds between rescans in daemon mode
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_secs: u64,
    /// Only these identifiers are tracked (empty = all)
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Identifiers that are never tracked
    #[serde(default)]
    pub denylist: Vec<String>,
}

/// One device class definition, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassDefinition {
    /// Simulated devices listed inline
    Mock(MockDeviceClassConfig),
    /// USB serial adapters under a by-id directory
    SerialById(SerialByIdConfig),
}

fn default_name() -> String {
    "devpool".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rescan_interval() -> u64 {
    5
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            rescan_interval_secs: default_rescan_interval(),
            allowlist: Vec::new(),
            denylist: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Interval between daemon rescans.
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }

    /// Initial allow/deny lists for the broker.
    pub fn access_lists(&self) -> AccessLists {
        AccessLists::from_lists(self.allowlist.clone(), self.denylist.clone())
    }
}

impl ClassDefinition {
    /// Plugin name of the defined class.
    pub fn name(&self) -> &str {
        match self {
            ClassDefinition::Mock(config) => &config.name,
            ClassDefinition::SerialById(config) => &config.name,
        }
    }

    /// Instantiate the device class.
    pub fn build(&self) -> Arc<dyn DeviceClass> {
        match self {
            ClassDefinition::Mock(config) => Arc::new(MockDeviceClass::from_config(config)),
            ClassDefinition::SerialById(config) => Arc::new(SerialByIdClass::from_config(config)),
        }
    }
}

impl DevpoolConfig {
    /// Load configuration from `config/devpool.toml` and environment variables
    ///
    /// Example override: `DEVPOOL_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DEVPOOL_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for class in &self.classes {
            if !names.insert(class.name()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate class name: {}",
                    class.name()
                )));
            }
        }

        let denied: HashSet<&String> = self.broker.denylist.iter().collect();
        if let Some(id) = self.broker.allowlist.iter().find(|id| denied.contains(id)) {
            return Err(ConfigError::Invalid(format!(
                "Device '{}' is on both the allowlist and the denylist",
                id
            )));
        }

        Ok(())
    }
}

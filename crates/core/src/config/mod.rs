//! Configuration for the monitor process.
//!
//! This module provides:
//! - The TOML-backed `MonitorConfig` (endpoints, thresholds, schedule)
//! - `ConfigStore`, which serves fresh thresholds on every evaluation

mod monitor;
mod store;

pub use monitor::{
    LendingThresholds, MonitorConfig, PoolThresholds, PsmThresholds, ScheduleConfig,
};
pub use store::ConfigStore;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Configuration file used when `CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "./config.toml";

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Config file path from `CONFIG_PATH`, or the default.
pub fn config_path() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

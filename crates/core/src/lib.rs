//! Peg monitor core logic.
//!
//! This crate provides the monitoring engine:
//! - Hot-reloaded TOML configuration with per-subsystem thresholds
//! - Block event tracker dispatching contract events to their monitors
//! - Threshold monitors for the PSM, stable-swap pools and lending markets
//! - Jittered periodic scheduler with panic isolation
//! - Slack message formatting

pub mod config;
pub mod format;
pub mod monitor;
mod scheduler;
mod tracker;

pub use config::{config_path, ConfigError, ConfigStore, MonitorConfig};
pub use monitor::{
    register, LendingMonitor, Monitor, MonitorContext, PoolMonitor, PsmMonitor, ILKS, POOLS,
    STABLE_MARKETS, USDD_VAULT,
};
pub use scheduler::{Scheduler, APP_TOPIC};
pub use tracker::{BlockTracker, EventHandler, HandlerRegistry, Progress, TrackerError};

//! Monitor configuration.
//!
//! Thresholds are whole token units (already scaled by the token's decimals).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Slack incoming webhook URL
    #[serde(default)]
    pub slack_webhook: String,

    /// Ledger API base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Block explorer API base URL
    #[serde(default = "default_explorer_endpoint")]
    pub explorer_endpoint: String,

    /// Caller address for constant contract calls
    #[serde(default = "default_owner_address")]
    pub owner_address: String,

    /// Per-attempt HTTP timeout (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Attempts per HTTP call
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,

    /// Peg module thresholds
    #[serde(default)]
    pub psm: PsmThresholds,

    /// Stable-swap pool thresholds
    #[serde(default)]
    pub sun: PoolThresholds,

    /// Lending market thresholds
    #[serde(default)]
    pub jst: LendingThresholds,

    /// Job periods
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

fn default_endpoint() -> String {
    peg_monitor_chain::DEFAULT_ENDPOINT.to_string()
}
fn default_explorer_endpoint() -> String {
    peg_monitor_api::DEFAULT_EXPLORER.to_string()
}
fn default_owner_address() -> String {
    peg_monitor_chain::DEFAULT_OWNER.to_string()
}
fn default_request_timeout() -> u64 {
    3_000
}
fn default_request_attempts() -> u32 {
    3
}

/// Peg module thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsmThresholds {
    /// Minimum `BuyGem` / `SellGem` size to alert on
    #[serde(default = "default_gem_threshold")]
    pub gem_threshold: u64,

    /// Vault USDD balance below which the low-balance alert fires
    #[serde(default = "default_dai_threshold")]
    pub dai_threshold: u64,

    /// Reserve change between checks that triggers an alert
    #[serde(default = "default_psm_report_threshold")]
    pub report_threshold: u64,
}

fn default_gem_threshold() -> u64 {
    1_000_000
}
fn default_dai_threshold() -> u64 {
    1_000_000
}
fn default_psm_report_threshold() -> u64 {
    100_000
}

impl Default for PsmThresholds {
    fn default() -> Self {
        Self {
            gem_threshold: default_gem_threshold(),
            dai_threshold: default_dai_threshold(),
            report_threshold: default_psm_report_threshold(),
        }
    }
}

/// Stable-swap pool thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolThresholds {
    /// Minimum bought amount of a `TokenExchange` to alert on
    #[serde(default = "default_swap_threshold")]
    pub swap_threshold: u64,

    /// Minimum per-coin amount of a liquidity change to alert on
    #[serde(default = "default_liquidity_threshold")]
    pub liquidity_threshold: u64,

    /// Reserve change between checks that triggers an alert
    #[serde(default = "default_pool_report_threshold")]
    pub report_threshold: u64,
}

fn default_swap_threshold() -> u64 {
    500_000
}
fn default_liquidity_threshold() -> u64 {
    1_000_000
}
fn default_pool_report_threshold() -> u64 {
    1_000_000
}

impl Default for PoolThresholds {
    fn default() -> Self {
        Self {
            swap_threshold: default_swap_threshold(),
            liquidity_threshold: default_liquidity_threshold(),
            report_threshold: default_pool_report_threshold(),
        }
    }
}

/// Lending market thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingThresholds {
    /// Minimum `Borrow` / `Redeem` size to alert on
    #[serde(default = "default_stable_threshold")]
    pub stable_threshold: u64,

    /// Market cash change between checks that triggers an alert
    #[serde(default = "default_lending_report_threshold")]
    pub report_threshold: u64,
}

fn default_stable_threshold() -> u64 {
    1_000_000
}
fn default_lending_report_threshold() -> u64 {
    5_000_000
}

impl Default for LendingThresholds {
    fn default() -> Self {
        Self {
            stable_threshold: default_stable_threshold(),
            report_threshold: default_lending_report_threshold(),
        }
    }
}

/// Job periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Block tracker tick (seconds)
    #[serde(default = "default_tracker_interval")]
    pub tracker_interval_secs: u64,

    /// Short-interval anomaly check (seconds)
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// State report (seconds)
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Trend report (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Upper bound of the random start offset per job (seconds)
    #[serde(default = "default_max_jitter")]
    pub max_jitter_secs: u64,
}

fn default_tracker_interval() -> u64 {
    3
}
fn default_check_interval() -> u64 {
    600
}
fn default_report_interval() -> u64 {
    3_600
}
fn default_stats_interval() -> u64 {
    21_600
}
fn default_max_jitter() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tracker_interval_secs: default_tracker_interval(),
            check_interval_secs: default_check_interval(),
            report_interval_secs: default_report_interval(),
            stats_interval_secs: default_stats_interval(),
            max_jitter_secs: default_max_jitter(),
        }
    }
}

impl ScheduleConfig {
    pub fn tracker_interval(&self) -> Duration {
        Duration::from_secs(self.tracker_interval_secs.max(1))
    }
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs.max(1))
    }
    pub fn max_jitter(&self) -> Duration {
        Duration::from_secs(self.max_jitter_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            slack_webhook: String::new(),
            endpoint: default_endpoint(),
            explorer_endpoint: default_explorer_endpoint(),
            owner_address: default_owner_address(),
            request_timeout_ms: default_request_timeout(),
            request_attempts: default_request_attempts(),
            psm: PsmThresholds::default(),
            sun: PoolThresholds::default(),
            jst: LendingThresholds::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides (`SLACK_WEBHOOK`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(webhook) = std::env::var("SLACK_WEBHOOK") {
            if !webhook.is_empty() {
                self.slack_webhook = webhook;
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(
            endpoint = %self.endpoint,
            explorer = %self.explorer_endpoint,
            webhook_set = !self.slack_webhook.is_empty(),
            timeout_ms = self.request_timeout_ms,
            attempts = self.request_attempts,
            "Monitor configuration loaded"
        );
        tracing::info!(
            gem = self.psm.gem_threshold,
            dai = self.psm.dai_threshold,
            report = self.psm.report_threshold,
            "PSM thresholds"
        );
        tracing::info!(
            swap = self.sun.swap_threshold,
            liquidity = self.sun.liquidity_threshold,
            report = self.sun.report_threshold,
            "Pool thresholds"
        );
        tracing::info!(
            stable = self.jst.stable_threshold,
            report = self.jst.report_threshold,
            "Lending thresholds"
        );
    }
}

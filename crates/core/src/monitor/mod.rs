//! Threshold monitors.
//!
//! Every monitored subsystem runs three cycles on its own schedule:
//! - `check`: compare fresh values with the checkpoint, alert on large moves
//!   and on low balances (with hysteresis)
//! - `report`: broadcast the current state
//! - `stats`: broadcast the change since the previous stats run
//!
//! and reacts to on-chain events dispatched by the block tracker. Query
//! failures never leave a monitor: the last known value is used instead.

mod lending;
mod pool;
mod psm;
mod snapshot;

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use peg_monitor_api::{Notifier, TransactionLookup};
use peg_monitor_chain::{ContractReader, Event, TronAddress};
use tracing::{debug, warn};

use crate::config::{ConfigStore, MonitorConfig};
use crate::tracker::{EventHandler, HandlerRegistry};

pub use lending::{LendingMonitor, MarketSpec, LENDING_TOPIC, STABLE_MARKETS};
pub use pool::{PoolMonitor, PoolSpec, POOLS, POOL_TOPIC};
pub use psm::{IlkSpec, PsmMonitor, ILKS, PSM_TOPIC, USDD_VAULT, VAULT_DECIMALS};
pub use snapshot::{LowBalanceGuard, Snapshot, StatsClock};

/// A monitored subsystem.
#[async_trait]
pub trait Monitor: EventHandler {
    /// Short name used in logs and job names.
    fn name(&self) -> &'static str;

    /// Contracts whose events this monitor handles.
    fn watched(&self) -> Vec<TronAddress>;

    async fn check(&self);

    async fn report(&self);

    async fn stats(&self);
}

/// Route the events of every contract `monitor` watches to it.
pub fn register<M: Monitor + 'static>(registry: &mut HandlerRegistry, monitor: &Arc<M>) {
    for address in monitor.watched() {
        registry.register(address, monitor.clone());
    }
}

/// Collaborators shared by all monitors.
#[derive(Clone)]
pub struct MonitorContext {
    pub reader: Arc<dyn ContractReader>,
    pub notifier: Arc<dyn Notifier>,
    pub lookup: Arc<dyn TransactionLookup>,
    pub config: Arc<ConfigStore>,
}

impl MonitorContext {
    /// Latest configuration, read at evaluation time.
    pub fn config(&self) -> Arc<MonitorConfig> {
        self.config.current()
    }

    /// Deliver an alert; failures are logged, never propagated.
    pub async fn notify(&self, topic: &str, text: &str) {
        if let Err(e) = self.notifier.send(topic, text).await {
            debug!(topic, error = %e, "Notification dropped");
        }
    }

    /// Originating account of `tx_hash` for attribution.
    pub async fn sender(&self, tx_hash: &str) -> String {
        match self.lookup.sender(tx_hash).await {
            Ok(sender) => sender,
            Err(e) => {
                warn!(tx = tx_hash, error = %e, "Failed to resolve transaction sender");
                "unknown".to_string()
            }
        }
    }

    /// Label for the check period, e.g. `10min`.
    pub fn check_window(&self) -> String {
        window_label(self.config().schedule.check_interval())
    }
}

/// Compact label for a period: `45s`, `10min`, `6h`.
pub fn window_label(period: Duration) -> String {
    let secs = period.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}min", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Integer event field (decimal or `0x` hex).
pub fn field_amount(event: &Event, name: &str) -> Option<U256> {
    let raw = event.field(name)?;
    match raw.trim().parse::<U256>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                event = %event.event_name,
                field = name,
                value = raw,
                error = %e,
                "Unparseable event amount"
            );
            None
        }
    }
}

/// Array event field. The feed renders arrays either as JSON or as
/// newline separated values.
pub fn parse_amounts(raw: &str) -> Vec<U256> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(raw) {
            return values
                .iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => s.parse().ok(),
                    serde_json::Value::Number(n) => n.to_string().parse().ok(),
                    _ => None,
                })
                .collect();
        }
    }
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

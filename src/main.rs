//! Tron Stablecoin Peg Monitor
//!
//! Watches the USDD peg stability module, stable-swap pools and lending
//! markets on Tron and posts alerts to Slack.
//! Features:
//! - Block-by-block event tracking with per-contract dispatch
//! - Threshold checks with hysteresis on periodic snapshots
//! - Hot-reloaded thresholds from `config.toml`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use peg_monitor_api::{ClientConfig, ExplorerClient, Notifier, RequestClient, SlackNotifier};
use peg_monitor_chain::{LedgerClient, TronAddress};
use peg_monitor_core::{
    config_path, register, BlockTracker, ConfigStore, HandlerRegistry, LendingMonitor, Monitor,
    MonitorContext, PoolMonitor, PsmMonitor, Scheduler, ILKS, POOLS, STABLE_MARKETS, USDD_VAULT,
};

/// Topic for lifecycle messages.
const LIFECYCLE_TOPIC: &str = ":robot_face: [APP]";

/// Environment variable names.
mod env {
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // Thresholds are re-read from this file on every evaluation
    let path = config_path();
    let store = Arc::new(
        ConfigStore::load(&path).with_context(|| format!("Failed to load config from {path}"))?,
    );
    let config = store.current();
    config.log_config();

    info!("Starting Tron peg monitor");

    // HTTP stack
    let client = Arc::new(
        RequestClient::with_config(ClientConfig {
            timeout: config.request_timeout(),
            attempts: config.request_attempts,
            ..Default::default()
        })
        .context("Failed to build HTTP client")?,
    );
    let owner = TronAddress::parse(&config.owner_address).context("Invalid owner_address")?;
    let ledger = Arc::new(LedgerClient::new(client.clone(), &config.endpoint, owner));
    let explorer = Arc::new(ExplorerClient::new(client.clone(), &config.explorer_endpoint));
    let notifier: Arc<dyn Notifier> =
        Arc::new(SlackNotifier::new(client.clone(), &config.slack_webhook));
    info!(endpoint = %config.endpoint, "Ledger client initialized");

    let ctx = MonitorContext {
        reader: ledger.clone(),
        notifier: notifier.clone(),
        lookup: explorer.clone(),
        config: store.clone(),
    };

    // Monitors
    let psm = Arc::new(PsmMonitor::build(ctx.clone(), &ILKS, USDD_VAULT).await?);
    let pool = Arc::new(
        PoolMonitor::build(ctx.clone(), &POOLS)
            .await
            .context("Failed to discover pool coins")?,
    );
    let lending = Arc::new(LendingMonitor::build(ctx.clone(), &STABLE_MARKETS).await?);

    let mut registry = HandlerRegistry::new();
    register(&mut registry, &psm);
    register(&mut registry, &pool);
    register(&mut registry, &lending);
    info!(contracts = registry.len(), "Event handlers registered");

    let monitors: [Arc<dyn Monitor>; 3] = [psm, pool, lending];

    let tracker = Arc::new(BlockTracker::new(ledger, registry));
    tracker.seed().await.context("Failed to read chain height")?;

    if let Err(e) = notifier.send(LIFECYCLE_TOPIC, "Monitor now started").await {
        tracing::warn!(error = %e, "Startup notification failed");
    }

    for monitor in &monitors {
        monitor.report().await;
    }

    // Periodic jobs
    let schedule = &config.schedule;
    let scheduler =
        Scheduler::new(schedule.max_jitter()).with_panic_notifier(notifier.clone());

    let job_tracker = tracker.clone();
    scheduler.every_from_now("block tracker", schedule.tracker_interval(), move || {
        let tracker = job_tracker.clone();
        async move { tracker.tick().await }
    });

    scheduler.every("explorer cache cleanup", Duration::from_secs(300), move || {
        let explorer = explorer.clone();
        async move { explorer.cleanup_cache() }
    });

    for monitor in &monitors {
        let name = monitor.name();

        let m = monitor.clone();
        scheduler.every(format!("{name} check"), schedule.check_interval(), move || {
            let m = m.clone();
            async move { m.check().await }
        });

        let m = monitor.clone();
        scheduler.every(format!("{name} report"), schedule.report_interval(), move || {
            let m = m.clone();
            async move { m.report().await }
        });

        let m = monitor.clone();
        scheduler.every(format!("{name} stats"), schedule.stats_interval(), move || {
            let m = m.clone();
            async move { m.stats().await }
        });
    }
    info!(tasks = scheduler.len(), "Scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    scheduler.shutdown();

    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,peg_monitor_core=debug,peg_monitor_chain=debug")
    });
    let json = std::env::var(env::LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

//! Lending market monitor.
//!
//! Alerts on large `Borrow` / `Redeem` events in stablecoin markets and
//! tracks each market's cash through the periodic cycles.

use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::Local;
use futures::future::join_all;
use peg_monitor_chain::{contracts, units, AddressError, Event, TronAddress};
use tracing::{debug, info, instrument};

use super::{field_amount, Monitor, MonitorContext, Snapshot, StatsClock};
use crate::format::{self, CHANNEL};
use crate::tracker::EventHandler;

pub const LENDING_TOPIC: &str = ":justlend: [JST]";

/// A lending market and the decimals of its underlying token.
#[derive(Debug, Clone, Copy)]
pub struct MarketSpec {
    pub symbol: &'static str,
    pub address: &'static str,
    pub decimals: u8,
}

pub const STABLE_MARKETS: [MarketSpec; 5] = [
    MarketSpec {
        symbol: "USDD",
        address: "TX7kybeP6UwTBRHLNPYmswFESHfyjm9bAS",
        decimals: 18,
    },
    MarketSpec {
        symbol: "USDT",
        address: "TXJgMdjVX5dKiQaUi9QobwNxtSQaFqccvd",
        decimals: 6,
    },
    MarketSpec {
        symbol: "USDJ",
        address: "TL5x9MtSnDy537FXKx53yAaHRRNdg9TkkA",
        decimals: 18,
    },
    MarketSpec {
        symbol: "USDC",
        address: "TNSBA6KvSvMoTqQcEgpVK7VhHT3z7wifxy",
        decimals: 6,
    },
    MarketSpec {
        symbol: "TUSD",
        address: "TSXv71Fy5XdL3Rh2QfBoUu3NAaM4sMif8R",
        decimals: 18,
    },
];

#[derive(Debug)]
struct Market {
    symbol: String,
    address: TronAddress,
    decimals: u8,
    cash: Snapshot,
}

pub struct LendingMonitor {
    ctx: MonitorContext,
    markets: Vec<Market>,
    clock: StatsClock,
}

impl LendingMonitor {
    #[instrument(skip_all)]
    pub async fn build(ctx: MonitorContext, specs: &[MarketSpec]) -> Result<Self, AddressError> {
        let mut markets = Vec::with_capacity(specs.len());
        for spec in specs {
            let address = TronAddress::parse(spec.address)?;
            let initial =
                contracts::market_cash(ctx.reader.as_ref(), &address, spec.decimals).await;
            markets.push(Market {
                symbol: spec.symbol.to_string(),
                address,
                decimals: spec.decimals,
                cash: Snapshot::new(format!("j{}", spec.symbol), initial),
            });
        }
        info!(markets = markets.len(), "Lending monitor initialized");
        Ok(Self {
            ctx,
            markets,
            clock: StatsClock::new(),
        })
    }

    async fn cash(&self) -> Vec<U256> {
        let reader = self.ctx.reader.as_ref();
        let fetched = join_all(
            self.markets
                .iter()
                .map(|market| contracts::market_cash(reader, &market.address, market.decimals)),
        )
        .await;
        self.markets
            .iter()
            .zip(fetched)
            .map(|(market, result)| market.cash.observe(result))
            .collect()
    }
}

#[async_trait]
impl EventHandler for LendingMonitor {
    async fn handle(&self, event: &Event) {
        let Some(contract) = event.contract() else {
            return;
        };
        let Some(market) = self.markets.iter().find(|m| m.address == contract) else {
            return;
        };
        let (amount_field, account_field) = match event.event_name.as_str() {
            "Borrow" => ("borrowAmount", "borrower"),
            "Redeem" => ("redeemAmount", "redeemer"),
            other => {
                debug!(market = %market.symbol, event = other, "Ignoring market event");
                return;
            }
        };
        let Some(raw) = field_amount(event, amount_field) else {
            return;
        };

        let amount = units::normalize(raw, market.decimals);
        let threshold = U256::from(self.ctx.config().jst.stable_threshold);
        if amount < threshold {
            return;
        }

        let account = match event.field(account_field) {
            Some(account) => account.to_string(),
            None => self.ctx.sender(&event.transaction_hash).await,
        };
        let text = format!(
            "Large {}, {}, {}, {} {}",
            event.event_name,
            format::amount(&market.symbol, amount),
            format::user(&account),
            format::tx_url(&event.transaction_hash),
            CHANNEL
        );
        self.ctx.notify(LENDING_TOPIC, &text).await;
    }
}

#[async_trait]
impl Monitor for LendingMonitor {
    fn name(&self) -> &'static str {
        "jst"
    }

    fn watched(&self) -> Vec<TronAddress> {
        self.markets.iter().map(|m| m.address).collect()
    }

    async fn check(&self) {
        let threshold = U256::from(self.ctx.config().jst.report_threshold);
        let window = self.ctx.check_window();

        let mut crossed = false;
        for (market, value) in self.markets.iter().zip(self.cash().await) {
            let change = market.cash.check(value);
            if units::exceeds(change, threshold) {
                crossed = true;
                let text = format!(
                    "Large market cash change in last `{}`, {} in `j{}`",
                    window,
                    format::change(&market.symbol, change),
                    market.symbol
                );
                self.ctx.notify(LENDING_TOPIC, &text).await;
            }
        }
        if crossed {
            self.report().await;
        }
    }

    async fn report(&self) {
        let mut text = String::from("State Report, cash");
        for (market, value) in self.markets.iter().zip(self.cash().await) {
            market.cash.record_report(value);
            text.push_str(", ");
            text.push_str(&format::amount(&market.symbol, value));
        }
        self.ctx.notify(LENDING_TOPIC, &text).await;
    }

    async fn stats(&self) {
        let cash = self.cash().await;
        let now = Local::now();
        let since = self.clock.roll(now);

        let mut text = format!(
            "Stats Report, from `{}` ~ `{}`, cash",
            since.format("%H:%M"),
            now.format("%H:%M")
        );
        for (market, value) in self.markets.iter().zip(cash) {
            text.push_str(", ");
            text.push_str(&format::change(&market.symbol, market.cash.take_stats(value)));
        }
        self.ctx.notify(LENDING_TOPIC, &text).await;
    }
}

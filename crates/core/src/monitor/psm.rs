//! Peg stability module monitor.
//!
//! Tracks the gem reserves held by each gem-join and the USDD left in the
//! vault, and alerts on large `BuyGem` / `SellGem` swaps.

use alloy::primitives::{I256, U256};
use async_trait::async_trait;
use chrono::Local;
use futures::future::join_all;
use peg_monitor_chain::{contracts, units, AddressError, Event, TronAddress};
use tracing::{debug, info, instrument};

use super::{field_amount, LowBalanceGuard, Monitor, MonitorContext, Snapshot, StatsClock};
use crate::format::{self, CHANNEL};
use crate::tracker::EventHandler;

pub const PSM_TOPIC: &str = ":usdd: [PSM]";

/// Vault holding the USDD side of the peg module.
pub const USDD_VAULT: &str = "TMgSSHn8APyUVViqXxtveqFEB7mBBeGqNP";

/// Scale of `getUsddBalance()`.
pub const VAULT_DECIMALS: u8 = 6;

/// One collateral type ("ilk") of the peg module.
#[derive(Debug, Clone, Copy)]
pub struct IlkSpec {
    pub symbol: &'static str,
    pub token: &'static str,
    pub gem_join: &'static str,
    pub psm: &'static str,
    pub decimals: u8,
}

pub const ILKS: [IlkSpec; 4] = [
    IlkSpec {
        symbol: "USDT",
        token: "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t",
        gem_join: "TMn5WeW8a8KH9o8rBQux4RCgckD2SuMZmS",
        psm: "TM9gWuCdFGNMiT1qTq1bgw4tNhJbsESfjA",
        decimals: 6,
    },
    IlkSpec {
        symbol: "USDC",
        token: "TEkxiTehnzSmSe2XqrBj4w32RUN966rdz8",
        gem_join: "TRGTuMiDYAbztetdndYyMzYvtaRmucjz5q",
        psm: "TUcj1rpMgJCcFZULyq7uLbkmfh9xMnYTmA",
        decimals: 6,
    },
    IlkSpec {
        symbol: "TUSD",
        token: "TUpMhErZL2fhh4sVNULAbNKLokS4GjC1F4",
        gem_join: "TPxcmB9dQC3LHswCNEc4rJs1HFGb8McYjT",
        psm: "TY2op6AKcEkFhv8hxNJj3FBUfjManxYLSe",
        decimals: 18,
    },
    IlkSpec {
        symbol: "USDJ",
        token: "TMwFHYXLJaRUPeW6421aqXL4ZEzPRFGkGT",
        gem_join: "TKAovR61zwp1t9Rg1UE4UY5mXt7QTJdDXg",
        psm: "TVS3rVDUSd3ySeXV5moRH2J2t5B9reJfLR",
        decimals: 18,
    },
];

#[derive(Debug)]
struct Ilk {
    symbol: String,
    token: TronAddress,
    gem_join: TronAddress,
    psm: TronAddress,
    decimals: u8,
    reserve: Snapshot,
}

/// Peg module monitor over a list of ilks.
pub struct PsmMonitor {
    ctx: MonitorContext,
    ilks: Vec<Ilk>,
    vault: TronAddress,
    vault_balance: Snapshot,
    low_vault: LowBalanceGuard,
    clock: StatsClock,
}

impl PsmMonitor {
    /// Resolve addresses and take the initial snapshots.
    #[instrument(skip_all)]
    pub async fn build(
        ctx: MonitorContext,
        specs: &[IlkSpec],
        vault: &str,
    ) -> Result<Self, AddressError> {
        let vault = TronAddress::parse(vault)?;
        let mut ilks = Vec::with_capacity(specs.len());
        for spec in specs {
            let token = TronAddress::parse(spec.token)?;
            let gem_join = TronAddress::parse(spec.gem_join)?;
            let psm = TronAddress::parse(spec.psm)?;
            let initial =
                contracts::balance_of(ctx.reader.as_ref(), &token, &gem_join, spec.decimals).await;
            ilks.push(Ilk {
                symbol: spec.symbol.to_string(),
                token,
                gem_join,
                psm,
                decimals: spec.decimals,
                reserve: Snapshot::new(spec.symbol, initial),
            });
        }

        let initial =
            contracts::vault_usdd_balance(ctx.reader.as_ref(), &vault, VAULT_DECIMALS).await;
        info!(ilks = ilks.len(), vault = %vault, "PSM monitor initialized");

        Ok(Self {
            ctx,
            ilks,
            vault,
            vault_balance: Snapshot::new("USDD", initial),
            low_vault: LowBalanceGuard::new(),
            clock: StatsClock::new(),
        })
    }

    async fn reserves(&self) -> Vec<U256> {
        let reader = self.ctx.reader.as_ref();
        let fetched = join_all(self.ilks.iter().map(|ilk| {
            contracts::balance_of(reader, &ilk.token, &ilk.gem_join, ilk.decimals)
        }))
        .await;
        self.ilks
            .iter()
            .zip(fetched)
            .map(|(ilk, result)| ilk.reserve.observe(result))
            .collect()
    }

    async fn vault(&self) -> U256 {
        let fetched =
            contracts::vault_usdd_balance(self.ctx.reader.as_ref(), &self.vault, VAULT_DECIMALS)
                .await;
        self.vault_balance.observe(fetched)
    }

    /// Signed gem amount of a swap event: buys negative, sells positive.
    fn gem_amount(ilk: &Ilk, event: &Event) -> Option<I256> {
        let raw = field_amount(event, "value")?;
        let amount = I256::from_raw(units::normalize(raw, ilk.decimals));
        match event.event_name.as_str() {
            "BuyGem" => Some(-amount),
            "SellGem" => Some(amount),
            _ => None,
        }
    }
}

#[async_trait]
impl EventHandler for PsmMonitor {
    async fn handle(&self, event: &Event) {
        let Some(contract) = event.contract() else {
            return;
        };
        let Some(ilk) = self.ilks.iter().find(|ilk| ilk.psm == contract) else {
            return;
        };
        let Some(amount) = Self::gem_amount(ilk, event) else {
            debug!(event = %event.event_name, "Ignoring PSM event");
            return;
        };

        let threshold = U256::from(self.ctx.config().psm.gem_threshold);
        if !units::exceeds(amount, threshold) {
            return;
        }

        let sender = self.ctx.sender(&event.transaction_hash).await;
        let text = format!(
            "Large {}, {}, {}, {} {}",
            event.event_name,
            format::change(&ilk.symbol, amount),
            format::user(&sender),
            format::tx_url(&event.transaction_hash),
            CHANNEL
        );
        self.ctx.notify(PSM_TOPIC, &text).await;
    }
}

#[async_trait]
impl Monitor for PsmMonitor {
    fn name(&self) -> &'static str {
        "psm"
    }

    fn watched(&self) -> Vec<TronAddress> {
        self.ilks.iter().map(|ilk| ilk.psm).collect()
    }

    async fn check(&self) {
        let config = self.ctx.config();
        let threshold = U256::from(config.psm.report_threshold);
        let window = self.ctx.check_window();

        let mut crossed = false;
        for (ilk, value) in self.ilks.iter().zip(self.reserves().await) {
            let change = ilk.reserve.check(value);
            if units::exceeds(change, threshold) {
                crossed = true;
                let text = format!(
                    "Large gem balance change in last `{}`, {} {}",
                    window,
                    format::change(&ilk.symbol, change),
                    CHANNEL
                );
                self.ctx.notify(PSM_TOPIC, &text).await;
            }
        }
        if crossed {
            self.report().await;
        }

        let balance = self.vault().await;
        self.vault_balance.check(balance);
        let low = U256::from(config.psm.dai_threshold);
        if self.vault_balance.is_seeded() && self.low_vault.evaluate(balance, low) {
            let text = format!(
                "Vault remained USDD balance lower than {} {}",
                units::readable(low),
                CHANNEL
            );
            self.ctx.notify(PSM_TOPIC, &text).await;
        }
    }

    async fn report(&self) {
        let vault = self.vault().await;
        self.vault_balance.record_report(vault);

        let mut text = format!("State Report, {}", format::amount("USDD", vault));
        for (ilk, value) in self.ilks.iter().zip(self.reserves().await) {
            ilk.reserve.record_report(value);
            text.push_str(", ");
            text.push_str(&format::amount(&ilk.symbol, value));
        }
        self.ctx.notify(PSM_TOPIC, &text).await;
    }

    async fn stats(&self) {
        let vault = self.vault().await;
        let reserves = self.reserves().await;
        let now = Local::now();
        let since = self.clock.roll(now);

        let mut text = format!(
            "Stats Report, from `{}` ~ `{}`, {}",
            since.format("%H:%M"),
            now.format("%H:%M"),
            format::change("USDD", self.vault_balance.take_stats(vault))
        );
        for (ilk, value) in self.ilks.iter().zip(reserves) {
            text.push_str(", ");
            text.push_str(&format::change(&ilk.symbol, ilk.reserve.take_stats(value)));
        }
        self.ctx.notify(PSM_TOPIC, &text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, PsmThresholds};
    use crate::monitor::testing::{event, harness, Harness};
    use peg_monitor_chain::abi;

    const USDT_UNIT: u128 = 1_000_000;
    const USDD_UNIT: u128 = 1_000_000;

    fn config() -> MonitorConfig {
        MonitorConfig {
            psm: PsmThresholds {
                gem_threshold: 100_000,
                dai_threshold: 1_000_000,
                report_threshold: 50_000,
            },
            ..Default::default()
        }
    }

    fn set_usdt_reserve(h: &Harness, whole: u128) {
        let spec = ILKS[0];
        let token = TronAddress::parse(spec.token).unwrap();
        let join = TronAddress::parse(spec.gem_join).unwrap();
        h.ledger.set_uint(
            &token,
            contracts::selectors::BALANCE_OF,
            &abi::pad_address(&join),
            whole * USDT_UNIT,
        );
    }

    fn fail_usdt_reserve(h: &Harness) {
        let spec = ILKS[0];
        let token = TronAddress::parse(spec.token).unwrap();
        let join = TronAddress::parse(spec.gem_join).unwrap();
        h.ledger
            .clear(&token, contracts::selectors::BALANCE_OF, &abi::pad_address(&join));
    }

    fn set_vault(h: &Harness, whole: u128) {
        let vault = TronAddress::parse(USDD_VAULT).unwrap();
        h.ledger.set_uint(
            &vault,
            contracts::selectors::USDD_BALANCE,
            "",
            whole * USDD_UNIT,
        );
    }

    async fn monitor(h: &Harness) -> PsmMonitor {
        PsmMonitor::build(h.ctx.clone(), &ILKS[..1], USDD_VAULT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_large_sell_gem_alerts_with_sender() {
        let h = harness(config());
        h.lookup
            .add("tx1", r#"{"ownerAddress":"TNYmZq4oppcQrAA55xydbD7GPtrR49ULL6"}"#);
        let psm = monitor(&h).await;

        let sell = event(ILKS[0].psm, "SellGem", "tx1", &[("value", "250000000000")]);
        psm.handle(&sell).await;

        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("Large SellGem, :usdtlogo: - `250,000` :arrow_heading_up:"));
        assert!(texts[0].contains("TNYmZq4oppcQrAA55xydbD7GPtrR49ULL6"));
        assert!(texts[0].ends_with(CHANNEL));
    }

    #[tokio::test]
    async fn test_buy_gem_is_negative_and_small_swaps_ignored() {
        let h = harness(config());
        let psm = monitor(&h).await;

        psm.handle(&event(ILKS[0].psm, "BuyGem", "tx2", &[("value", "99999000000")]))
            .await;
        assert!(h.notifier.texts().is_empty());

        psm.handle(&event(ILKS[0].psm, "BuyGem", "tx3", &[("value", "100000000000")]))
            .await;
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains(":arrow_heading_down:"));
        assert!(texts[0].contains("unknown"));
    }

    #[tokio::test]
    async fn test_check_alerts_on_reserve_move_and_reports() {
        let h = harness(config());
        set_usdt_reserve(&h, 1_000_000);
        set_vault(&h, 5_000_000);
        let psm = monitor(&h).await;

        set_usdt_reserve(&h, 1_040_000);
        psm.check().await;
        assert!(h.notifier.texts().is_empty());

        set_usdt_reserve(&h, 1_100_000);
        psm.check().await;
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("Large gem balance change in last `10min`, :usdtlogo: - `60,000`"));
        assert!(texts[1].starts_with("State Report, :usdd: - `5,000,000`, :usdtlogo: - `1,100,000`"));
    }

    #[tokio::test]
    async fn test_low_vault_balance_hysteresis() {
        let h = harness(config());
        set_usdt_reserve(&h, 1_000_000);
        set_vault(&h, 2_000_000);
        let psm = monitor(&h).await;
        let low = "Vault remained USDD balance lower than 1,000,000";

        for balance in [900_000, 800_000, 950_000] {
            set_vault(&h, balance);
            psm.check().await;
        }
        assert_eq!(h.notifier.count_containing(low), 1);

        set_vault(&h, 1_000_000);
        psm.check().await;
        set_vault(&h, 999_999);
        psm.check().await;
        assert_eq!(h.notifier.count_containing(low), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_uses_last_known_reserve() {
        let h = harness(config());
        set_usdt_reserve(&h, 1_000_000);
        set_vault(&h, 5_000_000);
        let psm = monitor(&h).await;

        fail_usdt_reserve(&h);
        psm.check().await;
        assert!(h.notifier.texts().is_empty());
        assert_eq!(psm.ilks[0].reserve.checkpoint(), U256::from(1_000_000u64));

        set_usdt_reserve(&h, 1_060_000);
        psm.check().await;
        assert_eq!(h.notifier.count_containing("`60,000`"), 1);
    }

    #[tokio::test]
    async fn test_recovery_after_failed_startup_query_is_not_a_change() {
        let h = harness(config());
        let psm = monitor(&h).await;

        // nothing answered at startup; vault still unknown
        set_usdt_reserve(&h, 1_000_000);
        psm.check().await;
        assert!(h.notifier.texts().is_empty());

        set_vault(&h, 5_000_000);
        psm.check().await;
        psm.stats().await;
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains(":usdd: - `0` :repeat:"));
        assert!(texts[0].contains(":usdtlogo: - `0` :repeat:"));

        h.notifier.clear();
        set_usdt_reserve(&h, 1_060_000);
        psm.check().await;
        assert_eq!(h.notifier.count_containing("Large gem balance change"), 1);
        assert_eq!(h.notifier.count_containing("`60,000`"), 1);
    }

    #[tokio::test]
    async fn test_stats_reports_change_since_last_run() {
        let h = harness(config());
        set_usdt_reserve(&h, 1_000_000);
        set_vault(&h, 5_000_000);
        let psm = monitor(&h).await;

        set_usdt_reserve(&h, 900_000);
        set_vault(&h, 5_100_000);
        psm.stats().await;
        let texts = h.notifier.texts();
        assert!(texts[0].starts_with("Stats Report, from `"));
        assert!(texts[0].contains(":usdd: - `100,000` :arrow_heading_up:"));
        assert!(texts[0].contains(":usdtlogo: - `100,000` :arrow_heading_down:"));

        h.notifier.clear();
        psm.stats().await;
        assert!(h.notifier.texts()[0].contains(":usdtlogo: - `0` :repeat:"));
    }
}

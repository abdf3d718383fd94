//! Stable-swap pool monitor.
//!
//! Pool coins are discovered on-chain at startup. Reserves and the
//! amplification coefficient feed the periodic cycles; swaps, liquidity
//! changes and `A` ramps are reported as they are dispatched.

use alloy::primitives::{I256, U256};
use async_trait::async_trait;
use chrono::Local;
use futures::future::join_all;
use peg_monitor_api::TransactionLookup;
use peg_monitor_chain::{contracts, units, Event, QueryError, TronAddress};
use tracing::{debug, info, instrument, warn};

use super::{field_amount, parse_amounts, Monitor, MonitorContext, Snapshot, StatsClock};
use crate::format::{self, BANG};
use crate::tracker::EventHandler;

pub const POOL_TOPIC: &str = ":sunio: [SUN]";

/// Coin whose outflow gets the loud prefix.
const WATCHED_COIN: &str = "USDT";

#[derive(Debug, Clone, Copy)]
pub struct PoolSpec {
    pub name: &'static str,
    pub address: &'static str,
    pub coins: u64,
}

pub const POOLS: [PoolSpec; 2] = [
    PoolSpec {
        name: "USDD-2pool",
        address: "TNTfaTpkdd4AQDeqr8SGG7tgdkdjdhbP5c",
        coins: 2,
    },
    PoolSpec {
        name: "TUSD-2pool",
        address: "TS8d3ZrSxiGZkqhJqMzFKHEC1pjaowFMBJ",
        coins: 2,
    },
];

#[derive(Debug)]
struct Coin {
    symbol: String,
    decimals: u8,
    reserve: Snapshot,
}

#[derive(Debug)]
struct Pool {
    name: String,
    address: TronAddress,
    coins: Vec<Coin>,
    amplification: Snapshot,
    clock: StatsClock,
}

impl Pool {
    fn coin(&self, index: &str) -> Option<(usize, &Coin)> {
        let index: usize = index.trim().parse().ok()?;
        self.coins.get(index).map(|coin| (index, coin))
    }
}

/// Monitor over a set of stable-swap pools.
pub struct PoolMonitor {
    ctx: MonitorContext,
    pools: Vec<Pool>,
}

impl PoolMonitor {
    /// Discover pool coins and take the initial snapshots.
    #[instrument(skip_all)]
    pub async fn build(ctx: MonitorContext, specs: &[PoolSpec]) -> Result<Self, QueryError> {
        let reader = ctx.reader.as_ref();
        let mut pools = Vec::with_capacity(specs.len());
        for spec in specs {
            let address = TronAddress::parse(spec.address)?;
            let mut coins = Vec::new();
            for index in 0..spec.coins {
                let token = contracts::pool_coin(reader, &address, index).await?;
                let symbol = contracts::symbol(reader, &token).await?;
                let decimals = contracts::decimals(reader, &token).await;
                let initial = contracts::pool_balance(reader, &address, index, decimals).await;
                info!(pool = spec.name, index, token = %token, %symbol, decimals, "Discovered pool coin");
                coins.push(Coin {
                    reserve: Snapshot::new(format!("{}/{}", spec.name, symbol), initial),
                    symbol,
                    decimals,
                });
            }
            let amplification = contracts::pool_amplification(reader, &address).await;
            pools.push(Pool {
                name: spec.name.to_string(),
                address,
                coins,
                amplification: Snapshot::new(format!("{}/A", spec.name), amplification),
                clock: StatsClock::new(),
            });
        }
        info!(pools = pools.len(), "Pool monitor initialized");
        Ok(Self { ctx, pools })
    }

    async fn reserves(&self, pool: &Pool) -> Vec<U256> {
        let reader = self.ctx.reader.as_ref();
        let fetched = join_all(pool.coins.iter().enumerate().map(|(index, coin)| {
            contracts::pool_balance(reader, &pool.address, index as u64, coin.decimals)
        }))
        .await;
        pool.coins
            .iter()
            .zip(fetched)
            .map(|(coin, result)| coin.reserve.observe(result))
            .collect()
    }

    async fn amplification(&self, pool: &Pool) -> U256 {
        let fetched = contracts::pool_amplification(self.ctx.reader.as_ref(), &pool.address).await;
        pool.amplification.observe(fetched)
    }

    async fn on_exchange(&self, pool: &Pool, event: &Event) {
        let Some((sold_index, sold)) = event.field("sold_id").and_then(|id| pool.coin(id)) else {
            warn!(pool = %pool.name, tx = %event.transaction_hash, "TokenExchange without valid sold_id");
            return;
        };
        let bought = event
            .field("bought_id")
            .and_then(|id| pool.coin(id))
            .or_else(|| pool.coins.iter().enumerate().find(|(i, _)| *i != sold_index))
            .map(|(_, coin)| coin);
        let (Some(bought), Some(sold_raw), Some(bought_raw)) = (
            bought,
            field_amount(event, "tokens_sold"),
            field_amount(event, "tokens_bought"),
        ) else {
            return;
        };

        let sold_amount = units::normalize(sold_raw, sold.decimals);
        let bought_amount = units::normalize(bought_raw, bought.decimals);
        let threshold = U256::from(self.ctx.config().sun.swap_threshold);
        if bought_amount <= threshold {
            return;
        }

        let sender = self.ctx.sender(&event.transaction_hash).await;
        let mut text = format!(
            "Large {}, {} => {}, {}, ",
            event.event_name,
            format::amount(&sold.symbol, sold_amount),
            format::amount(&bought.symbol, bought_amount),
            format::user(&sender)
        );
        let slip = units::delta(sold_amount, bought_amount);
        if !slip.is_zero() {
            let verb = if slip.is_positive() { "lose" } else { "earn" };
            text.push_str(&format!(
                "{} {}, slip - `{:.3}%`, ",
                verb,
                format::amount(&bought.symbol, slip.unsigned_abs()),
                units::pct_f64(slip.unsigned_abs(), sold_amount)
            ));
        }
        text.push_str(&format::tx_url(&event.transaction_hash));
        text.push_str(&format!(" in `{}`", pool.name));
        if bought.symbol == WATCHED_COIN {
            text = format!("{BANG} {text}");
        }
        self.ctx.notify(POOL_TOPIC, &text).await;
    }

    async fn on_liquidity(&self, pool: &Pool, event: &Event, removed: bool) {
        let Some(raw) = event.field("token_amounts") else {
            return;
        };
        let amounts: Vec<I256> = parse_amounts(raw)
            .into_iter()
            .zip(&pool.coins)
            .map(|(amount, coin)| {
                let amount = I256::from_raw(units::normalize(amount, coin.decimals));
                if removed {
                    -amount
                } else {
                    amount
                }
            })
            .collect();

        let threshold = U256::from(self.ctx.config().sun.liquidity_threshold);
        if !amounts.iter().any(|amount| units::exceeds(*amount, threshold)) {
            return;
        }

        let sender = self.ctx.sender(&event.transaction_hash).await;
        let mut text = format!("Large {}", event.event_name);
        for (amount, coin) in amounts.iter().zip(&pool.coins) {
            text.push_str(", ");
            text.push_str(&format::change(&coin.symbol, *amount));
        }
        text.push_str(&format!(
            ", {}, {} in `{}`",
            format::user(&sender),
            format::tx_url(&event.transaction_hash),
            pool.name
        ));
        let watched_out = amounts
            .iter()
            .zip(&pool.coins)
            .any(|(amount, coin)| amount.is_negative() && coin.symbol == WATCHED_COIN);
        if watched_out {
            text = format!("{BANG} {text}");
        }
        self.ctx.notify(POOL_TOPIC, &text).await;
    }

    async fn on_remove_one(&self, pool: &Pool, event: &Event) {
        let Some(raw) = field_amount(event, "coin_amount") else {
            return;
        };
        // The coin index is a call parameter, not part of the event.
        let info = match self.ctx.lookup.transaction(&event.transaction_hash).await {
            Ok(info) => info,
            Err(e) => {
                warn!(pool = %pool.name, tx = %event.transaction_hash, error = %e, "Failed to resolve removed coin");
                return;
            }
        };
        let Some((_, coin)) = info.parameter("i").as_deref().and_then(|i| pool.coin(i)) else {
            warn!(pool = %pool.name, tx = %event.transaction_hash, "Removed coin index missing");
            return;
        };

        let amount = units::normalize(raw, coin.decimals);
        let threshold = U256::from(self.ctx.config().sun.liquidity_threshold);
        if amount < threshold {
            return;
        }

        let sender = if info.owner_address.is_empty() {
            self.ctx.sender(&event.transaction_hash).await
        } else {
            info.owner_address.clone()
        };
        let mut text = format!(
            "Large {}, {}, {}, {} in `{}`",
            event.event_name,
            format::change(&coin.symbol, -I256::from_raw(amount)),
            format::user(&sender),
            format::tx_url(&event.transaction_hash),
            pool.name
        );
        if coin.symbol == WATCHED_COIN {
            text = format!("{BANG} {text}");
        }
        self.ctx.notify(POOL_TOPIC, &text).await;
    }

    async fn on_ramp(&self, pool: &Pool, event: &Event) {
        let (Some(old), Some(new)) = (field_amount(event, "old_A"), field_amount(event, "new_A"))
        else {
            return;
        };
        let text = format!(
            "[{}] Ramp A from `{}` => `{}`, {} in `{}`",
            pool.name,
            old,
            new,
            format::tx_url(&event.transaction_hash),
            pool.name
        );
        self.ctx.notify(POOL_TOPIC, &text).await;
    }
}

/// `a : b` display ratio with the smaller side pinned to 1.
fn ratio(a: U256, b: U256) -> String {
    let (fa, fb) = (units::to_f64(a), units::to_f64(b));
    if a > b {
        let r = if fb == 0.0 { 0.0 } else { fa / fb };
        format!("`{r:.3}` : `1`")
    } else {
        let r = if fa == 0.0 { 0.0 } else { fb / fa };
        format!("`1` : `{r:.3}`")
    }
}

#[async_trait]
impl EventHandler for PoolMonitor {
    async fn handle(&self, event: &Event) {
        let Some(contract) = event.contract() else {
            return;
        };
        let Some(pool) = self.pools.iter().find(|pool| pool.address == contract) else {
            return;
        };
        match event.event_name.as_str() {
            "TokenExchange" => self.on_exchange(pool, event).await,
            "AddLiquidity" => self.on_liquidity(pool, event, false).await,
            "RemoveLiquidity" | "RemoveLiquidityImbalance" => {
                self.on_liquidity(pool, event, true).await
            }
            "RemoveLiquidityOne" => self.on_remove_one(pool, event).await,
            "RampA" => self.on_ramp(pool, event).await,
            other => debug!(pool = %pool.name, event = other, "Ignoring pool event"),
        }
    }
}

#[async_trait]
impl Monitor for PoolMonitor {
    fn name(&self) -> &'static str {
        "sun"
    }

    fn watched(&self) -> Vec<TronAddress> {
        self.pools.iter().map(|pool| pool.address).collect()
    }

    async fn check(&self) {
        let threshold = U256::from(self.ctx.config().sun.report_threshold);
        let window = self.ctx.check_window();

        let mut crossed = false;
        for pool in &self.pools {
            let changes: Vec<I256> = pool
                .coins
                .iter()
                .zip(self.reserves(pool).await)
                .map(|(coin, value)| coin.reserve.check(value))
                .collect();
            if !changes.iter().any(|change| units::exceeds(*change, threshold)) {
                continue;
            }
            crossed = true;
            let mut text = format!("Large pool balance change in last `{window}`");
            for (coin, change) in pool.coins.iter().zip(&changes) {
                text.push_str(", ");
                text.push_str(&format::change(&coin.symbol, *change));
            }
            text.push_str(&format!(" in `{}`", pool.name));
            self.ctx.notify(POOL_TOPIC, &text).await;
        }
        if crossed {
            self.report().await;
        }
    }

    async fn report(&self) {
        for pool in &self.pools {
            let reserves = self.reserves(pool).await;
            let a = self.amplification(pool).await;
            pool.amplification.record_report(a);

            let total = reserves.iter().fold(U256::ZERO, |acc, v| acc.saturating_add(*v));
            let mut text = format!("[{}] State Report", pool.name);
            for (coin, value) in pool.coins.iter().zip(&reserves) {
                coin.reserve.record_report(*value);
                text.push_str(", ");
                text.push_str(&format::amount(&coin.symbol, *value));
            }
            text.push_str(&format!(", A - `{a}`, Ratio - "));
            let shares: Vec<String> = reserves
                .iter()
                .map(|value| format!("`{:.3}%`", units::pct_f64(*value, total)))
                .collect();
            text.push_str(&shares.join(" : "));
            if let [first, second] = reserves.as_slice() {
                text.push_str(&format!(" :curly_loop: {}", ratio(*first, *second)));
            }
            text.push_str(&format!(" in `{}`", pool.name));
            self.ctx.notify(POOL_TOPIC, &text).await;
        }
    }

    async fn stats(&self) {
        for pool in &self.pools {
            let reserves = self.reserves(pool).await;
            let now = Local::now();
            let since = pool.clock.roll(now);

            let mut text = format!(
                "Stats Report, from `{}` ~ `{}`",
                since.format("%H:%M"),
                now.format("%H:%M")
            );
            for (coin, value) in pool.coins.iter().zip(reserves) {
                text.push_str(", ");
                text.push_str(&format::change(&coin.symbol, coin.reserve.take_stats(value)));
            }
            text.push_str(&format!(" in `{}`", pool.name));
            self.ctx.notify(POOL_TOPIC, &text).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, PoolThresholds};
    use crate::monitor::testing::{event, harness, Harness};
    use peg_monitor_chain::abi;
    use peg_monitor_chain::contracts::selectors;

    const POOL: &str = "TNTfaTpkdd4AQDeqr8SGG7tgdkdjdhbP5c";
    const USDD_HEX: &str = "94f24e992ca04b49c6f2a2753076ef8938ed4daa";
    const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
    const E18: u128 = 1_000_000_000_000_000_000;
    const E6: u128 = 1_000_000;

    fn config() -> MonitorConfig {
        MonitorConfig {
            sun: PoolThresholds {
                swap_threshold: 100_000,
                liquidity_threshold: 200_000,
                report_threshold: 300_000,
            },
            ..Default::default()
        }
    }

    fn symbol_word(symbol: &str) -> String {
        let data: String = symbol.bytes().map(|b| format!("{b:02x}")).collect();
        format!("{:064x}{:064x}{:0<64}", 32, symbol.len(), data)
    }

    fn set_reserves(h: &Harness, usdd: u128, usdt: u128) {
        let pool = TronAddress::parse(POOL).unwrap();
        h.ledger
            .set_uint(&pool, selectors::BALANCES, &abi::pad_uint256(0), usdd * E18);
        h.ledger
            .set_uint(&pool, selectors::BALANCES, &abi::pad_uint256(1), usdt * E6);
    }

    /// USDD (18 decimals) as coin 0, USDT (6 decimals) as coin 1.
    async fn setup() -> (Harness, PoolMonitor) {
        let h = harness(config());
        let pool = TronAddress::parse(POOL).unwrap();
        let usdd = TronAddress::from_hex(USDD_HEX).unwrap();
        let usdt = TronAddress::parse(USDT).unwrap();

        h.ledger
            .set(&pool, selectors::COINS, &abi::pad_uint256(0), usdd.to_abi_word());
        h.ledger
            .set(&pool, selectors::COINS, &abi::pad_uint256(1), usdt.to_abi_word());
        h.ledger.set(&usdd, selectors::SYMBOL, "", symbol_word("USDD"));
        h.ledger.set(&usdt, selectors::SYMBOL, "", symbol_word("USDT"));
        h.ledger.set_uint(&usdd, selectors::DECIMALS, "", 18);
        h.ledger.set_uint(&usdt, selectors::DECIMALS, "", 6);
        h.ledger.set_uint(&pool, selectors::AMPLIFICATION, "", 1000);
        set_reserves(&h, 3_000_000, 1_000_000);

        let monitor = PoolMonitor::build(h.ctx.clone(), &POOLS[..1]).await.unwrap();
        (h, monitor)
    }

    #[tokio::test]
    async fn test_discovery() {
        let (_h, monitor) = setup().await;
        let pool = &monitor.pools[0];
        assert_eq!(pool.coins[0].symbol, "USDD");
        assert_eq!(pool.coins[0].decimals, 18);
        assert_eq!(pool.coins[1].symbol, "USDT");
        assert_eq!(pool.coins[1].decimals, 6);
        assert_eq!(pool.coins[1].reserve.checkpoint(), U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_failed_discovery_is_an_error() {
        let h = harness(config());
        assert!(PoolMonitor::build(h.ctx.clone(), &POOLS[..1]).await.is_err());
    }

    #[tokio::test]
    async fn test_exchange_for_usdt_is_loud_with_slippage() {
        let (h, monitor) = setup().await;
        let swap = event(
            POOL,
            "TokenExchange",
            "tx1",
            &[
                ("sold_id", "0"),
                ("tokens_sold", "500000000000000000000000"),
                ("bought_id", "1"),
                ("tokens_bought", "495000000000"),
            ],
        );
        monitor.handle(&swap).await;

        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(":bangbang: Large TokenExchange, :usdd: - `500,000` => :usdtlogo: - `495,000`"));
        assert!(texts[0].contains("lose :usdtlogo: - `5,000`, slip - `1.000%`"));
        assert!(texts[0].ends_with("in `USDD-2pool`"));
    }

    #[tokio::test]
    async fn test_small_exchange_ignored() {
        let (h, monitor) = setup().await;
        let swap = event(
            POOL,
            "TokenExchange",
            "tx1",
            &[
                ("sold_id", "1"),
                ("tokens_sold", "100000000000"),
                ("tokens_bought", "100000000000000000000000"),
            ],
        );
        monitor.handle(&swap).await;
        assert!(h.notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn test_remove_liquidity_marks_usdt_outflow() {
        let (h, monitor) = setup().await;
        let remove = event(
            POOL,
            "RemoveLiquidity",
            "tx2",
            &[("token_amounts", "1000000000000000000000\n250000000000")],
        );
        monitor.handle(&remove).await;

        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(":bangbang: Large RemoveLiquidity, :usdd: - `1,000` :arrow_heading_down:, :usdtlogo: - `250,000` :arrow_heading_down:"));

        h.notifier.clear();
        let add = event(
            POOL,
            "AddLiquidity",
            "tx3",
            &[("token_amounts", r#"["300000000000000000000000","0"]"#)],
        );
        monitor.handle(&add).await;
        let texts = h.notifier.texts();
        assert!(texts[0].starts_with("Large AddLiquidity, :usdd: - `300,000` :arrow_heading_up:"));
    }

    #[tokio::test]
    async fn test_remove_one_resolves_coin_through_lookup() {
        let (h, monitor) = setup().await;
        h.lookup.add(
            "tx4",
            r#"{"ownerAddress":"TNYmZq4oppcQrAA55xydbD7GPtrR49ULL6","trigger_info":{"parameter":{"i":1}}}"#,
        );
        let remove = event(POOL, "RemoveLiquidityOne", "tx4", &[("coin_amount", "400000000000")]);
        monitor.handle(&remove).await;

        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with(":bangbang: Large RemoveLiquidityOne, :usdtlogo: - `400,000` :arrow_heading_down:"));
        assert!(texts[0].contains("TNYmZq4oppcQrAA55xydbD7GPtrR49ULL6"));

        // unresolvable transaction: skipped
        h.notifier.clear();
        let remove = event(POOL, "RemoveLiquidityOne", "tx5", &[("coin_amount", "400000000000")]);
        monitor.handle(&remove).await;
        assert!(h.notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn test_ramp_a() {
        let (h, monitor) = setup().await;
        let ramp = event(POOL, "RampA", "tx6", &[("old_A", "1000"), ("new_A", "1500")]);
        monitor.handle(&ramp).await;
        assert!(h.notifier.texts()[0].starts_with("[USDD-2pool] Ramp A from `1000` => `1500`"));
    }

    #[tokio::test]
    async fn test_report_shows_shares_and_ratio() {
        let (h, monitor) = setup().await;
        monitor.report().await;
        let text = &h.notifier.texts()[0];
        assert!(text.starts_with("[USDD-2pool] State Report, :usdd: - `3,000,000`, :usdtlogo: - `1,000,000`, A - `1000`"));
        assert!(text.contains("Ratio - `75.000%` : `25.000%` :curly_loop: `3.000` : `1`"));
        assert_eq!(monitor.pools[0].coins[0].reserve.reportpoint(), Some(U256::from(3_000_000u64)));
    }

    #[tokio::test]
    async fn test_check_alerts_and_reports() {
        let (h, monitor) = setup().await;
        set_reserves(&h, 3_100_000, 900_000);
        monitor.check().await;
        assert!(h.notifier.texts().is_empty());

        set_reserves(&h, 3_500_000, 500_000);
        monitor.check().await;
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("Large pool balance change in last `10min`, :usdd: - `400,000` :arrow_heading_up:, :usdtlogo: - `400,000` :arrow_heading_down:"));
        assert!(texts[1].starts_with("[USDD-2pool] State Report"));
    }
}

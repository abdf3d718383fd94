//! Rolling snapshots of monitored quantities.

use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::{I256, U256};
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use peg_monitor_chain::{units, QueryError};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Points {
    seeded: bool,
    last_known: U256,
    checkpoint: U256,
    reportpoint: Option<U256>,
    statspoint: U256,
}

/// Checkpoint, reportpoint and statspoint of one quantity.
///
/// Each cycle owns one point and overwrites it unconditionally at the end
/// of the cycle. The lock is never held across an await.
///
/// A snapshot whose first query failed is unseeded: the first successful
/// observation becomes the baseline of every point, and deltas are zero
/// until then.
#[derive(Debug)]
pub struct Snapshot {
    name: String,
    points: Mutex<Points>,
}

impl Snapshot {
    /// Snapshot seeded from the first query, or unseeded when it failed.
    pub fn new(name: impl Into<String>, initial: Result<U256, QueryError>) -> Self {
        let name = name.into();
        let (seeded, value) = match initial {
            Ok(value) => (true, value),
            Err(e) => {
                warn!(quantity = %name, error = %e, "Initial query failed, waiting for first value");
                (false, U256::ZERO)
            }
        };
        Self {
            name,
            points: Mutex::new(Points {
                seeded,
                last_known: value,
                checkpoint: value,
                reportpoint: None,
                statspoint: value,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh value, or the last successfully fetched one when the query failed.
    pub fn observe(&self, fetched: Result<U256, QueryError>) -> U256 {
        let mut points = self.points.lock();
        match fetched {
            Ok(value) => {
                if !points.seeded {
                    points.seeded = true;
                    points.checkpoint = value;
                    points.statspoint = value;
                }
                points.last_known = value;
                value
            }
            Err(e) => {
                warn!(
                    quantity = %self.name,
                    error = %e,
                    stale = %points.last_known,
                    "Query failed, using last known value"
                );
                points.last_known
            }
        }
    }

    /// Delta against the checkpoint; the checkpoint becomes `value`.
    pub fn check(&self, value: U256) -> I256 {
        let mut points = self.points.lock();
        if !points.seeded {
            return I256::ZERO;
        }
        let change = units::delta(value, points.checkpoint);
        points.checkpoint = value;
        change
    }

    /// Record `value` as reported.
    pub fn record_report(&self, value: U256) {
        self.points.lock().reportpoint = Some(value);
    }

    /// Delta against the statspoint; the statspoint becomes `value`.
    pub fn take_stats(&self, value: U256) -> I256 {
        let mut points = self.points.lock();
        if !points.seeded {
            return I256::ZERO;
        }
        let change = units::delta(value, points.statspoint);
        points.statspoint = value;
        change
    }

    /// Whether any query has succeeded yet.
    pub fn is_seeded(&self) -> bool {
        self.points.lock().seeded
    }

    pub fn last_known(&self) -> U256 {
        self.points.lock().last_known
    }

    pub fn checkpoint(&self) -> U256 {
        self.points.lock().checkpoint
    }

    pub fn reportpoint(&self) -> Option<U256> {
        self.points.lock().reportpoint
    }
}

/// Start time of the current stats window.
#[derive(Debug)]
pub struct StatsClock(Mutex<DateTime<Local>>);

impl StatsClock {
    pub fn new() -> Self {
        Self(Mutex::new(Local::now()))
    }

    /// Close the window at `now`, returning its start.
    pub fn roll(&self, now: DateTime<Local>) -> DateTime<Local> {
        std::mem::replace(&mut *self.0.lock(), now)
    }
}

impl Default for StatsClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Hysteresis flag for a low-balance condition.
///
/// Fires once when the value drops below the threshold and re-arms only
/// after a value at or above the threshold has been seen.
#[derive(Debug, Default)]
pub struct LowBalanceGuard {
    warned: AtomicBool,
}

impl LowBalanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an alert must be sent for `value`.
    pub fn evaluate(&self, value: U256, threshold: U256) -> bool {
        if value < threshold {
            !self.warned.swap(true, Ordering::SeqCst)
        } else {
            self.warned.store(false, Ordering::SeqCst);
            false
        }
    }

    pub fn is_warned(&self) -> bool {
        self.warned.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peg_monitor_api::RequestError;
    use tracing_test::traced_test;

    fn failed() -> Result<U256, QueryError> {
        Err(QueryError::Request(RequestError::Status(500)))
    }

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    fn i(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn test_guard_fires_once_per_crossing() {
        let guard = LowBalanceGuard::new();
        let threshold = u(1_000);

        let fired: Vec<bool> = [1_500, 900, 800, 999, 1_000, 950, 700, 2_000]
            .into_iter()
            .map(|v| guard.evaluate(u(v), threshold))
            .collect();

        assert_eq!(
            fired,
            vec![false, true, false, false, false, true, false, false]
        );
        assert!(!guard.is_warned());
    }

    #[test]
    #[traced_test]
    fn test_stale_fallback_uses_last_success() {
        let snapshot = Snapshot::new("USDT", Ok(u(100)));

        let value = snapshot.observe(Ok(u(150)));
        assert_eq!(snapshot.check(value), i(50));

        // failed refresh: the delta is computed from the last good value
        let value = snapshot.observe(failed());
        assert_eq!(value, u(150));
        assert_eq!(snapshot.check(value), i(0));

        let value = snapshot.observe(Ok(u(120)));
        assert_eq!(snapshot.check(value), i(-30));
        assert!(logs_contain("Query failed, using last known value"));
    }

    #[test]
    fn test_cycles_own_their_points() {
        let snapshot = Snapshot::new("USDD", Ok(u(1_000)));
        assert_eq!(snapshot.reportpoint(), None);

        assert_eq!(snapshot.check(u(1_200)), i(200));
        snapshot.record_report(u(1_200));
        assert_eq!(snapshot.reportpoint(), Some(u(1_200)));

        // stats is measured from the initial value, not from the checkpoint
        assert_eq!(snapshot.take_stats(u(1_300)), i(300));
        assert_eq!(snapshot.take_stats(u(1_300)), i(0));
        assert_eq!(snapshot.checkpoint(), u(1_200));
    }

    #[test]
    fn test_failed_initial_query_waits_for_baseline() {
        let snapshot = Snapshot::new("TUSD", failed());
        assert!(!snapshot.is_seeded());
        let value = snapshot.observe(failed());
        assert_eq!(value, U256::ZERO);
        assert_eq!(snapshot.check(value), I256::ZERO);
        assert_eq!(snapshot.take_stats(value), I256::ZERO);

        // first success is the baseline, not a move from zero
        let value = snapshot.observe(Ok(u(1_000_000)));
        assert!(snapshot.is_seeded());
        assert_eq!(snapshot.check(value), I256::ZERO);
        assert_eq!(snapshot.take_stats(value), I256::ZERO);

        assert_eq!(snapshot.check(u(1_200_000)), i(200_000));
        assert_eq!(snapshot.take_stats(u(900_000)), i(-100_000));
    }

    #[test]
    fn test_stats_clock_roll() {
        let clock = StatsClock::new();
        let later = Local::now() + chrono::Duration::minutes(5);
        let start = clock.roll(later);
        assert!(start < later);
        assert_eq!(clock.roll(Local::now()), later);
    }
}

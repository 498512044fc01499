use chrono::Duration;
use meridian_core::Timestamp;

/// Source of the current time for every time-dependent rule.
///
/// Cooling-off and trade-frequency windows, cache TTLs, analytics periods
/// and the rebalance interval all read an injected clock, so tests can
/// drive them without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Time since `earlier`; negative when `earlier` lies ahead
    fn elapsed_since(&self, earlier: Timestamp) -> Duration {
        self.now() - earlier
    }
}

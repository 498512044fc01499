//! Rebalancer configuration

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Plan-building heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    /// Close the full gap on every symbol drifting past `min_drift_pct`
    Threshold,
    /// Buy-only, a slice of the gap at a time
    Dca,
    /// Split the gap across limit levels around the current price
    Grid,
    /// Tilt targets toward symbols that are already winning
    Momentum,
    /// Close half the gap
    MeanReversion,
    /// Inverse-volatility weights
    RiskParity,
}

impl RebalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceStrategy::Threshold => "threshold",
            RebalanceStrategy::Dca => "dca",
            RebalanceStrategy::Grid => "grid",
            RebalanceStrategy::Momentum => "momentum",
            RebalanceStrategy::MeanReversion => "mean_reversion",
            RebalanceStrategy::RiskParity => "risk_parity",
        }
    }
}

impl std::fmt::Display for RebalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drift percentages are percentage points of portfolio weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Drift that forces a rebalance
    pub max_drift_pct: Decimal,
    /// Drift below which a symbol is left alone
    pub min_drift_pct: Decimal,
    /// Time-based rebalance trigger
    pub rebalance_interval_secs: u64,

    pub min_trade_size_usd: Decimal,
    /// Reject plans whose expected cost exceeds this % of portfolio value
    pub max_rebalance_cost_pct: Decimal,
    pub fee_rate: Decimal,
    pub slippage_rate: Decimal,

    /// Pause between consecutive trades
    pub trade_delay_ms: u64,
    /// Per-trade executor timeout
    pub trade_timeout_ms: u64,
    /// Plan but never execute
    pub dry_run: bool,

    pub grid_levels: u32,
    pub grid_range_pct: Decimal,

    /// Share of the gap bought per DCA round
    pub dca_fraction: Decimal,
    /// Cap per symbol per DCA round, % of portfolio value
    pub dca_max_pct: Decimal,

    /// Largest target tilt from momentum, in points
    pub momentum_max_shift_pct: Decimal,
    /// Unrealized PnL % treated as strong momentum
    pub strong_momentum_pct: Decimal,

    /// Share of the gap closed by mean reversion
    pub mean_reversion_fraction: Decimal,

    /// Volatility assumed by risk parity when a symbol has no history
    pub default_volatility_pct: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            max_drift_pct: dec!(10),
            min_drift_pct: dec!(2),
            rebalance_interval_secs: 86_400,
            min_trade_size_usd: dec!(10),
            max_rebalance_cost_pct: dec!(1),
            fee_rate: dec!(0.001),
            slippage_rate: dec!(0.0005),
            trade_delay_ms: 1_000,
            trade_timeout_ms: 30_000,
            dry_run: false,
            grid_levels: 5,
            grid_range_pct: dec!(10),
            dca_fraction: dec!(0.2),
            dca_max_pct: dec!(5),
            momentum_max_shift_pct: dec!(5),
            strong_momentum_pct: dec!(10),
            mean_reversion_fraction: dec!(0.5),
            default_volatility_pct: 80.0,
        }
    }
}

impl RebalanceConfig {
    pub fn rebalance_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.rebalance_interval_secs as i64)
    }

    /// Fee plus slippage per dollar traded
    pub fn cost_rate(&self) -> Decimal {
        self.fee_rate + self.slippage_rate
    }
}

//! Risk limits
//!
//! Percent fields are in percent units (`20` means 20% of portfolio value).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Configured risk limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Max single position as % of portfolio value
    pub max_position_pct: Decimal,
    /// Max aggregate exposure to one symbol as % of portfolio value
    pub max_symbol_exposure_pct: Decimal,
    /// Max total exposure across all symbols as % of portfolio value
    pub max_total_exposure_pct: Decimal,
    /// Peak-to-trough drawdown that triggers cooling-off
    pub max_drawdown_pct: Decimal,
    /// Drawdown at which new positions are blocked
    pub max_daily_loss_pct: Decimal,
    pub max_positions: usize,

    pub min_position_size_usd: Decimal,
    pub max_position_size_usd: Decimal,

    pub max_trades_per_minute: usize,
    pub max_trades_per_hour: usize,
    pub max_trades_per_day: usize,

    /// Annualized volatility cap (percent) above which checks warn
    pub max_volatility_pct: f64,
    /// Volatility assumed when a symbol has no price history
    pub default_volatility_pct: f64,
    /// Portfolio volatility targeted by inverse-volatility sizing
    pub target_volatility_pct: f64,

    /// How long new positions stay blocked after a breach
    pub cooling_off_secs: u64,

    /// Annual risk-free rate as a fraction
    pub risk_free_rate: f64,

    /// Upper bound on the Kelly fraction
    pub kelly_cap: f64,
    /// Fraction used before enough trades exist for Kelly
    pub default_kelly_fraction: f64,
    pub min_trades_for_kelly: usize,

    /// Rolling portfolio-value samples kept
    pub value_history_len: usize,
    /// Rolling prices kept per symbol
    pub price_history_len: usize,
    /// Per-symbol volatility cache TTL
    pub volatility_cache_secs: u64,
    /// Violations kept for reporting
    pub violation_history_len: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_pct: dec!(20),
            max_symbol_exposure_pct: dec!(30),
            max_total_exposure_pct: dec!(100),
            max_drawdown_pct: dec!(20),
            max_daily_loss_pct: dec!(5),
            max_positions: 20,
            min_position_size_usd: dec!(10),
            max_position_size_usd: dec!(10000),
            max_trades_per_minute: 5,
            max_trades_per_hour: 50,
            max_trades_per_day: 200,
            max_volatility_pct: 150.0,
            default_volatility_pct: 80.0,
            target_volatility_pct: 20.0,
            cooling_off_secs: 3600,
            risk_free_rate: 0.02,
            kelly_cap: 0.25,
            default_kelly_fraction: 0.02,
            min_trades_for_kelly: 10,
            value_history_len: 2000,
            price_history_len: 500,
            volatility_cache_secs: 300,
            violation_history_len: 500,
        }
    }
}

impl RiskLimits {
    pub fn cooling_off(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cooling_off_secs as i64)
    }

    pub fn volatility_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.volatility_cache_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let limits: RiskLimits =
            serde_json::from_str(r#"{"max_positions": 3, "max_position_size_usd": "2500"}"#).unwrap();

        assert_eq!(limits.max_positions, 3);
        assert_eq!(limits.max_position_size_usd, dec!(2500));
        assert_eq!(limits.max_drawdown_pct, dec!(20));
        assert_eq!(limits.kelly_cap, 0.25);
    }
}

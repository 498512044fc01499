//! Position sizing
//!
//! The recommended size is the smallest of three independent views:
//! capped Kelly, inverse volatility and the remaining risk budget, then
//! clipped by the single-position limits.

use crate::error::{Result, RiskError};
use crate::limits::RiskLimits;
use log::debug;
use meridian_core::Position;
use meridian_core::math::{checked_div, require_positive, to_decimal, to_f64};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kelly fraction `(p*b - q) / b`, floored at 0 and capped at `cap`
pub fn kelly_fraction(win_rate: f64, win_loss_ratio: f64, cap: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&win_rate) {
        return Err(RiskError::InvalidKellyInputs(format!(
            "win rate {} outside [0, 1]",
            win_rate
        )));
    }
    if !win_loss_ratio.is_finite() || win_loss_ratio <= 0.0 {
        return Err(RiskError::InvalidKellyInputs(format!(
            "win/loss ratio {} must be positive",
            win_loss_ratio
        )));
    }
    let q = 1.0 - win_rate;
    let raw = (win_rate * win_loss_ratio - q) / win_loss_ratio;
    Ok(raw.clamp(0.0, cap.max(0.0)))
}

/// Win/loss statistics over closed positions
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub avg_win: f64,
    /// Magnitude of the average loss
    pub avg_loss: f64,
}

impl TradeStats {
    pub fn from_closed(closed: &[Position]) -> Self {
        let mut stats = TradeStats::default();
        let (mut win_sum, mut loss_sum) = (0.0, 0.0);
        for position in closed {
            if position.filled_size.is_zero() {
                continue;
            }
            stats.trades += 1;
            let pnl = to_f64(position.realized_pnl);
            if pnl > 0.0 {
                stats.wins += 1;
                win_sum += pnl;
            } else if pnl < 0.0 {
                stats.losses += 1;
                loss_sum += -pnl;
            }
        }
        if stats.wins > 0 {
            stats.avg_win = win_sum / stats.wins as f64;
        }
        if stats.losses > 0 {
            stats.avg_loss = loss_sum / stats.losses as f64;
        }
        stats
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.trades as f64
        }
    }

    /// `None` when there are no losses to compare against
    pub fn win_loss_ratio(&self) -> Option<f64> {
        if self.avg_loss > 0.0 {
            Some(self.avg_win / self.avg_loss)
        } else {
            None
        }
    }

    /// Capped Kelly fraction, or the configured default while history is thin
    pub fn kelly(&self, limits: &RiskLimits) -> f64 {
        if self.trades < limits.min_trades_for_kelly {
            return limits.default_kelly_fraction;
        }
        if self.wins == 0 {
            return 0.0;
        }
        match self.win_loss_ratio() {
            Some(ratio) => kelly_fraction(self.win_rate(), ratio, limits.kelly_cap)
                .unwrap_or(limits.default_kelly_fraction),
            // Never lost: trust the cap
            None => limits.kelly_cap,
        }
    }
}

/// Which view produced the recommended size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingConstraint {
    Kelly,
    Volatility,
    RiskBudget,
    PositionPct,
    MaxPositionUsd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    pub symbol: String,
    pub price: Decimal,
    pub kelly_fraction: f64,
    pub kelly_usd: Decimal,
    pub volatility_pct: f64,
    pub volatility_usd: Decimal,
    pub risk_budget_usd: Decimal,
    /// Final size in USD
    pub recommended_usd: Decimal,
    /// Final size in units
    pub recommended_size: Decimal,
    pub binding: SizingConstraint,
}

/// Everything sizing needs, gathered by the manager
#[derive(Debug, Clone)]
pub struct SizingInputs<'a> {
    pub symbol: &'a str,
    pub price: Decimal,
    pub portfolio_value: Decimal,
    pub volatility_pct: f64,
    pub kelly_fraction: f64,
    /// Market value of all open positions
    pub current_exposure: Decimal,
    pub open_positions: usize,
    pub limits: &'a RiskLimits,
}

pub fn size_position(inputs: &SizingInputs<'_>) -> Result<PositionSizing> {
    let limits = inputs.limits;
    if inputs.price <= Decimal::ZERO {
        return Err(RiskError::InvalidPrice(inputs.price));
    }
    if !inputs.volatility_pct.is_finite() || inputs.volatility_pct <= 0.0 {
        return Err(RiskError::InvalidVolatility {
            symbol: inputs.symbol.to_string(),
            value: inputs.volatility_pct,
        });
    }
    require_positive(to_f64(inputs.portfolio_value), "portfolio value")?;

    let pv = inputs.portfolio_value;
    let position_cap = pv * limits.max_position_pct / Decimal::ONE_HUNDRED;

    let kelly_usd = pv * to_decimal(inputs.kelly_fraction, "kelly fraction")?;

    // Scale the single-position allowance down for volatile symbols
    let vol_scale = (limits.target_volatility_pct / inputs.volatility_pct).min(1.0);
    let volatility_usd = position_cap * to_decimal(vol_scale, "volatility scale")?;

    let exposure_cap = pv * limits.max_total_exposure_pct / Decimal::ONE_HUNDRED;
    let remaining = (exposure_cap - inputs.current_exposure).max(Decimal::ZERO);
    let free_slots = limits.max_positions.saturating_sub(inputs.open_positions).max(1);
    let risk_budget_usd = remaining / Decimal::from(free_slots);

    let mut candidates = [
        (kelly_usd, SizingConstraint::Kelly),
        (volatility_usd, SizingConstraint::Volatility),
        (risk_budget_usd, SizingConstraint::RiskBudget),
        (position_cap, SizingConstraint::PositionPct),
        (limits.max_position_size_usd, SizingConstraint::MaxPositionUsd),
    ];
    // Stable: ties keep the earlier view
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    let (recommended_usd, binding) = candidates[0];
    let recommended_usd = recommended_usd.max(Decimal::ZERO);

    let recommended_size = checked_div(recommended_usd, inputs.price, "recommended size")?;

    debug!(
        "[RISK] Sizing {}: kelly={} vol={} budget={} -> {} ({:?})",
        inputs.symbol, kelly_usd, volatility_usd, risk_budget_usd, recommended_usd, binding
    );

    Ok(PositionSizing {
        symbol: inputs.symbol.to_string(),
        price: inputs.price,
        kelly_fraction: inputs.kelly_fraction,
        kelly_usd,
        volatility_pct: inputs.volatility_pct,
        volatility_usd,
        risk_budget_usd,
        recommended_usd,
        recommended_size,
        binding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Utc;
    use meridian_core::PositionSide;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kelly_capped() {
        let raw = kelly_fraction(0.6, 2.0, 1.0).unwrap();
        assert_relative_eq!(raw, 0.4, epsilon = 1e-12);

        let capped = kelly_fraction(0.6, 2.0, 0.25).unwrap();
        assert_relative_eq!(capped, 0.25);
    }

    #[test]
    fn test_kelly_floor_and_validation() {
        // Negative edge floors at zero
        assert_eq!(kelly_fraction(0.3, 1.0, 0.25).unwrap(), 0.0);
        assert!(kelly_fraction(1.2, 2.0, 0.25).is_err());
        assert!(kelly_fraction(0.5, 0.0, 0.25).is_err());
    }

    fn closed(pnl_exit: Decimal) -> Position {
        let mut p =
            Position::filled("BTC-USD", PositionSide::Long, dec!(1), dec!(100), dec!(0), Utc::now())
                .unwrap();
        p.close(dec!(1), pnl_exit, dec!(0), Utc::now()).unwrap();
        p
    }

    #[test]
    fn test_trade_stats() {
        let history = vec![closed(dec!(120)), closed(dec!(110)), closed(dec!(90))];
        let stats = TradeStats::from_closed(&history);

        assert_eq!(stats.trades, 3);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert_relative_eq!(stats.avg_win, 15.0);
        assert_relative_eq!(stats.win_loss_ratio().unwrap(), 1.5);

        // Below the minimum history the default fraction applies
        let limits = RiskLimits::default();
        assert_eq!(stats.kelly(&limits), limits.default_kelly_fraction);
    }

    fn inputs(limits: &RiskLimits) -> SizingInputs<'_> {
        SizingInputs {
            symbol: "ETH-USD",
            price: dec!(2000),
            portfolio_value: dec!(100000),
            volatility_pct: 40.0,
            kelly_fraction: 0.25,
            current_exposure: Decimal::ZERO,
            open_positions: 0,
            limits,
        }
    }

    #[test]
    fn test_min_of_views() {
        let limits = RiskLimits {
            max_position_size_usd: dec!(1000000),
            ..Default::default()
        };
        let sizing = size_position(&inputs(&limits)).unwrap();

        // kelly 25000, vol 20000 * 0.5, budget 100000 / 20, cap 20000
        assert_eq!(sizing.kelly_usd, dec!(25000));
        assert_eq!(sizing.volatility_usd, dec!(10000));
        assert_eq!(sizing.risk_budget_usd, dec!(5000));
        assert_eq!(sizing.recommended_usd, dec!(5000));
        assert_eq!(sizing.binding, SizingConstraint::RiskBudget);
        assert_eq!(sizing.recommended_size, dec!(2.5));
    }

    #[test]
    fn test_absolute_cap_applies() {
        let limits = RiskLimits {
            max_position_size_usd: dec!(1500),
            ..Default::default()
        };
        let sizing = size_position(&inputs(&limits)).unwrap();
        assert_eq!(sizing.recommended_usd, dec!(1500));
        assert_eq!(sizing.binding, SizingConstraint::MaxPositionUsd);
    }

    #[test]
    fn test_invalid_inputs() {
        let limits = RiskLimits::default();
        let mut bad = inputs(&limits);
        bad.price = dec!(0);
        assert_eq!(size_position(&bad), Err(RiskError::InvalidPrice(dec!(0))));

        let mut bad = inputs(&limits);
        bad.volatility_pct = 0.0;
        assert!(matches!(size_position(&bad), Err(RiskError::InvalidVolatility { .. })));

        let mut bad = inputs(&limits);
        bad.portfolio_value = dec!(0);
        assert!(matches!(size_position(&bad), Err(RiskError::Arithmetic(_))));
    }
}

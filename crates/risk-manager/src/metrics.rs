//! Point-in-time risk metrics
//!
//! Built from the rolling portfolio-value series plus a tracker summary.
//! Statistics come from `meridian_core::stats` so analytics reports the
//! same numbers.

use crate::limits::RiskLimits;
use chrono::{DateTime, Utc};
use meridian_core::math::{div_or, to_decimal_or_zero, to_f64};
use meridian_core::stats::{self, Drawdown};
use meridian_position_tracker::PortfolioSummary;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 25.0 {
            RiskLevel::Low
        } else if score < 50.0 {
            RiskLevel::Medium
        } else if score < 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub timestamp: DateTime<Utc>,
    pub portfolio_value: Decimal,
    /// Market value of open positions
    pub total_exposure: Decimal,
    pub exposure_pct: Decimal,

    /// One-period historical VaR at 95%, in USD
    pub var_95: Decimal,
    /// One-period historical VaR at 99%, in USD
    pub var_99: Decimal,
    /// Mean loss beyond the VaR95 cutoff, in USD
    pub expected_shortfall: Decimal,

    pub current_drawdown_pct: Decimal,
    pub max_drawdown_pct: Decimal,

    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    /// Annualized volatility of portfolio returns, percent
    pub volatility_pct: f64,
    /// Herfindahl index of symbol weights
    pub concentration: f64,

    pub position_count: usize,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Historical VaR: loss at the `pct` percentile of returns, scaled by value
pub fn value_at_risk(returns: &[f64], pct: f64, value: Decimal) -> Decimal {
    let Some(cutoff) = stats::percentile(returns, pct) else {
        return Decimal::ZERO;
    };
    let loss = (-cutoff).max(0.0);
    to_decimal_or_zero(loss, "value at risk") * value
}

/// Mean loss over returns at or below the 5th percentile
pub fn expected_shortfall(returns: &[f64], value: Decimal) -> Decimal {
    let Some(cutoff) = stats::percentile(returns, 5.0) else {
        return Decimal::ZERO;
    };
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= cutoff).collect();
    if tail.is_empty() {
        return Decimal::ZERO;
    }
    let loss = (-stats::mean(&tail)).max(0.0);
    to_decimal_or_zero(loss, "expected shortfall") * value
}

/// Weighted 0-100 score over drawdown, volatility, concentration and
/// position-count pressure
pub fn risk_score(
    current_drawdown_pct: f64,
    volatility_pct: f64,
    concentration: f64,
    position_count: usize,
    limits: &RiskLimits,
) -> f64 {
    let drawdown = (current_drawdown_pct / to_f64(limits.max_drawdown_pct).max(f64::EPSILON) * 100.0)
        .clamp(0.0, 100.0);
    let volatility = (volatility_pct / limits.max_volatility_pct.max(f64::EPSILON) * 100.0)
        .clamp(0.0, 100.0);
    let concentration = (concentration * 100.0).clamp(0.0, 100.0);
    let positions =
        (position_count as f64 / (limits.max_positions.max(1)) as f64 * 100.0).clamp(0.0, 100.0);

    0.30 * drawdown + 0.25 * volatility + 0.25 * concentration + 0.20 * positions
}

impl RiskMetrics {
    /// Compute metrics from a value series and the current book
    pub fn compute(
        values: &[Decimal],
        drawdown: &Drawdown,
        summary: &PortfolioSummary,
        portfolio_value: Decimal,
        limits: &RiskLimits,
        now: DateTime<Utc>,
    ) -> Self {
        let series: Vec<f64> = values.iter().map(|v| to_f64(*v)).collect();
        let returns = stats::simple_returns(&series);

        let volatility_pct = stats::annualized_volatility(&returns) * 100.0;
        let sharpe_ratio = stats::sharpe_ratio(&returns, limits.risk_free_rate);
        let sortino_ratio = stats::sortino_ratio(&returns, limits.risk_free_rate);

        let calmar_ratio = stats::series_calmar_ratio(&series, to_f64(drawdown.max_drawdown_pct));

        let weights: Vec<f64> = summary
            .weights(summary.total_value)
            .values()
            .map(|w| to_f64(*w))
            .collect();
        let concentration = stats::herfindahl(&weights);

        let risk_score = risk_score(
            to_f64(drawdown.current_drawdown_pct),
            volatility_pct,
            concentration,
            summary.open_positions,
            limits,
        );

        Self {
            timestamp: now,
            portfolio_value,
            total_exposure: summary.total_value,
            exposure_pct: div_or(summary.total_value, portfolio_value, Decimal::ZERO, "exposure pct")
                * Decimal::ONE_HUNDRED,
            var_95: value_at_risk(&returns, 5.0, portfolio_value),
            var_99: value_at_risk(&returns, 1.0, portfolio_value),
            expected_shortfall: expected_shortfall(&returns, portfolio_value),
            current_drawdown_pct: drawdown.current_drawdown_pct,
            max_drawdown_pct: drawdown.max_drawdown_pct,
            sharpe_ratio,
            sortino_ratio,
            calmar_ratio,
            volatility_pct,
            concentration,
            position_count: summary.open_positions,
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(74.9), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(75.0), RiskLevel::Critical);
    }

    #[test]
    fn test_var_uses_loss_tail() {
        let returns: Vec<f64> = (0..100).map(|i| (i as f64 - 50.0) / 1000.0).collect();
        // 5th percentile of -0.050..=0.049 interpolates to -0.04505
        let var = value_at_risk(&returns, 5.0, dec!(10000));
        assert_eq!(var.round_dp(2), dec!(450.50));

        let es = expected_shortfall(&returns, dec!(10000));
        assert!(es > var);

        // All gains, no loss at risk
        assert_eq!(value_at_risk(&[0.01, 0.02, 0.03], 5.0, dec!(10000)), Decimal::ZERO);
        assert_eq!(value_at_risk(&[], 5.0, dec!(10000)), Decimal::ZERO);
    }

    #[test]
    fn test_risk_score_weights() {
        let limits = RiskLimits::default();
        // Everything at or beyond its cap
        let max = risk_score(40.0, 300.0, 1.0, 40, &limits);
        assert_relative_eq!(max, 100.0, epsilon = 1e-9);

        let none = risk_score(0.0, 0.0, 0.0, 0, &limits);
        assert_relative_eq!(none, 0.0);

        // Single concentrated position only
        let concentrated = risk_score(0.0, 0.0, 1.0, 1, &limits);
        assert_relative_eq!(concentrated, 26.0, epsilon = 1e-9);
    }

    #[test]
    fn test_compute_on_flat_book() {
        let values = [dec!(100), dec!(110), dec!(90), dec!(105)];
        let drawdown = Drawdown::from_series(&values);
        let summary = PortfolioSummary::default();

        let metrics = RiskMetrics::compute(
            &values,
            &drawdown,
            &summary,
            dec!(105),
            &RiskLimits::default(),
            Utc::now(),
        );

        assert_eq!(metrics.max_drawdown_pct.round_dp(2), dec!(18.18));
        assert_eq!(metrics.current_drawdown_pct.round_dp(2), dec!(4.55));
        assert_eq!(metrics.position_count, 0);
        assert_eq!(metrics.concentration, 0.0);
        assert!(metrics.var_95 > Decimal::ZERO);
        assert!(metrics.volatility_pct > 0.0);
    }
}

//! Batched performance report

use crate::attribution::AttributionAnalysis;
use crate::metrics::PerformanceMetrics;
use chrono::{DateTime, Utc};
use meridian_core::Period;
use meridian_core::math::ratio_or;
use meridian_core::stats::{self, TRADING_DAYS_PER_YEAR};
use meridian_risk_manager::RiskMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub period: Period,
    pub benchmark_symbol: Option<String>,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    pub excess_return: f64,
    /// Annualized std dev of active returns
    pub tracking_error: f64,
    /// Annualized mean active return over tracking error
    pub information_ratio: f64,
    pub beta: Option<f64>,
}

impl BenchmarkComparison {
    pub fn compute(
        period: Period,
        benchmark_symbol: Option<String>,
        portfolio_returns: &[f64],
        benchmark_returns: &[f64],
        portfolio_return: f64,
        benchmark_return: f64,
    ) -> Self {
        let n = portfolio_returns.len().min(benchmark_returns.len());
        let active: Vec<f64> = portfolio_returns[portfolio_returns.len() - n..]
            .iter()
            .zip(&benchmark_returns[benchmark_returns.len() - n..])
            .map(|(p, b)| p - b)
            .collect();

        let annualizer = TRADING_DAYS_PER_YEAR.sqrt();
        let active_std = stats::std_dev(&active);
        Self {
            period,
            benchmark_symbol,
            portfolio_return,
            benchmark_return,
            excess_return: portfolio_return - benchmark_return,
            tracking_error: active_std * annualizer,
            information_ratio: ratio_or(stats::mean(&active), active_std, 0.0, "information ratio")
                * annualizer,
            beta: stats::beta(portfolio_returns, benchmark_returns),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: BTreeMap<Period, PerformanceMetrics>,
    /// Attribution over the longest requested period
    pub attribution: Option<AttributionAnalysis>,
    pub benchmark: Option<BenchmarkComparison>,
    pub risk: RiskMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tracking_error_zero_when_identical() {
        let returns = [0.01, -0.02, 0.015, 0.0];
        let cmp = BenchmarkComparison::compute(Period::Monthly, None, &returns, &returns, 0.1, 0.1);

        assert_relative_eq!(cmp.tracking_error, 0.0);
        // Zero tracking error is guarded, not infinite
        assert_eq!(cmp.information_ratio, 0.0);
        assert_relative_eq!(cmp.beta.unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_outperformance() {
        let bench = [0.01, -0.02, 0.015, 0.0];
        let port = [0.02, -0.01, 0.02, 0.006];
        let cmp = BenchmarkComparison::compute(Period::Monthly, Some("BTC-USD".into()), &port, &bench, 0.036, 0.004);

        assert!(cmp.tracking_error > 0.0);
        assert!(cmp.information_ratio > 0.0);
        assert_relative_eq!(cmp.excess_return, 0.032, epsilon = 1e-12);
    }
}

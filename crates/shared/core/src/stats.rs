//! Return statistics
//!
//! Shared by the risk manager and analytics so both report numerically
//! identical volatility, Sharpe, Sortino, Calmar and drawdown figures.
//! Money stays in `Decimal`; returns and ratios are `f64`.

use crate::math::{div_or, ratio_or};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Periods per year used for annualization
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simple period-over-period returns. Non-positive bases are skipped.
pub fn simple_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[0].is_finite() && w[1].is_finite())
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n - 1)
pub fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

/// Sample standard deviation
pub fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

/// Root mean square of shortfalls below `threshold`
pub fn downside_deviation(xs: &[f64], threshold: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = xs
        .iter()
        .map(|x| (x - threshold).min(0.0).powi(2))
        .sum();
    (sum_sq / xs.len() as f64).sqrt()
}

/// Sample covariance of two equally long series
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[a.len() - n..], &b[b.len() - n..]);
    let (ma, mb) = (mean(a), mean(b));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / (n - 1) as f64
}

/// Percentile with linear interpolation between closest ranks.
/// `pct` is in 0..=100.
pub fn percentile(xs: &[f64], pct: f64) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = xs.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Annualized volatility of per-period returns, as a fraction
pub fn annualized_volatility(returns: &[f64]) -> f64 {
    std_dev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

fn excess_returns(returns: &[f64], risk_free_annual: f64) -> Vec<f64> {
    let rf_period = risk_free_annual / TRADING_DAYS_PER_YEAR;
    returns.iter().map(|r| r - rf_period).collect()
}

/// Annualized Sharpe ratio of excess-over-risk-free returns
pub fn sharpe_ratio(returns: &[f64], risk_free_annual: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess = excess_returns(returns, risk_free_annual);
    ratio_or(mean(&excess), std_dev(&excess), 0.0, "sharpe ratio") * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized Sortino ratio (downside deviation of excess returns)
pub fn sortino_ratio(returns: &[f64], risk_free_annual: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let excess = excess_returns(returns, risk_free_annual);
    ratio_or(
        mean(&excess),
        downside_deviation(&excess, 0.0),
        0.0,
        "sortino ratio",
    ) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Annualized return over max drawdown (both fractions)
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> f64 {
    ratio_or(annualized_return, max_drawdown, 0.0, "calmar ratio")
}

/// `(1 + total)^(1 / years) - 1`
pub fn annualized_return(total_return: f64, years: f64) -> f64 {
    if years <= 0.0 || !years.is_finite() {
        return total_return;
    }
    if 1.0 + total_return <= 0.0 {
        return -1.0;
    }
    (1.0 + total_return).powf(1.0 / years) - 1.0
}

/// Years covered by `periods` returns, one period per trading day
pub fn periods_to_years(periods: usize) -> f64 {
    periods as f64 / TRADING_DAYS_PER_YEAR
}

/// Annualized first-to-last return of a value series.
///
/// Years come from the number of returns, not wall-clock time. Zero when
/// the series has no return, starts at a non-positive value or the
/// compounding overflows.
pub fn series_annualized_return(values: &[f64]) -> f64 {
    let periods = simple_returns(values).len();
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if *first > 0.0 && periods > 0 => {
            let annual = annualized_return(last / first - 1.0, periods_to_years(periods));
            if annual.is_finite() { annual } else { 0.0 }
        }
        _ => 0.0,
    }
}

/// Calmar ratio of a value series given its max drawdown in percent
pub fn series_calmar_ratio(values: &[f64], max_drawdown_pct: f64) -> f64 {
    calmar_ratio(series_annualized_return(values), max_drawdown_pct / 100.0)
}

/// Herfindahl index `Σ w²`
pub fn herfindahl(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w * w).sum()
}

/// Beta of `portfolio` against `benchmark` returns
pub fn beta(portfolio: &[f64], benchmark: &[f64]) -> Option<f64> {
    let n = portfolio.len().min(benchmark.len());
    if n < 2 {
        return None;
    }
    let bench = &benchmark[benchmark.len() - n..];
    let var = variance(bench);
    let cov = covariance(portfolio, benchmark);
    crate::math::checked_ratio(cov, var, "beta").ok()
}

/// Peak-to-trough drawdown of a value series, in percent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Drawdown {
    /// Highest value seen
    pub peak: Decimal,
    /// Worst drop from any running peak
    pub max_drawdown_pct: Decimal,
    /// Drop of the last value from the peak
    pub current_drawdown_pct: Decimal,
}

impl Drawdown {
    /// Fold one more observation into the running drawdown
    pub fn observe(&mut self, value: Decimal) {
        if value > self.peak {
            self.peak = value;
        }
        self.current_drawdown_pct = if self.peak > Decimal::ZERO {
            div_or(self.peak - value, self.peak, Decimal::ZERO, "drawdown") * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
        if self.current_drawdown_pct > self.max_drawdown_pct {
            self.max_drawdown_pct = self.current_drawdown_pct;
        }
    }

    /// Drawdown over a whole series
    pub fn from_series(values: &[Decimal]) -> Self {
        let mut dd = Self::default();
        for v in values {
            dd.observe(*v);
        }
        dd
    }
}

//! Per-period performance metrics

use chrono::{DateTime, Utc};
use meridian_core::math::{ratio_or, to_f64};
use meridian_core::stats::{self, Drawdown};
use meridian_core::{Period, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Time-stamped sample of a value series
pub type Sample = (DateTime<Utc>, Decimal);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub start_value: Decimal,
    pub end_value: Decimal,
    /// Samples inside the window
    pub observations: usize,

    /// Period return as a fraction
    pub total_return: f64,
    /// `(1 + R)^(1 / years) - 1`, one year per 252 returns
    pub annualized_return: f64,
    pub mean_return: f64,
    pub return_std: f64,
    /// Annualized, percent
    pub volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub max_drawdown_pct: Decimal,

    /// Positions closed inside the window
    pub trades: usize,
    pub win_rate: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    /// Gross profit over gross loss; `None` without losses
    pub profit_factor: Option<f64>,

    pub benchmark_return: Option<f64>,
    pub beta: Option<f64>,
    /// Jensen's alpha, annualized
    pub alpha: Option<f64>,

    pub computed_at: DateTime<Utc>,
}

/// Samples at or after `start`
pub fn window<'a>(samples: impl IntoIterator<Item = &'a Sample>, start: DateTime<Utc>) -> Vec<Sample> {
    samples.into_iter().filter(|(t, _)| *t >= start).copied().collect()
}

fn sample_values(samples: &[Sample]) -> Vec<f64> {
    samples.iter().map(|(_, v)| to_f64(*v)).collect()
}

pub fn series_returns(samples: &[Sample]) -> Vec<f64> {
    stats::simple_returns(&sample_values(samples))
}

/// First-to-last return of a window
pub fn total_return(samples: &[Sample]) -> Option<f64> {
    let (first, last) = (samples.first()?, samples.last()?);
    let first = to_f64(first.1);
    if first <= 0.0 || samples.len() < 2 {
        return None;
    }
    Some(to_f64(last.1) / first - 1.0)
}

/// Inputs for one period computation
pub struct MetricsInputs<'a> {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Portfolio values inside the window
    pub values: &'a [Sample],
    /// Benchmark prices inside the window
    pub benchmark: &'a [Sample],
    /// Positions closed inside the window
    pub closed: &'a [Position],
    pub risk_free_rate: f64,
}

impl PerformanceMetrics {
    pub fn compute(inputs: &MetricsInputs<'_>) -> Self {
        let values = inputs.values;
        let returns = series_returns(values);
        let total = total_return(values).unwrap_or(0.0);

        let end = values.last().map(|(t, _)| *t).unwrap_or(inputs.now);
        let series = sample_values(values);
        let annualized = stats::series_annualized_return(&series);

        let drawdown = Drawdown::from_series(&values.iter().map(|(_, v)| *v).collect::<Vec<_>>());
        let calmar = stats::series_calmar_ratio(&series, to_f64(drawdown.max_drawdown_pct));

        let (trades, win_rate, avg_win, avg_loss, profit_factor) = trade_stats(inputs.closed);

        let benchmark_returns = series_returns(inputs.benchmark);
        let benchmark_return = total_return(inputs.benchmark);
        let beta = stats::beta(&returns, &benchmark_returns);
        let alpha = match (beta, benchmark_return) {
            (Some(beta), Some(_)) => {
                let bench_annual = stats::series_annualized_return(&sample_values(inputs.benchmark));
                let rf = inputs.risk_free_rate;
                Some(annualized - (rf + beta * (bench_annual - rf)))
            }
            _ => None,
        };

        Self {
            period: inputs.period,
            start: inputs.start,
            end,
            start_value: values.first().map(|(_, v)| *v).unwrap_or(Decimal::ZERO),
            end_value: values.last().map(|(_, v)| *v).unwrap_or(Decimal::ZERO),
            observations: values.len(),
            total_return: total,
            annualized_return: annualized,
            mean_return: stats::mean(&returns),
            return_std: stats::std_dev(&returns),
            volatility_pct: stats::annualized_volatility(&returns) * 100.0,
            sharpe_ratio: stats::sharpe_ratio(&returns, inputs.risk_free_rate),
            sortino_ratio: stats::sortino_ratio(&returns, inputs.risk_free_rate),
            calmar_ratio: calmar,
            max_drawdown_pct: drawdown.max_drawdown_pct,
            trades,
            win_rate,
            avg_win,
            avg_loss,
            profit_factor,
            benchmark_return,
            beta,
            alpha,
            computed_at: inputs.now,
        }
    }
}

fn trade_stats(closed: &[Position]) -> (usize, f64, Decimal, Decimal, Option<f64>) {
    let pnls: Vec<Decimal> = closed
        .iter()
        .filter(|p| !p.filled_size.is_zero())
        .map(|p| p.realized_pnl)
        .collect();
    let wins: Vec<Decimal> = pnls.iter().copied().filter(|p| *p > Decimal::ZERO).collect();
    let losses: Vec<Decimal> = pnls.iter().copied().filter(|p| *p < Decimal::ZERO).collect();

    let gross_win: Decimal = wins.iter().copied().sum();
    let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();

    let avg = |sum: Decimal, n: usize| {
        if n == 0 {
            Decimal::ZERO
        } else {
            sum / Decimal::from(n)
        }
    };
    let win_rate = if pnls.is_empty() {
        0.0
    } else {
        wins.len() as f64 / pnls.len() as f64
    };
    let profit_factor = if losses.is_empty() {
        None
    } else {
        Some(ratio_or(to_f64(gross_win), to_f64(gross_loss), 0.0, "profit factor"))
    };

    (
        pnls.len(),
        win_rate,
        avg(gross_win, wins.len()),
        avg(gross_loss, losses.len()),
        profit_factor,
    )
}

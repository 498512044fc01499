//! Analytics engine
//!
//! Keeps the portfolio-value and benchmark series, computes per-period
//! metrics on demand and caches them per period.

use crate::attribution::{self, AttributionAnalysis};
use crate::config::AnalyticsConfig;
use crate::metrics::{self, MetricsInputs, PerformanceMetrics, Sample};
use crate::report::{BenchmarkComparison, PerformanceReport};
use chrono::{DateTime, Utc};
use log::{debug, info};
use meridian_core::{Period, TtlCache};
use meridian_ports::Clock;
use meridian_position_tracker::PositionTracker;
use meridian_risk_manager::RiskManager;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct AnalyticsState {
    values: VecDeque<Sample>,
    benchmark: VecDeque<Sample>,
}

pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskManager>,
    clock: Arc<dyn Clock>,
    inception: DateTime<Utc>,
    cache: TtlCache<Period, PerformanceMetrics>,
    state: RwLock<AnalyticsState>,
}

impl AnalyticsEngine {
    pub fn new(
        config: AnalyticsConfig,
        tracker: Arc<PositionTracker>,
        risk: Arc<RiskManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let inception = clock.now();
        let cache = TtlCache::new(config.cache_ttl());
        Self {
            config,
            tracker,
            risk,
            clock,
            inception,
            cache,
            state: RwLock::new(AnalyticsState::default()),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn inception(&self) -> DateTime<Utc> {
        self.inception
    }

    pub fn record_portfolio_value(&self, value: Decimal) {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.values.push_back((now, value));
        while state.values.len() > self.config.value_history_len {
            state.values.pop_front();
        }
    }

    pub fn record_benchmark_price(&self, price: Decimal) {
        if price <= Decimal::ZERO {
            return;
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        state.benchmark.push_back((now, price));
        while state.benchmark.len() > self.config.benchmark_history_len {
            state.benchmark.pop_front();
        }
    }

    /// Restore value history, e.g. after a restart
    pub fn restore_values(&self, values: Vec<Sample>) {
        let mut state = self.state.write();
        state.values = values.into_iter().collect();
        self.cache.clear();
    }

    pub fn value_history(&self) -> Vec<Sample> {
        self.state.read().values.iter().copied().collect()
    }

    /// Windows of both series for `period`
    fn windows(&self, period: Period, now: DateTime<Utc>) -> (DateTime<Utc>, Vec<Sample>, Vec<Sample>) {
        let start = period.start(now, self.inception);
        let state = self.state.read();
        (
            start,
            metrics::window(&state.values, start),
            metrics::window(&state.benchmark, start),
        )
    }

    /// Metrics for `period`, served from cache while fresh
    pub fn calculate_metrics(&self, period: Period) -> PerformanceMetrics {
        let now = self.clock.now();
        if let Some(cached) = self.cache.get(&period, now) {
            return cached;
        }

        let (start, values, benchmark) = self.windows(period, now);
        let closed = self.tracker.closed_since(start);
        let computed = PerformanceMetrics::compute(&MetricsInputs {
            period,
            start,
            now,
            values: &values,
            benchmark: &benchmark,
            closed: &closed,
            risk_free_rate: self.config.risk_free_rate,
        });

        debug!(
            "[ANALYTICS] {} metrics: return {:.4}, sharpe {:.2}, {} samples",
            period, computed.total_return, computed.sharpe_ratio, computed.observations
        );
        self.cache.insert(period, computed.clone(), now);
        computed
    }

    pub fn calculate_attribution(&self, period: Period) -> AttributionAnalysis {
        let metrics = self.calculate_metrics(period);
        let now = self.clock.now();
        let open = self.tracker.open_positions();
        let closed = self.tracker.closed_since(metrics.start);
        let (asset_contribution, strategy_contribution) = attribution::contributions(&open, &closed);

        let benchmark_return = metrics.benchmark_return.unwrap_or(0.0);
        let beta = metrics.beta.unwrap_or(1.0);
        let (market_effect, selection_effect, interaction_effect) =
            attribution::effects(metrics.total_return, benchmark_return, beta);

        AttributionAnalysis {
            period,
            portfolio_return: metrics.total_return,
            benchmark_return,
            asset_contribution,
            strategy_contribution,
            market_effect,
            selection_effect,
            interaction_effect,
            computed_at: now,
        }
    }

    pub fn benchmark_comparison(&self, period: Period) -> Option<BenchmarkComparison> {
        let now = self.clock.now();
        let (_, values, benchmark) = self.windows(period, now);
        let benchmark_return = metrics::total_return(&benchmark)?;
        let portfolio_return = metrics::total_return(&values).unwrap_or(0.0);

        Some(BenchmarkComparison::compute(
            period,
            self.config.benchmark_symbol.clone(),
            &metrics::series_returns(&values),
            &metrics::series_returns(&benchmark),
            portfolio_return,
            benchmark_return,
        ))
    }

    /// Metrics for every requested period, attribution and benchmark
    /// comparison over the longest one, and a risk snapshot
    pub fn generate_report(&self, periods: &[Period]) -> PerformanceReport {
        let periods: Vec<Period> = if periods.is_empty() {
            Period::ALL.to_vec()
        } else {
            periods.to_vec()
        };

        let metrics: BTreeMap<Period, PerformanceMetrics> = periods
            .iter()
            .map(|p| (*p, self.calculate_metrics(*p)))
            .collect();

        // Periods are ordered shortest to longest
        let longest = periods.iter().max().copied();
        let attribution = longest.map(|p| self.calculate_attribution(p));
        let benchmark = longest.and_then(|p| self.benchmark_comparison(p));

        info!("[ANALYTICS] Report generated for {} periods", metrics.len());
        PerformanceReport {
            generated_at: self.clock.now(),
            metrics,
            attribution,
            benchmark,
            risk: self.risk.calculate_risk_metrics(),
        }
    }

    /// Evict stale cached metrics
    pub fn sweep_cache(&self) -> usize {
        let evicted = self.cache.sweep(self.clock.now());
        if evicted > 0 {
            debug!("[ANALYTICS] Swept {} cached periods", evicted);
        }
        evicted
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

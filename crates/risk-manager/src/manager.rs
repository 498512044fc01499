//! Risk Manager
//!
//! Owns the rolling portfolio-value series, per-symbol price history,
//! trade timestamps, violations and the cooling-off window. Position data
//! is read from the tracker as copies.

use crate::decision::{RiskDecision, RiskViolation, ViolationKind};
use crate::error::{Result, RiskError};
use crate::limits::RiskLimits;
use crate::metrics::RiskMetrics;
use crate::sizing::{self, PositionSizing, SizingInputs, TradeStats};
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use meridian_core::math::{checked_div, to_f64};
use meridian_core::stats::{self, Drawdown};
use meridian_core::{PositionSide, TtlCache};
use meridian_ports::Clock;
use meridian_position_tracker::PositionTracker;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Full risk picture for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub metrics: RiskMetrics,
    pub limits: RiskLimits,
    pub recent_violations: Vec<RiskViolation>,
    pub cooling_off_until: Option<DateTime<Utc>>,
    pub trades_last_hour: usize,
    pub trades_last_day: usize,
}

#[derive(Debug, Default)]
struct RiskState {
    values: VecDeque<(DateTime<Utc>, Decimal)>,
    drawdown: Drawdown,
    prices: HashMap<String, VecDeque<Decimal>>,
    trades: VecDeque<DateTime<Utc>>,
    violations: VecDeque<RiskViolation>,
    cooling_off_until: Option<DateTime<Utc>>,
}

impl RiskState {
    fn trades_since(&self, since: DateTime<Utc>) -> usize {
        self.trades.iter().rev().take_while(|t| **t > since).count()
    }

    fn cooling_off_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.cooling_off_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }
}

pub struct RiskManager {
    limits: RiskLimits,
    initial_capital: Decimal,
    tracker: Arc<PositionTracker>,
    clock: Arc<dyn Clock>,
    volatility_cache: TtlCache<String, f64>,
    state: RwLock<RiskState>,
}

impl RiskManager {
    pub fn new(
        limits: RiskLimits,
        initial_capital: Decimal,
        tracker: Arc<PositionTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let volatility_cache = TtlCache::new(limits.volatility_ttl());
        Self {
            limits,
            initial_capital,
            tracker,
            clock,
            volatility_cache,
            state: RwLock::new(RiskState::default()),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Latest recorded portfolio value, or initial capital before any sample
    pub fn portfolio_value(&self) -> Decimal {
        self.state
            .read()
            .values
            .back()
            .map(|(_, v)| *v)
            .unwrap_or(self.initial_capital)
    }

    pub fn drawdown(&self) -> Drawdown {
        self.state.read().drawdown
    }

    /// Append a portfolio-value sample and update the running drawdown
    pub fn record_portfolio_value(&self, value: Decimal) {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.values.push_back((now, value));
        while state.values.len() > self.limits.value_history_len {
            state.values.pop_front();
        }
        state.drawdown.observe(value);
        debug!(
            "[RISK] Portfolio value {} (drawdown {}%)",
            value,
            state.drawdown.current_drawdown_pct.round_dp(2)
        );
    }

    /// Append a price to the symbol's rolling history
    pub fn record_price(&self, symbol: &str, price: Decimal) {
        if price <= Decimal::ZERO {
            warn!("[RISK] Ignoring non-positive price {} for {}", price, symbol);
            return;
        }
        let mut state = self.state.write();
        let history = state.prices.entry(symbol.to_string()).or_default();
        history.push_back(price);
        while history.len() > self.limits.price_history_len {
            history.pop_front();
        }
    }

    /// Most recent recorded price for `symbol`
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.state.read().prices.get(symbol)?.back().copied()
    }

    /// Count an executed trade toward the frequency windows
    pub fn record_trade(&self) {
        let now = self.clock.now();
        let mut state = self.state.write();
        state.trades.push_back(now);
        let horizon = now - Duration::days(1);
        while state.trades.front().is_some_and(|t| *t <= horizon) {
            state.trades.pop_front();
        }
    }

    /// Annualized volatility of a symbol's price history, in percent.
    ///
    /// Cached per symbol; `None` until at least two returns exist.
    pub fn symbol_volatility(&self, symbol: &str) -> Option<f64> {
        let now = self.clock.now();
        let key = symbol.to_string();
        if let Some(cached) = self.volatility_cache.get(&key, now) {
            return Some(cached);
        }

        let prices: Vec<f64> = {
            let state = self.state.read();
            state.prices.get(symbol)?.iter().map(|p| to_f64(*p)).collect()
        };
        let returns = stats::simple_returns(&prices);
        if returns.len() < 2 {
            return None;
        }
        let vol = stats::annualized_volatility(&returns) * 100.0;
        self.volatility_cache.insert(key, vol, now);
        Some(vol)
    }

    /// Volatilities for every symbol with enough history
    pub fn volatilities(&self) -> HashMap<String, f64> {
        let symbols: Vec<String> = self.state.read().prices.keys().cloned().collect();
        symbols
            .into_iter()
            .filter_map(|s| self.symbol_volatility(&s).map(|v| (s, v)))
            .collect()
    }

    /// Evict expired volatility entries
    pub fn sweep_cache(&self) -> usize {
        self.volatility_cache.sweep(self.clock.now())
    }

    pub fn cooling_off_until(&self) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.state
            .read()
            .cooling_off_until
            .filter(|until| *until > now)
    }

    pub fn recent_violations(&self, limit: usize) -> Vec<RiskViolation> {
        let state = self.state.read();
        state.violations.iter().rev().take(limit).cloned().collect()
    }

    fn record_violation(
        &self,
        state: &mut RiskState,
        kind: ViolationKind,
        symbol: Option<&str>,
        message: String,
        now: DateTime<Utc>,
    ) {
        warn!("[RISK] Violation {:?}: {}", kind, message);
        state.violations.push_back(RiskViolation {
            kind,
            symbol: symbol.map(str::to_string),
            message,
            timestamp: now,
        });
        while state.violations.len() > self.limits.violation_history_len {
            state.violations.pop_front();
        }

        if kind.starts_cooling_off() {
            let until = now + self.limits.cooling_off();
            // Never shorten an active window
            if state.cooling_off_until.is_none_or(|current| current < until) {
                error!("[RISK] Cooling-off until {} after {:?}", until, kind);
                state.cooling_off_until = Some(until);
            }
        }
    }

    /// Pre-trade check for opening `size` units of `symbol` at `price`.
    ///
    /// Checks run in a fixed order and the first Block or Limit wins. A
    /// volatility warning does not stop the remaining checks.
    pub fn check_position_risk(
        &self,
        symbol: &str,
        size: Decimal,
        price: Decimal,
        side: PositionSide,
    ) -> Result<RiskDecision> {
        if price <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice(price));
        }
        if size <= Decimal::ZERO {
            return Err(RiskError::InvalidSize(size));
        }

        // Tracker first, then our own lock
        let summary = self.tracker.portfolio_summary();
        let volatility = self.symbol_volatility(symbol);
        let now = self.clock.now();
        let portfolio_value = self.portfolio_value();
        let value = size * price;
        let limits = &self.limits;

        let mut state = self.state.write();

        if let Some(remaining) = state.cooling_off_remaining(now) {
            let secs = remaining.num_seconds().max(0) as u64 + u64::from(remaining.subsec_nanos() > 0);
            return Ok(RiskDecision::block(format!(
                "cooling-off active for {}s",
                secs
            ))
            .with_retry_after(secs));
        }

        if value < limits.min_position_size_usd {
            let msg = format!(
                "{} position value {} below minimum {}",
                symbol, value, limits.min_position_size_usd
            );
            self.record_violation(&mut state, ViolationKind::PositionSize, Some(symbol), msg.clone(), now);
            return Ok(RiskDecision::block(msg));
        }
        if value > limits.max_position_size_usd {
            let msg = format!(
                "{} position value {} above maximum {}",
                symbol, value, limits.max_position_size_usd
            );
            self.record_violation(&mut state, ViolationKind::PositionSize, Some(symbol), msg.clone(), now);
            return Ok(RiskDecision::block(msg));
        }

        let position_pct = match checked_div(value, portfolio_value, "position pct") {
            Ok(ratio) => ratio * Decimal::ONE_HUNDRED,
            Err(e) => {
                warn!("[RISK] {}", e);
                return Ok(RiskDecision::block(format!(
                    "portfolio value {} cannot size positions",
                    portfolio_value
                )));
            }
        };
        if position_pct > limits.max_position_pct {
            let msg = format!(
                "{} position is {}% of portfolio, limit {}%",
                symbol,
                position_pct.round_dp(2),
                limits.max_position_pct
            );
            self.record_violation(&mut state, ViolationKind::PositionPct, Some(symbol), msg.clone(), now);
            return Ok(RiskDecision::limit(msg));
        }

        let exposure_pct = (summary.symbol_value(symbol) + value) / portfolio_value * Decimal::ONE_HUNDRED;
        if exposure_pct > limits.max_symbol_exposure_pct {
            let msg = format!(
                "{} exposure would be {}%, limit {}%",
                symbol,
                exposure_pct.round_dp(2),
                limits.max_symbol_exposure_pct
            );
            self.record_violation(&mut state, ViolationKind::SymbolExposure, Some(symbol), msg.clone(), now);
            return Ok(RiskDecision::limit(msg));
        }

        if summary.open_positions >= limits.max_positions {
            let msg = format!(
                "{} open positions, limit {}",
                summary.open_positions, limits.max_positions
            );
            self.record_violation(&mut state, ViolationKind::PositionCount, Some(symbol), msg.clone(), now);
            return Ok(RiskDecision::limit(msg));
        }

        if let Some(decision) = self.check_frequency(&mut state, now) {
            return Ok(decision);
        }

        let mut outcome = RiskDecision::allow();
        if let Some(vol) = volatility
            && vol > limits.max_volatility_pct
        {
            let msg = format!(
                "{} volatility {:.1}% above {:.1}%",
                symbol, vol, limits.max_volatility_pct
            );
            self.record_violation(&mut state, ViolationKind::Volatility, Some(symbol), msg.clone(), now);
            outcome = RiskDecision::warn(msg);
        }

        if state.drawdown.current_drawdown_pct > limits.max_daily_loss_pct {
            let msg = format!(
                "drawdown {}% exceeds daily loss limit {}%",
                state.drawdown.current_drawdown_pct.round_dp(2),
                limits.max_daily_loss_pct
            );
            self.record_violation(&mut state, ViolationKind::DailyLoss, None, msg.clone(), now);
            return Ok(RiskDecision::block(msg));
        }

        debug!(
            "[RISK] {:?} {} {} @ {}: {:?}",
            side, size, symbol, price, outcome.outcome
        );
        Ok(outcome)
    }

    fn check_frequency(&self, state: &mut RiskState, now: DateTime<Utc>) -> Option<RiskDecision> {
        let windows = [
            (Duration::minutes(1), self.limits.max_trades_per_minute, "minute"),
            (Duration::hours(1), self.limits.max_trades_per_hour, "hour"),
            (Duration::days(1), self.limits.max_trades_per_day, "day"),
        ];
        for (window, max, label) in windows {
            let count = state.trades_since(now - window);
            if count >= max {
                let retry = state
                    .trades
                    .iter()
                    .rev()
                    .take_while(|t| **t > now - window)
                    .last()
                    .map(|oldest| (*oldest + window - now).num_seconds().max(1) as u64);
                let msg = format!("{} trades in the last {}, limit {}", count, label, max);
                self.record_violation(state, ViolationKind::TradeFrequency, None, msg.clone(), now);
                let decision = RiskDecision::limit(msg);
                return Some(match retry {
                    Some(secs) => decision.with_retry_after(secs),
                    None => decision,
                });
            }
        }
        None
    }

    /// Risk check for one rebalance trade.
    ///
    /// Buys are treated as new positions. Sells only reduce exposure, so
    /// they skip the size and exposure limits but still respect trade
    /// frequency.
    pub fn check_rebalance_trade(
        &self,
        symbol: &str,
        usd_amount: Decimal,
        price: Decimal,
        is_buy: bool,
    ) -> Result<RiskDecision> {
        if is_buy {
            let size = checked_div(usd_amount, price, "rebalance size")?;
            return self.check_position_risk(symbol, size, price, PositionSide::Long);
        }
        let now = self.clock.now();
        let mut state = self.state.write();
        Ok(self
            .check_frequency(&mut state, now)
            .unwrap_or_else(RiskDecision::allow))
    }

    /// Periodic audit of drawdown and position count.
    ///
    /// Returns the violations found; breaches start cooling-off.
    pub fn check_risk_limits(&self) -> Vec<RiskViolation> {
        let open = self.tracker.open_count();
        let now = self.clock.now();
        let mut state = self.state.write();
        let mut found = Vec::new();

        let drawdown = state.drawdown.current_drawdown_pct;
        if drawdown > self.limits.max_drawdown_pct {
            let msg = format!(
                "drawdown {}% exceeds limit {}%",
                drawdown.round_dp(2),
                self.limits.max_drawdown_pct
            );
            self.record_violation(&mut state, ViolationKind::Drawdown, None, msg, now);
            found.extend(state.violations.back().cloned());
        }
        if open > self.limits.max_positions {
            let msg = format!("{} open positions exceed limit {}", open, self.limits.max_positions);
            self.record_violation(&mut state, ViolationKind::PositionCount, None, msg, now);
            found.extend(state.violations.back().cloned());
        }
        found
    }

    pub fn calculate_risk_metrics(&self) -> RiskMetrics {
        let summary = self.tracker.portfolio_summary();
        let now = self.clock.now();
        let state = self.state.read();
        let values: Vec<Decimal> = state.values.iter().map(|(_, v)| *v).collect();
        let portfolio_value = values.last().copied().unwrap_or(self.initial_capital);
        RiskMetrics::compute(
            &values,
            &state.drawdown,
            &summary,
            portfolio_value,
            &self.limits,
            now,
        )
    }

    /// Recommended size for a new position in `symbol` at `price`
    pub fn calculate_optimal_position_size(
        &self,
        symbol: &str,
        price: Decimal,
    ) -> Result<PositionSizing> {
        let stats = TradeStats::from_closed(&self.tracker.closed_positions());
        let summary = self.tracker.portfolio_summary();

        let volatility_pct = match self.symbol_volatility(symbol) {
            Some(vol) => vol,
            None => {
                warn!(
                    "[RISK] No price history for {}, assuming {}% volatility",
                    symbol, self.limits.default_volatility_pct
                );
                self.limits.default_volatility_pct
            }
        };

        sizing::size_position(&SizingInputs {
            symbol,
            price,
            portfolio_value: self.portfolio_value(),
            volatility_pct,
            kelly_fraction: stats.kelly(&self.limits),
            current_exposure: summary.total_value,
            open_positions: summary.open_positions,
            limits: &self.limits,
        })
    }

    pub fn risk_report(&self) -> RiskReport {
        let metrics = self.calculate_risk_metrics();
        let now = self.clock.now();
        let state = self.state.read();
        RiskReport {
            metrics,
            limits: self.limits.clone(),
            recent_violations: state.violations.iter().rev().take(20).cloned().collect(),
            cooling_off_until: state.cooling_off_until.filter(|u| *u > now),
            trades_last_hour: state.trades_since(now - Duration::hours(1)),
            trades_last_day: state.trades_since(now - Duration::days(1)),
        }
    }

    /// Lift an active cooling-off window (manual intervention)
    pub fn clear_cooling_off(&self) {
        let mut state = self.state.write();
        if state.cooling_off_until.take().is_some() {
            info!("[RISK] Cooling-off cleared");
        }
    }
}

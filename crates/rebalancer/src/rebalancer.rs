//! Rebalancer
//!
//! Measures drift against target allocations, builds plans and executes
//! them one trade at a time. Every trade is re-checked by the risk manager
//! right before it is sent, and the executor call is bounded by a timeout.

use crate::config::{RebalanceConfig, RebalanceStrategy};
use crate::error::{RebalanceError, Result};
use crate::plan::{DriftReport, RebalanceResult, RebalanceTarget, TradeAction};
use crate::strategies::{self, PlanInputs};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use meridian_core::PositionSide;
use meridian_ports::{Clock, TradeExecutor, TradeFill};
use meridian_position_tracker::{OpenRequest, PositionTracker};
use meridian_risk_manager::RiskManager;
use parking_lot::RwLock;
use priority_queue::PriorityQueue;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

/// Why a single plan trade failed
#[derive(Debug)]
enum TradeFailure {
    /// Nothing reached the venue
    NotSent(String),
    /// The venue filled but the tracker could not book the fill
    Unbooked { fill: TradeFill, reason: String },
}

#[derive(Debug)]
struct RebalanceState {
    targets: BTreeMap<String, Decimal>,
    history: Vec<RebalanceResult>,
    last_rebalance: DateTime<Utc>,
}

pub struct Rebalancer {
    config: RebalanceConfig,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskManager>,
    executor: Arc<dyn TradeExecutor>,
    clock: Arc<dyn Clock>,
    state: RwLock<RebalanceState>,
    /// Held for the duration of `execute_plan`
    executing: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl Rebalancer {
    pub fn new(
        config: RebalanceConfig,
        tracker: Arc<PositionTracker>,
        risk: Arc<RiskManager>,
        executor: Arc<dyn TradeExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        // Engine start counts as the first rebalance
        let last_rebalance = clock.now();
        Self {
            config,
            tracker,
            risk,
            executor,
            clock,
            state: RwLock::new(RebalanceState {
                targets: BTreeMap::new(),
                history: Vec::new(),
                last_rebalance,
            }),
            executing: Mutex::new(()),
            shutdown,
        }
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Validate and normalize weights so they sum to 1
    pub fn normalize_allocations(
        allocations: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, Decimal>> {
        if allocations.is_empty() {
            return Err(RebalanceError::InvalidAllocation("empty allocation".into()));
        }
        let mut weights = BTreeMap::new();
        for (symbol, weight) in allocations {
            if symbol.trim().is_empty() {
                return Err(RebalanceError::InvalidAllocation("empty symbol".into()));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(RebalanceError::InvalidAllocation(format!(
                    "{} has weight {}",
                    symbol, weight
                )));
            }
            let weight = Decimal::from_f64(*weight).ok_or_else(|| {
                RebalanceError::InvalidAllocation(format!("{} weight not representable", symbol))
            })?;
            weights.insert(symbol.clone(), weight);
        }

        let total: Decimal = weights.values().copied().sum();
        if total <= Decimal::ZERO {
            return Err(RebalanceError::InvalidAllocation("weights sum to zero".into()));
        }
        if total != Decimal::ONE {
            debug!("[REBALANCE] Normalizing weights summing to {}", total);
        }
        Ok(weights.into_iter().map(|(s, w)| (s, w / total)).collect())
    }

    pub fn set_target_allocations(
        &self,
        allocations: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, Decimal>> {
        let weights = Self::normalize_allocations(allocations)?;
        info!("[REBALANCE] Target allocations set for {} symbols", weights.len());
        self.state.write().targets = weights.clone();
        Ok(weights)
    }

    pub fn target_allocations(&self) -> BTreeMap<String, Decimal> {
        self.state.read().targets.clone()
    }

    pub fn history(&self) -> Vec<RebalanceResult> {
        self.state.read().history.clone()
    }

    pub fn last_rebalance(&self) -> DateTime<Utc> {
        self.state.read().last_rebalance
    }

    /// Reload targets and history from persistence
    pub fn restore(&self, targets: BTreeMap<String, Decimal>, history: Vec<RebalanceResult>) {
        let mut state = self.state.write();
        if let Some(last) = history
            .iter()
            .filter(|r| !r.dry_run && r.actual_trades > 0)
            .filter_map(|r| r.completed_at)
            .max()
        {
            state.last_rebalance = last;
        }
        state.targets = targets;
        state.history = history;
        info!(
            "[REBALANCE] Restored {} targets, {} past rebalances",
            state.targets.len(),
            state.history.len()
        );
    }

    /// Stop executing trades at the next trade boundary
    pub fn request_stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// Allow execution again after [`request_stop`](Self::request_stop)
    pub fn resume(&self) {
        self.shutdown.send_replace(false);
    }

    fn prices(&self) -> BTreeMap<String, Decimal> {
        let mut prices = self.tracker.portfolio_summary().prices();
        for symbol in self.state.read().targets.keys() {
            if let Some(price) = self.risk.last_price(symbol) {
                prices.insert(symbol.clone(), price);
            }
        }
        prices
    }

    pub fn calculate_drift(&self) -> DriftReport {
        let summary = self.tracker.portfolio_summary();
        let portfolio_value = self.risk.portfolio_value();
        let state = self.state.read();

        let current_weights = summary.weights(portfolio_value);
        let mut per_symbol = BTreeMap::new();
        for symbol in state.targets.keys().chain(current_weights.keys()) {
            let current = current_weights.get(symbol).copied().unwrap_or(Decimal::ZERO);
            let target = state.targets.get(symbol).copied().unwrap_or(Decimal::ZERO);
            per_symbol.insert(symbol.clone(), (current - target) * Decimal::ONE_HUNDRED);
        }
        let max_drift = per_symbol
            .values()
            .map(|d| d.abs())
            .max()
            .unwrap_or(Decimal::ZERO);
        let interval_due = self.clock.elapsed_since(state.last_rebalance) >= self.config.rebalance_interval();
        let requires_rebalance =
            !state.targets.is_empty() && (max_drift > self.config.max_drift_pct || interval_due);

        DriftReport {
            per_symbol,
            max_drift,
            requires_rebalance,
            interval_due,
            current_weights,
            target_weights: state.targets.clone(),
            portfolio_value,
        }
    }

    /// Build a plan with `strategy` against stored or custom targets
    pub fn create_plan(
        &self,
        strategy: RebalanceStrategy,
        reason: &str,
        custom_targets: Option<&BTreeMap<String, f64>>,
    ) -> Result<RebalanceResult> {
        let targets = match custom_targets {
            Some(custom) => Self::normalize_allocations(custom)?,
            None => self.target_allocations(),
        };
        if targets.is_empty() {
            return Err(RebalanceError::NoTargets);
        }

        let summary = self.tracker.portfolio_summary();
        let volatilities = self.risk.volatilities();
        let prices = self.prices();
        let inputs = PlanInputs {
            targets: &targets,
            current_value: self.risk.portfolio_value(),
            summary: &summary,
            volatilities: &volatilities,
            prices: &prices,
            config: &self.config,
        };

        let planned = strategies::build_targets(strategy, &inputs);
        let plan = RebalanceResult::new(
            strategy,
            reason,
            planned,
            self.config.cost_rate(),
            self.config.dry_run,
            self.clock.now(),
        );
        info!(
            "[REBALANCE] Plan {} ({}): {} trades, expected cost {}",
            plan.id, strategy, plan.expected_trades, plan.expected_cost
        );
        Ok(plan)
    }

    /// Execute a plan trade by trade.
    ///
    /// Returns the completed result, which is also appended to history.
    /// Only one plan executes at a time.
    pub async fn execute_plan(&self, mut plan: RebalanceResult) -> Result<RebalanceResult> {
        let _guard = self
            .executing
            .try_lock()
            .map_err(|_| RebalanceError::AlreadyRunning)?;

        if plan.dry_run {
            info!("[REBALANCE] Dry run {}, nothing sent", plan.id);
            plan.success = true;
            plan.completed_at = Some(self.clock.now());
            self.state.write().history.push(plan.clone());
            return Ok(plan);
        }

        let portfolio_value = self.risk.portfolio_value();
        let max_cost = portfolio_value * self.config.max_rebalance_cost_pct / Decimal::ONE_HUNDRED;
        if plan.expected_cost > max_cost {
            let msg = format!(
                "expected cost {} exceeds {}% of portfolio ({})",
                plan.expected_cost, self.config.max_rebalance_cost_pct, max_cost
            );
            warn!("[REBALANCE] Plan {} rejected: {}", plan.id, msg);
            plan.fail(msg, self.clock.now());
            self.state.write().history.push(plan.clone());
            return Ok(plan);
        }

        let mut queue = PriorityQueue::new();
        for (index, target) in plan.targets.iter().enumerate() {
            if target.is_trade() {
                queue.push(index, (target.priority, target.usd_amount));
            }
        }

        let mut shutdown = self.shutdown.subscribe();
        let delay = Duration::from_millis(self.config.trade_delay_ms);
        let mut errors = Vec::new();

        while let Some((index, _)) = queue.pop() {
            if *shutdown.borrow() {
                errors.push(format!("stopped with {} trades pending", queue.len() + 1));
                break;
            }

            let target = plan.targets[index].clone();
            match self.execute_target(&target, plan.strategy).await {
                Ok(fill) => {
                    plan.actual_trades += 1;
                    plan.actual_cost += fill.fee;
                }
                Err(TradeFailure::NotSent(msg)) => {
                    warn!("[REBALANCE] {} {}: {}", target.symbol, action_str(target.action), msg);
                    errors.push(format!("{}: {}", target.symbol, msg));
                }
                Err(TradeFailure::Unbooked { fill, reason }) => {
                    // The venue traded, so the trade and its fee count
                    plan.actual_trades += 1;
                    plan.actual_cost += fill.fee;
                    error!(
                        "[REBALANCE] {} {} {} @ {} filled but not booked: {}",
                        target.symbol,
                        action_str(target.action),
                        fill.filled_size,
                        fill.price,
                        reason
                    );
                    errors.push(format!(
                        "{}: filled {} @ {} but not booked: {}",
                        target.symbol, fill.filled_size, fill.price, reason
                    ));
                }
            }

            if !queue.is_empty() && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            errors.push(format!("stopped with {} trades pending", queue.len()));
                            break;
                        }
                    }
                }
            }
        }

        let now = self.clock.now();
        plan.success = errors.is_empty();
        plan.errors = errors;
        plan.completed_at = Some(now);

        info!(
            "[REBALANCE] Plan {} done: {}/{} trades, cost {}, {} errors",
            plan.id,
            plan.actual_trades,
            plan.expected_trades,
            plan.actual_cost,
            plan.errors.len()
        );

        let mut state = self.state.write();
        if plan.actual_trades > 0 {
            state.last_rebalance = now;
        }
        state.history.push(plan.clone());
        Ok(plan)
    }

    /// Risk-check, send and book one trade. Errors are reported as text
    /// on the plan rather than aborting it.
    async fn execute_target(
        &self,
        target: &RebalanceTarget,
        strategy: RebalanceStrategy,
    ) -> std::result::Result<TradeFill, TradeFailure> {
        let is_buy = target.action == TradeAction::Buy;
        let price = target
            .limit_price
            .or_else(|| self.risk.last_price(&target.symbol))
            .or_else(|| self.prices().get(&target.symbol).copied())
            .ok_or_else(|| TradeFailure::NotSent("no reference price".to_string()))?;

        let decision = self
            .risk
            .check_rebalance_trade(&target.symbol, target.usd_amount, price, is_buy)
            .map_err(|e| TradeFailure::NotSent(e.to_string()))?;
        if !decision.is_allowed() {
            return Err(TradeFailure::NotSent(format!(
                "risk {:?}: {}",
                decision.outcome, decision.reason
            )));
        }

        let reason = format!("rebalance:{}", strategy);
        let timeout = Duration::from_millis(self.config.trade_timeout_ms);
        let call = async {
            if is_buy {
                self.executor
                    .execute_buy(&target.symbol, target.usd_amount, &reason)
                    .await
            } else {
                self.executor
                    .execute_sell(&target.symbol, target.usd_amount, &reason)
                    .await
            }
        };
        let fill = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(fill)) => fill,
            Ok(Err(e)) => return Err(TradeFailure::NotSent(e.to_string())),
            Err(_) => {
                return Err(TradeFailure::NotSent(format!(
                    "executor timed out after {}ms",
                    timeout.as_millis()
                )));
            }
        };
        if !fill.success || fill.filled_size <= Decimal::ZERO || fill.price <= Decimal::ZERO {
            return Err(TradeFailure::NotSent("executor reported no fill".to_string()));
        }

        self.risk.record_trade();
        if let Err(reason) = self.book_fill(target, strategy, &fill) {
            return Err(TradeFailure::Unbooked { fill, reason });
        }
        debug!(
            "[REBALANCE] {} {} {} @ {} (fee {})",
            action_str(target.action),
            fill.filled_size,
            target.symbol,
            fill.price,
            fill.fee
        );
        Ok(fill)
    }

    /// Apply a fill to the tracker: buys open a long, sells reduce longs
    /// oldest first
    fn book_fill(
        &self,
        target: &RebalanceTarget,
        strategy: RebalanceStrategy,
        fill: &TradeFill,
    ) -> std::result::Result<(), String> {
        if target.action == TradeAction::Buy {
            self.tracker
                .create_position(
                    OpenRequest::new(&target.symbol, PositionSide::Long, fill.filled_size, fill.price)
                        .with_fees(fill.fee)
                        .with_strategy(format!("rebalance:{}", strategy))
                        .with_tags(vec!["rebalance".to_string()]),
                )
                .map_err(|e| e.to_string())?;
            return Ok(());
        }

        let mut remaining = fill.filled_size;
        let mut fee = fill.fee;
        for position in self.tracker.positions_for_symbol(&target.symbol) {
            if remaining <= Decimal::ZERO {
                break;
            }
            if !position.is_long() || position.current_size.is_zero() {
                continue;
            }
            let size = remaining.min(position.current_size);
            self.tracker
                .close_partial(position.id, size, fill.price, fee)
                .map_err(|e| e.to_string())?;
            remaining -= size;
            fee = Decimal::ZERO;
        }
        if remaining > Decimal::ZERO {
            return Err(format!("{} beyond tracked longs", remaining));
        }
        Ok(())
    }

    /// Evaluate drift and, when needed, plan and execute a rebalance.
    ///
    /// Returns `None` when nothing needed doing.
    pub async fn auto_rebalance(&self) -> Result<Option<RebalanceResult>> {
        let drift = self.calculate_drift();
        if !drift.requires_rebalance {
            debug!("[REBALANCE] Max drift {}%, no rebalance needed", drift.max_drift);
            return Ok(None);
        }

        let max = self.config.max_drift_pct;
        let strategy = if drift.max_drift > max * Decimal::new(15, 1) {
            RebalanceStrategy::Threshold
        } else if drift.max_drift > max {
            RebalanceStrategy::MeanReversion
        } else {
            RebalanceStrategy::Dca
        };
        let reason = if drift.max_drift > max {
            format!("max drift {}% above {}%", drift.max_drift.round_dp(2), max)
        } else {
            "rebalance interval elapsed".to_string()
        };

        let plan = self.create_plan(strategy, &reason, None)?;
        self.execute_plan(plan).await.map(Some)
    }
}

fn action_str(action: TradeAction) -> &'static str {
    match action {
        TradeAction::Buy => "buy",
        TradeAction::Sell => "sell",
        TradeAction::Hold => "hold",
    }
}

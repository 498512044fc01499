//! Portfolio manager
//!
//! Facade over the tracker, risk manager, rebalancer and analytics engine.
//! Every mutation is risk-checked where it opens exposure and persisted
//! through the snapshot store. The new portfolio value is pushed to risk
//! and analytics before the change is announced on the event channel.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::PortfolioEvent;
use crate::export::{self, ExportDocument, ExportFormat};
use crate::scheduler::Scheduler;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use meridian_analytics::{AnalyticsEngine, PerformanceReport};
use meridian_core::{Period, Position};
use meridian_ports::{Clock, PriceSource, SnapshotKind, SnapshotStore, StoreError, TradeExecutor};
use meridian_position_tracker::{
    OpenRequest, PortfolioSummary, PositionTracker, TrackerError, TrackerSnapshot,
};
use meridian_rebalancer::{RebalanceError, RebalanceResult, RebalanceStrategy, Rebalancer};
use meridian_risk_manager::{RiskCheck, RiskManager, RiskReport, RiskViolation};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Balances smaller than this are treated as equal
const BALANCE_TOLERANCE: Decimal = dec!(0.00000001);

/// Assets held as cash rather than positions
const CASH_ASSETS: [&str; 3] = ["USD", "USDT", "USDC"];

/// Tracked and reported holdings of one asset that disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceDiscrepancy {
    pub asset: String,
    /// Net size in the position book
    pub tracked: Decimal,
    /// Balance reported by the price source
    pub reported: Decimal,
    /// `reported - tracked`
    pub difference: Decimal,
}

/// Base asset of a `BASE-QUOTE` or `BASE/QUOTE` symbol
fn base_asset(symbol: &str) -> &str {
    symbol.split(['-', '/']).next().unwrap_or(symbol)
}

fn quote_asset(symbol: &str) -> Option<&str> {
    symbol.split(['-', '/']).nth(1)
}

pub struct PortfolioManager {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    tracker: Arc<PositionTracker>,
    risk: Arc<RiskManager>,
    rebalancer: Arc<Rebalancer>,
    analytics: Arc<AnalyticsEngine>,
    prices: Arc<dyn PriceSource>,
    store: Arc<dyn SnapshotStore>,
    events: broadcast::Sender<PortfolioEvent>,
    scheduler: Mutex<Option<Scheduler>>,
    /// Held from the pre-trade check until the approved position is booked
    admission: Mutex<()>,
}

impl PortfolioManager {
    /// Wire up all components from `config`
    pub fn new(
        config: EngineConfig,
        executor: Arc<dyn TradeExecutor>,
        prices: Arc<dyn PriceSource>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let tracker = Arc::new(PositionTracker::new(clock.clone()));
        let risk = Arc::new(RiskManager::new(
            config.risk.clone(),
            config.initial_capital,
            tracker.clone(),
            clock.clone(),
        ));
        let rebalancer = Arc::new(Rebalancer::new(
            config.rebalance.clone(),
            tracker.clone(),
            risk.clone(),
            executor,
            clock.clone(),
        ));
        let analytics = Arc::new(AnalyticsEngine::new(
            config.analytics.clone(),
            tracker.clone(),
            risk.clone(),
            clock.clone(),
        ));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "[ENGINE] Portfolio manager ready, initial capital {}",
            config.initial_capital
        );
        Ok(Self {
            config,
            clock,
            tracker,
            risk,
            rebalancer,
            analytics,
            prices,
            store,
            events,
            scheduler: Mutex::new(None),
            admission: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<PositionTracker> {
        &self.tracker
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn rebalancer(&self) -> &Arc<Rebalancer> {
        &self.rebalancer
    }

    pub fn analytics(&self) -> &Arc<AnalyticsEngine> {
        &self.analytics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PortfolioEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PortfolioEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Publish when a cooling-off window started since `before` was read
    fn notice_cooling_off(&self, before: Option<DateTime<Utc>>) {
        if let Some(until) = self.risk.cooling_off_until()
            && before != Some(until)
        {
            self.publish(PortfolioEvent::CoolingOffStarted { until });
        }
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn persist<T: Serialize>(&self, kind: SnapshotKind, value: &T) {
        let result = serde_json::to_value(value)
            .map_err(StoreError::from)
            .and_then(|document| self.store.save(kind, &document));
        if let Err(e) = result {
            error!("[ENGINE] Failed to persist {}: {}", kind.as_str(), e);
            self.publish(PortfolioEvent::PersistenceFailed {
                document: kind,
                error: e.to_string(),
            });
        }
    }

    fn persist_positions(&self) {
        let snapshot = self.tracker.snapshot();
        self.persist(SnapshotKind::Positions, &snapshot.open);
        self.persist(SnapshotKind::ClosedPositions, &snapshot.closed);
    }

    fn persist_rebalancer(&self) {
        self.persist(SnapshotKind::RebalanceHistory, &self.rebalancer.history());
        self.persist(
            SnapshotKind::TargetAllocations,
            &self.rebalancer.target_allocations(),
        );
    }

    /// Write every document
    pub fn persist_all(&self) {
        self.persist_positions();
        self.persist_rebalancer();
        self.persist(SnapshotKind::Config, &self.config);
    }

    fn load_document<T: DeserializeOwned>(&self, kind: SnapshotKind) -> Result<Option<T>> {
        match self.store.load(kind)? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Reload positions, history and targets from the store.
    ///
    /// Missing documents leave the component empty. The current
    /// configuration is written back as the configuration document.
    pub fn load_state(&self) -> Result<()> {
        let open: Vec<Position> = self.load_document(SnapshotKind::Positions)?.unwrap_or_default();
        let closed: Vec<Position> = self
            .load_document(SnapshotKind::ClosedPositions)?
            .unwrap_or_default();
        let history: Vec<RebalanceResult> = self
            .load_document(SnapshotKind::RebalanceHistory)?
            .unwrap_or_default();
        let targets: BTreeMap<String, Decimal> = self
            .load_document(SnapshotKind::TargetAllocations)?
            .unwrap_or_default();

        if let Some(stored) = self.load_document::<EngineConfig>(SnapshotKind::Config)?
            && stored != self.config
        {
            info!("[ENGINE] Configuration changed since last run");
        }

        info!(
            "[ENGINE] Loaded {} open, {} closed positions, {} rebalances, {} targets",
            open.len(),
            closed.len(),
            history.len(),
            targets.len()
        );
        self.tracker.restore(TrackerSnapshot { open, closed });
        self.rebalancer.restore(targets, history);
        self.persist(SnapshotKind::Config, &self.config);
        self.sample_portfolio_value();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Positions
    // ------------------------------------------------------------------

    /// Open a filled position after a pre-trade risk check
    pub fn create_position(&self, request: OpenRequest) -> Result<Position> {
        let admission = self.admission.lock();
        let cooling_before = self.risk.cooling_off_until();
        let decision = self.risk.check_position_risk(
            &request.symbol,
            request.size,
            request.entry_price,
            request.side,
        )?;
        self.notice_cooling_off(cooling_before);

        if !decision.is_allowed() {
            warn!(
                "[ENGINE] {} {} rejected ({:?}): {}",
                request.symbol, request.size, decision.outcome, decision.reason
            );
            self.publish(PortfolioEvent::RiskRejected {
                symbol: request.symbol.clone(),
                outcome: decision.outcome,
                reason: decision.reason.clone(),
                retry_after_secs: decision.retry_after_secs,
            });
            return Err(Error::RiskRejected {
                outcome: decision.outcome,
                reason: decision.reason,
                retry_after_secs: decision.retry_after_secs,
            });
        }
        if decision.outcome == RiskCheck::Warn {
            warn!("[ENGINE] Opening {} despite warning: {}", request.symbol, decision.reason);
        }

        let position = self.tracker.create_position(request)?;
        self.risk.record_trade();
        drop(admission);

        self.risk.record_price(&position.symbol, position.entry_price);
        info!(
            "[ENGINE] Opened {:?} {} {} @ {}",
            position.side, position.original_size, position.symbol, position.entry_price
        );

        self.persist_positions();
        self.sample_portfolio_value();
        self.publish(PortfolioEvent::PositionOpened {
            position: position.clone(),
        });
        Ok(position)
    }

    /// Close `size` of a position, or all of it when `size` is `None`.
    ///
    /// Returns the realized PnL of this close.
    pub fn close_position(
        &self,
        id: Uuid,
        exit_price: Decimal,
        size: Option<Decimal>,
        fees: Decimal,
    ) -> Result<Decimal> {
        let before = self
            .tracker
            .position(id)
            .ok_or(TrackerError::UnknownPosition(id))?;
        let pnl = match size {
            Some(size) => self.tracker.close_partial(id, size, exit_price, fees)?,
            None => self.tracker.close_full(id, exit_price, fees)?,
        };
        let after = self.tracker.position(id);
        let fully_closed = after.as_ref().is_none_or(|p| !p.status.is_live());
        let closed_size = after
            .map(|p| before.current_size - p.current_size)
            .unwrap_or(before.current_size);

        self.risk.record_trade();
        self.risk.record_price(&before.symbol, exit_price);
        self.persist_positions();
        self.sample_portfolio_value();
        self.publish(PortfolioEvent::PositionClosed {
            position_id: id,
            symbol: before.symbol,
            closed_size,
            realized_pnl: pnl,
            fully_closed,
        });
        Ok(pnl)
    }

    /// Re-mark every position in `symbol`, returning the ids that changed
    pub fn update_position_price(&self, symbol: &str, price: Decimal) -> Result<Vec<Uuid>> {
        let changed = self.tracker.update_price(symbol, price)?;
        self.risk.record_price(symbol, price);
        if self.analytics.config().benchmark_symbol.as_deref() == Some(symbol) {
            self.analytics.record_benchmark_price(price);
        }

        if !changed.is_empty() {
            self.persist_positions();
            self.sample_portfolio_value();
            self.publish(PortfolioEvent::PositionUpdated {
                symbol: symbol.to_string(),
                price,
                position_ids: changed.clone(),
            });
        }
        Ok(changed)
    }

    pub fn get_portfolio_summary(&self) -> PortfolioSummary {
        self.tracker.portfolio_summary()
    }

    pub fn get_risk_report(&self) -> RiskReport {
        self.risk.risk_report()
    }

    // ------------------------------------------------------------------
    // Valuation and risk audit
    // ------------------------------------------------------------------

    /// Capital plus realized and unrealized PnL, fed to risk and analytics
    pub fn sample_portfolio_value(&self) -> Decimal {
        let summary = self.tracker.portfolio_summary();
        let value =
            self.config.initial_capital + summary.total_realized_pnl + summary.total_unrealized_pnl;
        self.risk.record_portfolio_value(value);
        self.analytics.record_portfolio_value(value);
        debug!("[ENGINE] Portfolio value sampled at {}", value);
        value
    }

    pub fn check_risk_limits(&self) -> Vec<RiskViolation> {
        let cooling_before = self.risk.cooling_off_until();
        let violations = self.risk.check_risk_limits();
        self.notice_cooling_off(cooling_before);
        violations
    }

    // ------------------------------------------------------------------
    // Rebalancing
    // ------------------------------------------------------------------

    pub fn set_target_allocations(
        &self,
        allocations: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, Decimal>> {
        let weights = self.rebalancer.set_target_allocations(allocations)?;
        self.persist(SnapshotKind::TargetAllocations, &weights);
        Ok(weights)
    }

    /// Plan and execute a rebalance. Threshold is used when no strategy
    /// is given; `custom_targets` override the stored allocation.
    pub async fn rebalance_portfolio(
        &self,
        strategy: Option<RebalanceStrategy>,
        custom_targets: Option<BTreeMap<String, f64>>,
    ) -> Result<RebalanceResult> {
        let strategy = strategy.unwrap_or(RebalanceStrategy::Threshold);
        let plan = self
            .rebalancer
            .create_plan(strategy, "requested rebalance", custom_targets.as_ref())?;
        let result = self.rebalancer.execute_plan(plan).await?;
        self.after_rebalance(&result);
        Ok(result)
    }

    fn after_rebalance(&self, result: &RebalanceResult) {
        if result.actual_trades > 0 {
            self.persist_positions();
            self.sample_portfolio_value();
        }
        self.persist(SnapshotKind::RebalanceHistory, &self.rebalancer.history());
        self.publish(PortfolioEvent::RebalanceCompleted {
            result_id: result.id,
            strategy: result.strategy,
            success: result.success,
            trades: result.actual_trades,
            cost: result.actual_cost,
        });
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    pub fn get_performance_report(&self, periods: &[Period]) -> PerformanceReport {
        self.analytics.generate_report(periods)
    }

    /// Write an export under the configured export directory
    pub fn export_data(&self, format: ExportFormat) -> Result<PathBuf> {
        let snapshot = self.tracker.snapshot();
        let document = ExportDocument {
            generated_at: self.clock.now(),
            summary: self.tracker.portfolio_summary(),
            open_positions: snapshot.open,
            closed_positions: snapshot.closed,
            risk: self.risk.risk_report(),
            performance: self.analytics.generate_report(&Period::ALL),
            rebalance_history: self.rebalancer.history(),
            target_allocations: self.rebalancer.target_allocations(),
        };
        let path = export::write_export(&self.config.persistence.export_dir, &document, format)?;
        info!("[ENGINE] Exported {:?} to {}", format, path.display());
        Ok(path)
    }

    // ------------------------------------------------------------------
    // External sources
    // ------------------------------------------------------------------

    /// Pull tickers for every held, targeted and benchmark symbol.
    ///
    /// Returns how many symbols were refreshed. Fails only when every
    /// request failed.
    pub async fn refresh_prices(&self) -> Result<usize> {
        let mut symbols: BTreeSet<String> = self.tracker.open_symbols().into_iter().collect();
        symbols.extend(self.rebalancer.target_allocations().into_keys());
        if let Some(benchmark) = &self.analytics.config().benchmark_symbol {
            symbols.insert(benchmark.clone());
        }

        let mut refreshed = 0;
        let mut last_error = None;
        for symbol in &symbols {
            let ticker = match self.prices.get_ticker(symbol).await {
                Ok(ticker) => ticker,
                Err(e) => {
                    warn!("[ENGINE] No ticker for {}: {}", symbol, e);
                    last_error = Some(e);
                    continue;
                }
            };
            let price = if ticker.last > Decimal::ZERO {
                ticker.last
            } else {
                ticker.mid()
            };
            match self.update_position_price(symbol, price) {
                Ok(_) => refreshed += 1,
                Err(e) => warn!("[ENGINE] Price {} for {} not applied: {}", price, symbol, e),
            }
        }

        match last_error {
            Some(e) if refreshed == 0 => Err(e.into()),
            _ => {
                debug!("[ENGINE] Refreshed {}/{} prices", refreshed, symbols.len());
                Ok(refreshed)
            }
        }
    }

    /// Compare tracked net holdings with balances reported by the source.
    ///
    /// Cash assets and quote currencies are skipped.
    pub async fn reconcile_balances(&self) -> Result<Vec<BalanceDiscrepancy>> {
        let reported = self.prices.get_all_balances().await?;
        let summary = self.tracker.portfolio_summary();

        let mut tracked: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut quotes: BTreeSet<&str> = CASH_ASSETS.into_iter().collect();
        for (symbol, exposure) in &summary.symbols {
            *tracked.entry(base_asset(symbol).to_string()).or_default() += exposure.net_size;
            if let Some(quote) = quote_asset(symbol) {
                quotes.insert(quote);
            }
        }

        let assets: BTreeSet<&String> = tracked.keys().chain(reported.keys()).collect();
        let mut discrepancies = Vec::new();
        for asset in assets {
            if quotes.contains(asset.as_str()) {
                continue;
            }
            let held = tracked.get(asset).copied().unwrap_or(Decimal::ZERO);
            let balance = reported.get(asset).copied().unwrap_or(Decimal::ZERO);
            let difference = balance - held;
            if difference.abs() > BALANCE_TOLERANCE {
                warn!(
                    "[ENGINE] {} balance mismatch: tracked {}, reported {}",
                    asset, held, balance
                );
                discrepancies.push(BalanceDiscrepancy {
                    asset: asset.clone(),
                    tracked: held,
                    reported: balance,
                    difference,
                });
            }
        }

        info!(
            "[ENGINE] Reconciled {} assets, {} discrepancies",
            reported.len(),
            discrepancies.len()
        );
        Ok(discrepancies)
    }

    // ------------------------------------------------------------------
    // Background jobs
    // ------------------------------------------------------------------

    /// Value sample followed by a risk-limit audit
    pub fn run_value_sampling(&self) {
        self.sample_portfolio_value();
        let violations = self.check_risk_limits();
        if !violations.is_empty() {
            warn!("[ENGINE] Risk audit found {} violations", violations.len());
        }
    }

    /// Sweep caches and recompute metrics for every period
    pub fn run_analytics(&self) {
        let swept = self.analytics.sweep_cache() + self.risk.sweep_cache();
        for period in Period::ALL {
            self.analytics.calculate_metrics(period);
        }
        debug!("[ENGINE] Analytics refreshed, {} stale entries swept", swept);
    }

    pub async fn run_rebalance_scan(&self) {
        match self.rebalancer.auto_rebalance().await {
            Ok(Some(result)) => self.after_rebalance(&result),
            Ok(None) => {}
            Err(RebalanceError::NoTargets) => debug!("[ENGINE] No targets, rebalance scan skipped"),
            Err(e) => warn!("[ENGINE] Rebalance scan failed: {}", e),
        }
    }

    pub async fn run_price_refresh(&self) {
        if let Err(e) = self.refresh_prices().await {
            warn!("[ENGINE] Price refresh failed: {}", e);
        }
    }

    /// Persist everything and write a JSON export
    pub fn run_backup(&self) {
        self.persist_all();
        if let Err(e) = self.export_data(ExportFormat::Json) {
            error!("[ENGINE] Backup export failed: {}", e);
        }
    }

    /// Spawn the background tasks. Requires a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.scheduler.lock();
        if slot.is_some() {
            return Err(Error::AlreadyRunning);
        }
        self.rebalancer.resume();

        let mut scheduler = Scheduler::new();
        let tasks = &self.config.scheduler;

        if let Some(period) = tasks.value_sample_period() {
            let manager = Arc::clone(self);
            scheduler.spawn("value-sampling", period, move || {
                let manager = manager.clone();
                async move { manager.run_value_sampling() }
            });
        }
        if let Some(period) = tasks.analytics_period() {
            let manager = Arc::clone(self);
            scheduler.spawn("analytics", period, move || {
                let manager = manager.clone();
                async move { manager.run_analytics() }
            });
        }
        if let Some(period) = tasks.rebalance_check_period() {
            let manager = Arc::clone(self);
            scheduler.spawn("rebalance-scan", period, move || {
                let manager = manager.clone();
                async move { manager.run_rebalance_scan().await }
            });
        }
        if let Some(period) = tasks.price_refresh_period() {
            let manager = Arc::clone(self);
            scheduler.spawn("price-refresh", period, move || {
                let manager = manager.clone();
                async move { manager.run_price_refresh().await }
            });
        }
        if let Some(period) = self.config.persistence.backup_period() {
            let manager = Arc::clone(self);
            scheduler.spawn("backup", period, move || {
                let manager = manager.clone();
                async move { manager.run_backup() }
            });
        }

        info!("[ENGINE] Started {} background tasks", scheduler.task_count());
        *slot = Some(scheduler);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Stop background tasks, wait for them, then persist everything
    pub async fn stop(&self) {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            self.rebalancer.request_stop();
            scheduler.shutdown().await;
            info!("[ENGINE] Background tasks stopped");
        }
        self.persist_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_legs() {
        assert_eq!(base_asset("BTC-USD"), "BTC");
        assert_eq!(base_asset("ETH/USDT"), "ETH");
        assert_eq!(base_asset("SOL"), "SOL");
        assert_eq!(quote_asset("BTC-USD"), Some("USD"));
        assert_eq!(quote_asset("SOL"), None);
    }
}

//! Portfolio manager end to end
//!
//! 1. Opening positions runs the pre-trade risk check and persists the book
//! 2. Closes, price refreshes and reconciliation go through the facade
//! 3. Rebalances execute against a mock venue and land in history
//! 4. State written by one engine is reloaded by the next
//! 5. Background tasks sample on their interval and stop cleanly

use async_trait::async_trait;
use meridian_clock::ManualClock;
use meridian_core::{Period, PositionSide};
use meridian_portfolio_manager::{
    EngineConfig, Error, ExportFormat, JsonFileStore, MemoryStore, PortfolioEvent, PortfolioManager,
};
use meridian_ports::{
    ExecutorError, PriceSource, PriceSourceError, SnapshotKind, SnapshotStore, StoreError, Ticker,
    TradeExecutor, TradeFill,
};
use meridian_position_tracker::OpenRequest;
use meridian_rebalancer::RebalanceStrategy;
use meridian_risk_manager::RiskCheck;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

struct MockVenue {
    prices: HashMap<String, Decimal>,
    calls: Mutex<Vec<(String, &'static str, Decimal)>>,
}

impl MockVenue {
    fn new() -> Self {
        Self {
            prices: HashMap::from([
                ("BTC-USD".to_string(), dec!(50000)),
                ("ETH-USD".to_string(), dec!(3000)),
            ]),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn fill(&self, symbol: &str, side: &'static str, usd: Decimal) -> Result<TradeFill, ExecutorError> {
        self.calls.lock().push((symbol.to_string(), side, usd));
        let price = self
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExecutorError::Rejected(format!("unknown symbol {}", symbol)))?;
        Ok(TradeFill {
            success: true,
            filled_size: usd / price,
            price,
            fee: usd * dec!(0.001),
        })
    }
}

#[async_trait]
impl TradeExecutor for MockVenue {
    async fn execute_buy(&self, symbol: &str, usd_amount: Decimal, _reason: &str) -> Result<TradeFill, ExecutorError> {
        self.fill(symbol, "buy", usd_amount)
    }

    async fn execute_sell(&self, symbol: &str, usd_amount: Decimal, _reason: &str) -> Result<TradeFill, ExecutorError> {
        self.fill(symbol, "sell", usd_amount)
    }
}

#[derive(Default)]
struct MockPrices {
    tickers: Mutex<HashMap<String, Decimal>>,
    balances: Mutex<HashMap<String, Decimal>>,
}

impl MockPrices {
    fn set(&self, symbol: &str, last: Decimal) {
        self.tickers.lock().insert(symbol.to_string(), last);
    }
}

#[async_trait]
impl PriceSource for MockPrices {
    async fn get_all_balances(&self) -> Result<HashMap<String, Decimal>, PriceSourceError> {
        Ok(self.balances.lock().clone())
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, PriceSourceError> {
        let last = self
            .tickers
            .lock()
            .get(symbol)
            .copied()
            .ok_or_else(|| PriceSourceError::UnknownSymbol(symbol.to_string()))?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            last,
            bid: last,
            ask: last,
        })
    }
}

struct FailingStore;

impl SnapshotStore for FailingStore {
    fn save(&self, _kind: SnapshotKind, _document: &Value) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    fn load(&self, _kind: SnapshotKind) -> Result<Option<Value>, StoreError> {
        Ok(None)
    }
}

struct Harness {
    manager: Arc<PortfolioManager>,
    venue: Arc<MockVenue>,
    prices: Arc<MockPrices>,
    store: Arc<dyn SnapshotStore>,
    dir: TempDir,
}

fn config(dir: &TempDir) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.persistence.data_dir = dir.path().join("data");
    config.persistence.export_dir = dir.path().join("exports");
    config
}

fn build(config: EngineConfig, store: Arc<dyn SnapshotStore>, dir: TempDir) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let venue = Arc::new(MockVenue::new());
    let prices = Arc::new(MockPrices::default());
    let manager = PortfolioManager::new(
        config,
        venue.clone(),
        prices.clone(),
        store.clone(),
        ManualClock::starting_now(),
    )
    .unwrap();
    Harness {
        manager: Arc::new(manager),
        venue,
        prices,
        store,
        dir,
    }
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::open(dir.path().join("data")).unwrap());
    build(config(&dir), store, dir)
}

/// BTC 1500 and ETH 1500 on 10000 of capital
fn open_book(h: &Harness) {
    h.manager
        .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.03), dec!(50000)).with_strategy("trend"))
        .unwrap();
    h.manager
        .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(0.5), dec!(3000)))
        .unwrap();
}

fn drain(rx: &mut broadcast::Receiver<PortfolioEvent>) -> Vec<PortfolioEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_create_position_persists_and_publishes() {
    let h = harness();
    let mut rx = h.manager.subscribe();

    open_book(&h);

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], PortfolioEvent::PositionOpened { position } if position.symbol == "BTC-USD"));

    let stored = h.store.load(SnapshotKind::Positions).unwrap().unwrap();
    assert_eq!(stored.as_array().unwrap().len(), 2);

    let summary = h.manager.get_portfolio_summary();
    assert_eq!(summary.open_positions, 2);
    assert_eq!(summary.total_value, dec!(3000));
}

#[test]
fn test_oversized_position_is_rejected() {
    let h = harness();
    let mut rx = h.manager.subscribe();

    let err = h
        .manager
        .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.3), dec!(50000)))
        .unwrap_err();

    match err {
        Error::RiskRejected { outcome, .. } => assert_eq!(outcome, RiskCheck::Block),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(h.manager.tracker().open_count(), 0);
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [PortfolioEvent::RiskRejected { .. }]
    ));
}

#[test]
fn test_cooling_off_blocks_with_retry_hint() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.risk.max_positions = 1;
    let h = build(cfg, Arc::new(MemoryStore::new()), dir);
    let mut rx = h.manager.subscribe();

    h.manager
        .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.01), dec!(50000)))
        .unwrap();
    // Bypass the facade to breach the position limit
    h.manager
        .tracker()
        .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(0.1), dec!(3000)))
        .unwrap();

    let violations = h.manager.check_risk_limits();
    assert_eq!(violations.len(), 1);

    let err = h
        .manager
        .create_position(OpenRequest::new("ADA-USD", PositionSide::Long, dec!(100), dec!(0.5)))
        .unwrap_err();
    assert_eq!(err.retry_after_secs(), Some(3600));

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(e, PortfolioEvent::CoolingOffStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(PortfolioEvent::RiskRejected {
            outcome: RiskCheck::Block,
            ..
        })
    ));
}

#[test]
fn test_partial_then_full_close() {
    let h = harness();
    open_book(&h);
    let eth = h.manager.tracker().positions_for_symbol("ETH-USD")[0].clone();
    let mut rx = h.manager.subscribe();

    let pnl = h.manager.close_position(eth.id, dec!(3300), Some(dec!(0.2)), dec!(0)).unwrap();
    assert_eq!(pnl, dec!(60));
    let pnl = h.manager.close_position(eth.id, dec!(3300), None, dec!(0)).unwrap();
    assert_eq!(pnl, dec!(90));

    let closes: Vec<(Decimal, bool)> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            PortfolioEvent::PositionClosed {
                closed_size,
                fully_closed,
                ..
            } => Some((closed_size, fully_closed)),
            _ => None,
        })
        .collect();
    assert_eq!(closes, vec![(dec!(0.2), false), (dec!(0.3), true)]);

    let closed = h.store.load(SnapshotKind::ClosedPositions).unwrap().unwrap();
    assert_eq!(closed.as_array().unwrap().len(), 1);
    assert_eq!(h.manager.get_portfolio_summary().total_realized_pnl, dec!(150));
}

#[test]
fn test_mutations_republish_portfolio_value() {
    let h = harness();
    let samples = || h.manager.analytics().value_history();
    assert!(samples().is_empty());

    let eth = h
        .manager
        .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(0.5), dec!(3000)))
        .unwrap();
    assert_eq!(samples().len(), 1);
    assert_eq!(h.manager.risk().portfolio_value(), dec!(10000));

    h.manager.update_position_price("ETH-USD", dec!(2000)).unwrap();
    assert_eq!(samples().len(), 2);
    assert_eq!(h.manager.risk().portfolio_value(), dec!(9500));

    let pnl = h.manager.close_position(eth.id, dec!(2000), None, dec!(0)).unwrap();
    assert_eq!(pnl, dec!(-500));
    assert_eq!(samples().len(), 3);
    assert_eq!(samples().last().map(|(_, v)| *v), Some(dec!(9500)));
    assert_eq!(h.manager.risk().portfolio_value(), dec!(9500));
}

#[test]
fn test_risk_and_analytics_agree_on_ratios() {
    let h = harness();
    for value in [dec!(10000), dec!(11000), dec!(9000), dec!(10500), dec!(11500)] {
        h.manager.risk().record_portfolio_value(value);
        h.manager.analytics().record_portfolio_value(value);
    }

    let risk = h.manager.risk().calculate_risk_metrics();
    let perf = h.manager.analytics().calculate_metrics(Period::Inception);

    assert_eq!(perf.observations, 5);
    assert_eq!(risk.max_drawdown_pct, perf.max_drawdown_pct);
    assert_eq!(risk.sharpe_ratio, perf.sharpe_ratio);
    assert_eq!(risk.sortino_ratio, perf.sortino_ratio);
    assert_eq!(risk.calmar_ratio, perf.calmar_ratio);
    // Every sample shares one timestamp; annualization still counts periods
    assert!(perf.calmar_ratio > 0.0);
}

#[test]
fn test_concurrent_opens_respect_position_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.risk.max_positions = 3;
    let h = build(cfg, Arc::new(MemoryStore::new()), dir);
    open_book(&h);

    let opened: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = &h.manager;
                scope.spawn(move || {
                    let symbol = format!("ALT{}-USD", i);
                    manager
                        .create_position(OpenRequest::new(&symbol, PositionSide::Long, dec!(1), dec!(100)))
                        .is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    assert_eq!(opened.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(h.manager.tracker().open_count(), 3);
}

#[tokio::test]
async fn test_refresh_prices_marks_book() {
    let h = harness();
    open_book(&h);
    h.prices.set("BTC-USD", dec!(55000));
    let mut rx = h.manager.subscribe();

    // ETH has no ticker, BTC does
    assert_eq!(h.manager.refresh_prices().await.unwrap(), 1);

    let btc = &h.manager.tracker().positions_for_symbol("BTC-USD")[0];
    assert_eq!(btc.unrealized_pnl, dec!(150));
    assert!(matches!(
        drain(&mut rx).as_slice(),
        [PortfolioEvent::PositionUpdated { symbol, .. }] if symbol == "BTC-USD"
    ));
}

#[tokio::test]
async fn test_refresh_prices_fails_when_source_is_down() {
    let h = harness();
    open_book(&h);
    assert!(matches!(
        h.manager.refresh_prices().await,
        Err(Error::PriceSource(_))
    ));
}

#[tokio::test]
async fn test_reconcile_balances() {
    let h = harness();
    open_book(&h);
    *h.prices.balances.lock() = HashMap::from([
        ("BTC".to_string(), dec!(0.03)),
        ("ETH".to_string(), dec!(0.4)),
        ("USD".to_string(), dec!(7000)),
        ("SOL".to_string(), dec!(2)),
    ]);

    let found = h.manager.reconcile_balances().await.unwrap();
    let assets: Vec<&str> = found.iter().map(|d| d.asset.as_str()).collect();
    assert_eq!(assets, vec!["ETH", "SOL"]);
    assert_eq!(found[0].difference, dec!(-0.1));
    assert_eq!(found[1].tracked, Decimal::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_rebalance_with_custom_targets() {
    let h = harness();
    open_book(&h);
    let mut rx = h.manager.subscribe();

    let result = h
        .manager
        .rebalance_portfolio(
            Some(RebalanceStrategy::Threshold),
            Some(BTreeMap::from([("BTC-USD".to_string(), 1.0)])),
        )
        .await
        .unwrap();

    // ETH is untargeted and trimmed to zero; underweight BTC is left alone
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.actual_trades, 1);
    assert_eq!(
        h.venue.calls.lock().as_slice(),
        &[("ETH-USD".to_string(), "sell", dec!(1500))]
    );
    assert_eq!(h.manager.tracker().open_symbols(), vec!["BTC-USD".to_string()]);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PortfolioEvent::RebalanceCompleted { trades: 1, success: true, .. }
    )));
    let history = h.store.load(SnapshotKind::RebalanceHistory).unwrap().unwrap();
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rebalance_without_targets_fails() {
    let h = harness();
    assert!(matches!(
        h.manager.rebalance_portfolio(None, None).await,
        Err(Error::Rebalance(_))
    ));
}

#[test]
fn test_state_survives_restart() {
    let h = harness();
    open_book(&h);
    h.manager
        .set_target_allocations(&BTreeMap::from([
            ("BTC-USD".to_string(), 3.0),
            ("ETH-USD".to_string(), 1.0),
        ]))
        .unwrap();
    let before = h.manager.tracker().snapshot();

    let Harness { store, dir, .. } = h;
    let restarted = build(config(&dir), store, dir);
    restarted.manager.load_state().unwrap();

    assert_eq!(restarted.manager.tracker().snapshot(), before);
    let targets = restarted.manager.rebalancer().target_allocations();
    assert_eq!(targets["BTC-USD"], dec!(0.75));
    assert_eq!(targets["ETH-USD"], dec!(0.25));
    assert!(restarted.store.load(SnapshotKind::Config).unwrap().is_some());
}

#[test]
fn test_persistence_failure_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let h = build(config(&dir), Arc::new(FailingStore), dir);
    let mut rx = h.manager.subscribe();

    open_book(&h);
    assert_eq!(h.manager.tracker().open_count(), 2);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        PortfolioEvent::PersistenceFailed {
            document: SnapshotKind::Positions,
            ..
        }
    )));
}

#[test]
fn test_exports() {
    let h = harness();
    open_book(&h);
    h.manager.sample_portfolio_value();

    let json_path = h.manager.export_data(ExportFormat::Json).unwrap();
    assert!(json_path.starts_with(h.dir.path().join("exports")));
    let doc: Value = serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(doc["open_positions"].as_array().unwrap().len(), 2);
    assert!(doc["performance"]["metrics"].get(Period::Inception.as_str()).is_some());

    let csv_path = h.manager.export_data(ExportFormat::Csv).unwrap();
    let csv = std::fs::read_to_string(csv_path).unwrap();
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_background_tasks_sample_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.scheduler.value_sample_secs = 60;
    cfg.scheduler.analytics_secs = 0;
    cfg.scheduler.rebalance_check_secs = 0;
    cfg.scheduler.price_refresh_secs = 0;
    cfg.persistence.backup_interval_hours = 0;
    let h = build(cfg, Arc::new(MemoryStore::new()), dir);

    h.manager.start().unwrap();
    assert!(h.manager.is_running());
    assert!(matches!(h.manager.start(), Err(Error::AlreadyRunning)));

    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(h.manager.analytics().value_history().len(), 2);

    h.manager.stop().await;
    assert!(!h.manager.is_running());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.manager.analytics().value_history().len(), 2);
}

//! Paper trading integration test
//!
//! Flow:
//! 1. Build the engine over a paper market with flat prices
//! 2. Seed a 60/40 BTC/ETH allocation
//! 3. Refresh prices so the rebalancer has references
//! 4. Mean-reversion rebalance from an empty book closes half of each gap
//! 5. Tracked positions match the paper market balances
//! 6. A price move is marked into the book

use meridian_clock::ManualClock;
use meridian_portfolio_manager::MemoryStore;
use meridian_rebalancer::RebalanceStrategy;
use meridian_runner::{PaperMarket, PaperMarketConfig, RunnerConfig, build_engine, paper::CASH};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;

fn runner_config() -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.engine.initial_capital = dec!(10000);
    config.engine.risk.max_position_pct = dec!(70);
    config.engine.risk.max_symbol_exposure_pct = dec!(70);
    config.paper = PaperMarketConfig {
        price_volatility: Decimal::ZERO,
        starting_cash: dec!(20000),
        ..PaperMarketConfig::default()
    };
    config.targets = BTreeMap::from([("BTC-USD".to_string(), 0.6), ("ETH-USD".to_string(), 0.4)]);
    config
}

#[tokio::test(start_paused = true)]
async fn test_paper_rebalance_matches_balances() {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = runner_config();
    let market = Arc::new(PaperMarket::with_seed(config.paper.clone(), 7));
    let engine = build_engine(
        &config,
        market.clone(),
        Arc::new(MemoryStore::new()),
        ManualClock::starting_now(),
    )
    .unwrap();
    assert_eq!(engine.rebalancer().target_allocations().len(), 2);

    assert_eq!(engine.refresh_prices().await.unwrap(), 2);

    let result = engine
        .rebalance_portfolio(Some(RebalanceStrategy::MeanReversion), None)
        .await
        .unwrap();
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.actual_trades, 2);

    // 3000 of BTC and 2000 of ETH plus 0.1% fees
    assert_eq!(market.balance("BTC"), dec!(0.06));
    assert_eq!(market.balance(CASH), dec!(14995));

    let summary = engine.get_portfolio_summary();
    assert_eq!(summary.open_positions, 2);
    assert_eq!(summary.symbol_value("BTC-USD"), dec!(3000));

    let discrepancies = engine.reconcile_balances().await.unwrap();
    assert!(discrepancies.is_empty(), "unexpected: {:?}", discrepancies);
}

#[tokio::test(start_paused = true)]
async fn test_price_move_is_marked() {
    let _ = env_logger::builder().is_test(true).try_init();

    let config = runner_config();
    let market = Arc::new(PaperMarket::with_seed(config.paper.clone(), 11));
    let engine = build_engine(
        &config,
        market.clone(),
        Arc::new(MemoryStore::new()),
        ManualClock::starting_now(),
    )
    .unwrap();
    engine.refresh_prices().await.unwrap();
    engine
        .rebalance_portfolio(Some(RebalanceStrategy::MeanReversion), None)
        .await
        .unwrap();

    market.set_price("BTC-USD", dec!(55000));
    engine.refresh_prices().await.unwrap();

    let summary = engine.get_portfolio_summary();
    assert_eq!(summary.symbol_value("BTC-USD"), dec!(3300));
    assert!(summary.total_unrealized_pnl > Decimal::ZERO);
}

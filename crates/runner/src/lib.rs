//! Meridian Runner
//!
//! Runs the portfolio engine against a paper market:
//!
//! 1. Load [`RunnerConfig`] from the first argument or `MERIDIAN_CONFIG`
//! 2. Reload persisted state from the data directory
//! 3. Seed target allocations when none were persisted
//! 4. Start background tasks and run until Ctrl-C
//! 5. Stop tasks cooperatively and persist everything

pub mod config;
pub mod error;
pub mod paper;

pub use config::{CONFIG_ENV, RunnerConfig, config_path};
pub use error::{Result, RunnerError};
pub use paper::{PaperMarket, PaperMarketConfig};

use meridian_clock::SystemClock;
use meridian_portfolio_manager::{JsonFileStore, PortfolioManager};
use meridian_ports::{Clock, SnapshotStore};
use std::sync::Arc;

/// Build an engine over `market`, reload its state and seed targets
pub fn build_engine(
    config: &RunnerConfig,
    market: Arc<PaperMarket>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<PortfolioManager>> {
    let manager = PortfolioManager::new(config.engine.clone(), market.clone(), market, store, clock)?;
    manager.load_state()?;

    if manager.rebalancer().target_allocations().is_empty() && !config.targets.is_empty() {
        let weights = manager.set_target_allocations(&config.targets)?;
        log::info!("[RUNNER] Seeded {} target allocations", weights.len());
    }
    Ok(Arc::new(manager))
}

/// Run until Ctrl-C
pub async fn run(config: RunnerConfig) -> Result<()> {
    let store = Arc::new(JsonFileStore::open(&config.engine.persistence.data_dir)?);
    let market = Arc::new(PaperMarket::new(config.paper.clone()));
    let engine = build_engine(&config, market, store, Arc::new(SystemClock::new()))?;

    engine.refresh_prices().await?;
    engine.sample_portfolio_value();
    engine.start()?;
    log::info!("[RUNNER] Engine running, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    log::info!("[RUNNER] Shutdown requested");
    engine.stop().await;

    let summary = engine.get_portfolio_summary();
    log::info!(
        "[RUNNER] Final book: {} open positions, value {}, realized {}",
        summary.open_positions,
        summary.total_value,
        summary.total_realized_pnl
    );
    Ok(())
}

//! Return attribution
//!
//! PnL is split by symbol and by strategy tag. Relative to the benchmark,
//! the portfolio return decomposes into market, interaction and selection
//! effects:
//!
//! ```text
//! market      = R_b
//! interaction = (beta - 1) * R_b
//! selection   = R_p - R_b - interaction
//! ```

use chrono::{DateTime, Utc};
use meridian_core::{Period, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strategy key for positions opened without a tag
pub const UNTAGGED: &str = "untagged";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionAnalysis {
    pub period: Period,
    pub portfolio_return: f64,
    pub benchmark_return: f64,
    /// Realized plus unrealized PnL per symbol
    pub asset_contribution: BTreeMap<String, Decimal>,
    /// Realized plus unrealized PnL per strategy tag
    pub strategy_contribution: BTreeMap<String, Decimal>,
    pub market_effect: f64,
    pub selection_effect: f64,
    pub interaction_effect: f64,
    pub computed_at: DateTime<Utc>,
}

/// Add each position's PnL to its symbol and strategy buckets
pub fn contributions(
    open: &[Position],
    closed: &[Position],
) -> (BTreeMap<String, Decimal>, BTreeMap<String, Decimal>) {
    let mut by_asset: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut by_strategy: BTreeMap<String, Decimal> = BTreeMap::new();

    let live = open.iter().map(|p| (p, p.realized_pnl + p.unrealized_pnl));
    let done = closed.iter().map(|p| (p, p.realized_pnl));
    for (position, pnl) in live.chain(done) {
        *by_asset.entry(position.symbol.clone()).or_default() += pnl;
        let strategy = position.strategy.as_deref().unwrap_or(UNTAGGED);
        *by_strategy.entry(strategy.to_string()).or_default() += pnl;
    }
    (by_asset, by_strategy)
}

/// `(market, selection, interaction)` effects
pub fn effects(portfolio_return: f64, benchmark_return: f64, beta: f64) -> (f64, f64, f64) {
    let market = benchmark_return;
    let interaction = (beta - 1.0) * benchmark_return;
    let selection = portfolio_return - benchmark_return - interaction;
    (market, selection, interaction)
}

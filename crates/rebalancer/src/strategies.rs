//! Plan-building strategies
//!
//! Each strategy is a pure function over [`PlanInputs`]. [`build_targets`]
//! dispatches on the strategy and drops trades below the minimum size.

use crate::config::{RebalanceConfig, RebalanceStrategy};
use crate::plan::{RebalanceTarget, TradeAction};
use log::{debug, warn};
use meridian_core::math::{div_or, to_decimal};
use meridian_position_tracker::PortfolioSummary;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Everything a strategy may look at
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    /// Normalized target weights
    pub targets: &'a BTreeMap<String, Decimal>,
    /// Portfolio value weights are measured against
    pub current_value: Decimal,
    pub summary: &'a PortfolioSummary,
    /// Annualized volatility per symbol, percent
    pub volatilities: &'a HashMap<String, f64>,
    /// Reference price per symbol
    pub prices: &'a BTreeMap<String, Decimal>,
    pub config: &'a RebalanceConfig,
}

/// Weight gap for one symbol
#[derive(Debug, Clone)]
struct Gap {
    symbol: String,
    current_weight: Decimal,
    target_weight: Decimal,
    /// Current minus target, in points
    drift_pct: Decimal,
    /// Signed USD to trade to close the gap (positive buys)
    gap_usd: Decimal,
}

impl<'a> PlanInputs<'a> {
    pub fn current_weight(&self, symbol: &str) -> Decimal {
        div_or(
            self.summary.symbol_value(symbol),
            self.current_value,
            Decimal::ZERO,
            "current weight",
        )
    }

    fn price(&self, symbol: &str) -> Option<Decimal> {
        self.prices
            .get(symbol)
            .copied()
            .or_else(|| self.summary.symbols.get(symbol).map(|s| s.last_price))
            .filter(|p| *p > Decimal::ZERO)
    }

    /// Gaps over targeted symbols plus any held symbol without a target
    fn gaps(&self, targets: &BTreeMap<String, Decimal>) -> Vec<Gap> {
        let symbols: BTreeSet<&String> = targets.keys().chain(self.summary.symbols.keys()).collect();
        symbols
            .into_iter()
            .map(|symbol| {
                let current_weight = self.current_weight(symbol);
                let target_weight = targets.get(symbol).copied().unwrap_or(Decimal::ZERO);
                Gap {
                    symbol: symbol.clone(),
                    current_weight,
                    target_weight,
                    drift_pct: (current_weight - target_weight) * Decimal::ONE_HUNDRED,
                    gap_usd: (target_weight - current_weight) * self.current_value,
                }
            })
            .collect()
    }

    /// Tiered by drift; sells go one tier earlier so cash is raised first
    fn priority(&self, drift_pct: Decimal, action: TradeAction) -> u8 {
        let drift = drift_pct.abs();
        let tier = if drift > self.config.max_drift_pct {
            3
        } else if drift > self.config.min_drift_pct {
            2
        } else {
            1
        };
        if action == TradeAction::Sell { tier + 1 } else { tier }
    }

    fn target(
        &self,
        gap: &Gap,
        signed_usd: Decimal,
        limit_price: Option<Decimal>,
        priority: Option<u8>,
    ) -> RebalanceTarget {
        let action = if signed_usd > Decimal::ZERO {
            TradeAction::Buy
        } else if signed_usd < Decimal::ZERO {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        };
        let usd_amount = signed_usd.abs();
        let units = limit_price
            .or_else(|| self.price(&gap.symbol))
            .map(|p| usd_amount / p)
            .unwrap_or(Decimal::ZERO);

        RebalanceTarget {
            symbol: gap.symbol.clone(),
            action,
            current_weight: gap.current_weight,
            target_weight: gap.target_weight,
            drift_pct: gap.drift_pct,
            usd_amount,
            units,
            limit_price,
            priority: priority.unwrap_or_else(|| self.priority(gap.drift_pct, action)),
        }
    }
}

/// Build the targets for `strategy`, dropping trades below the minimum size
pub fn build_targets(strategy: RebalanceStrategy, inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    let mut targets = match strategy {
        RebalanceStrategy::Threshold => threshold(inputs),
        RebalanceStrategy::Dca => dca(inputs),
        RebalanceStrategy::Grid => grid(inputs),
        RebalanceStrategy::Momentum => momentum(inputs),
        RebalanceStrategy::MeanReversion => mean_reversion(inputs),
        RebalanceStrategy::RiskParity => risk_parity(inputs),
    };

    let before = targets.len();
    targets.retain(|t| t.usd_amount >= inputs.config.min_trade_size_usd);
    if targets.len() < before {
        debug!(
            "[REBALANCE] {}: dropped {} targets below {} USD",
            strategy,
            before - targets.len(),
            inputs.config.min_trade_size_usd
        );
    }
    targets
}

/// Full gap on every symbol drifting past the minimum in either direction
fn full_gaps_over(inputs: &PlanInputs<'_>, weights: &BTreeMap<String, Decimal>) -> Vec<RebalanceTarget> {
    inputs
        .gaps(weights)
        .iter()
        .filter(|g| g.drift_pct.abs() > inputs.config.min_drift_pct)
        .map(|g| inputs.target(g, g.gap_usd, None, None))
        .collect()
}

/// Trim every symbol whose drift (current minus target) exceeds the
/// minimum back to its target. Underweight symbols are left to the
/// buying strategies.
pub fn threshold(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    inputs
        .gaps(inputs.targets)
        .iter()
        .filter(|g| g.drift_pct > inputs.config.min_drift_pct)
        .map(|g| inputs.target(g, g.gap_usd, None, None))
        .collect()
}

/// Buy a slice of each underweight gap, capped per symbol
pub fn dca(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    let cap = inputs.current_value * inputs.config.dca_max_pct / Decimal::ONE_HUNDRED;
    inputs
        .gaps(inputs.targets)
        .iter()
        .filter(|g| g.gap_usd > Decimal::ZERO)
        .map(|g| {
            let usd = (g.gap_usd * inputs.config.dca_fraction).min(cap);
            inputs.target(g, usd, None, Some(1))
        })
        .collect()
}

/// Buy ladder for each underweight gap: `grid_levels` limit prices evenly
/// spaced from `price * (1 - range)` to `price * (1 + range)`, the gap split
/// equally across them. Lower levels get higher priority.
pub fn grid(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    let levels = inputs.config.grid_levels.max(1);
    let range = inputs.config.grid_range_pct / Decimal::ONE_HUNDRED;
    let mut out = Vec::new();

    for gap in inputs.gaps(inputs.targets) {
        if gap.gap_usd <= Decimal::ZERO || gap.drift_pct.abs() <= inputs.config.min_drift_pct {
            continue;
        }
        let Some(price) = inputs.price(&gap.symbol) else {
            debug!("[REBALANCE] grid: no price for {}, skipping", gap.symbol);
            continue;
        };

        let low = price * (Decimal::ONE - range);
        let high = price * (Decimal::ONE + range);
        let step = if levels > 1 {
            (high - low) / Decimal::from(levels - 1)
        } else {
            Decimal::ZERO
        };
        let per_level = gap.gap_usd / Decimal::from(levels);
        for i in 0..levels {
            let level_price = if levels > 1 { low + step * Decimal::from(i) } else { price };
            if level_price <= Decimal::ZERO {
                continue;
            }
            let priority = u8::try_from(levels - i).unwrap_or(u8::MAX);
            out.push(inputs.target(&gap, per_level, Some(level_price), Some(priority)));
        }
    }
    out
}

/// Tilt each target by its unrealized PnL %, then close the adjusted gap
pub fn momentum(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    let max_shift = inputs.config.momentum_max_shift_pct;
    let mut adjusted = BTreeMap::new();
    let mut strength = HashMap::new();

    for (symbol, weight) in inputs.targets {
        let pnl_pct = inputs
            .summary
            .symbols
            .get(symbol)
            .map(|s| s.unrealized_pnl_pct)
            .unwrap_or(Decimal::ZERO);
        let shift = (pnl_pct / dec!(2)).clamp(-max_shift, max_shift);
        adjusted.insert(
            symbol.clone(),
            (*weight + shift / Decimal::ONE_HUNDRED).max(Decimal::ZERO),
        );
        strength.insert(symbol.clone(), pnl_pct.abs());
    }

    inputs
        .gaps(&adjusted)
        .iter()
        .filter(|g| g.drift_pct.abs() > inputs.config.min_drift_pct)
        .map(|g| {
            let strong = strength
                .get(&g.symbol)
                .is_some_and(|s| *s >= inputs.config.strong_momentum_pct);
            inputs.target(g, g.gap_usd, None, Some(if strong { 3 } else { 1 }))
        })
        .collect()
}

/// Close part of each gap past the minimum drift
pub fn mean_reversion(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    inputs
        .gaps(inputs.targets)
        .iter()
        .filter(|g| g.drift_pct.abs() > inputs.config.min_drift_pct)
        .map(|g| inputs.target(g, g.gap_usd * inputs.config.mean_reversion_fraction, None, None))
        .collect()
}

/// Weights proportional to inverse volatility over the targeted symbols
pub fn risk_parity_weights(inputs: &PlanInputs<'_>) -> BTreeMap<String, Decimal> {
    let mut inverse = BTreeMap::new();
    for symbol in inputs.targets.keys() {
        let vol = match inputs.volatilities.get(symbol) {
            Some(v) if v.is_finite() && *v > 0.0 => *v,
            Some(v) => {
                warn!(
                    "[REBALANCE] risk parity: volatility {} for {} unusable, assuming {}",
                    v, symbol, inputs.config.default_volatility_pct
                );
                inputs.config.default_volatility_pct
            }
            None => inputs.config.default_volatility_pct,
        };
        match to_decimal(1.0 / vol, "inverse volatility") {
            Ok(w) => {
                inverse.insert(symbol.clone(), w);
            }
            Err(e) => warn!("[REBALANCE] risk parity: {} for {}", e, symbol),
        }
    }

    let total: Decimal = inverse.values().copied().sum();
    if total <= Decimal::ZERO {
        return BTreeMap::new();
    }
    inverse.into_iter().map(|(s, w)| (s, w / total)).collect()
}

pub fn risk_parity(inputs: &PlanInputs<'_>) -> Vec<RebalanceTarget> {
    let weights = risk_parity_weights(inputs);
    full_gaps_over(inputs, &weights)
}

//! Rebalance plans and results

use crate::config::RebalanceStrategy;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

/// Proposed action for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceTarget {
    pub symbol: String,
    pub action: TradeAction,
    pub current_weight: Decimal,
    pub target_weight: Decimal,
    /// Current minus target weight, in points
    pub drift_pct: Decimal,
    pub usd_amount: Decimal,
    /// Units at the reference price, zero when no price is known
    pub units: Decimal,
    pub limit_price: Option<Decimal>,
    /// Higher executes first
    pub priority: u8,
}

impl RebalanceTarget {
    pub fn is_trade(&self) -> bool {
        self.action != TradeAction::Hold && self.usd_amount > Decimal::ZERO
    }
}

/// A plan and, once executed, its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub id: Uuid,
    pub strategy: RebalanceStrategy,
    pub reason: String,
    pub targets: Vec<RebalanceTarget>,
    pub expected_cost: Decimal,
    pub expected_trades: usize,
    pub actual_cost: Decimal,
    pub actual_trades: usize,
    pub success: bool,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RebalanceResult {
    pub fn new(
        strategy: RebalanceStrategy,
        reason: impl Into<String>,
        targets: Vec<RebalanceTarget>,
        cost_rate: Decimal,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let trades: Vec<&RebalanceTarget> = targets.iter().filter(|t| t.is_trade()).collect();
        let expected_cost = trades.iter().map(|t| t.usd_amount).sum::<Decimal>() * cost_rate;
        let expected_trades = trades.len();
        Self {
            id: Uuid::new_v4(),
            strategy,
            reason: reason.into(),
            targets,
            expected_cost,
            expected_trades,
            actual_cost: Decimal::ZERO,
            actual_trades: 0,
            success: false,
            errors: Vec::new(),
            dry_run,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn trades(&self) -> impl Iterator<Item = &RebalanceTarget> {
        self.targets.iter().filter(|t| t.is_trade())
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.errors.push(error.into());
        self.success = false;
        self.completed_at = Some(now);
    }
}

/// Current weights against targets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Current minus target weight per symbol, in points
    pub per_symbol: BTreeMap<String, Decimal>,
    pub max_drift: Decimal,
    pub requires_rebalance: bool,
    /// Interval elapsed since the last rebalance
    pub interval_due: bool,
    pub current_weights: BTreeMap<String, Decimal>,
    pub target_weights: BTreeMap<String, Decimal>,
    pub portfolio_value: Decimal,
}

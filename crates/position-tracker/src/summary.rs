//! Portfolio aggregate built under the tracker lock

use chrono::{DateTime, Utc};
use meridian_core::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate exposure for one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolExposure {
    pub symbol: String,
    /// Long minus short open size
    pub net_size: Decimal,
    /// Long plus short open size
    pub gross_size: Decimal,
    /// Sum of position market values
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
    /// Realized PnL of the still-open positions (partial closes)
    pub realized_pnl: Decimal,
    /// Latest mark seen on any position in this symbol
    pub last_price: Decimal,
    pub position_count: usize,
}

/// Consistent snapshot of the whole book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    /// Market value of all open positions
    pub total_value: Decimal,
    /// Cost basis of all open positions
    pub total_cost: Decimal,
    pub total_unrealized_pnl: Decimal,
    /// Realized PnL across open and closed positions
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub open_positions: usize,
    pub closed_positions: usize,
    pub symbols: BTreeMap<String, SymbolExposure>,
    pub timestamp: DateTime<Utc>,
}

impl PortfolioSummary {
    pub(crate) fn build<'a>(
        open: impl Iterator<Item = &'a Position>,
        closed: &[Position],
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut summary = PortfolioSummary {
            timestamp,
            closed_positions: closed.len(),
            ..Default::default()
        };

        for position in open {
            summary.open_positions += 1;
            summary.total_value += position.current_value;
            summary.total_cost += position.cost_basis;
            summary.total_unrealized_pnl += position.unrealized_pnl;
            summary.total_realized_pnl += position.realized_pnl;
            summary.total_fees += position.fees;

            let entry = summary
                .symbols
                .entry(position.symbol.clone())
                .or_insert_with(|| SymbolExposure {
                    symbol: position.symbol.clone(),
                    ..Default::default()
                });
            entry.net_size += position.side.direction() * position.current_size;
            entry.gross_size += position.current_size;
            entry.market_value += position.current_value;
            entry.cost_basis += position.cost_basis;
            entry.unrealized_pnl += position.unrealized_pnl;
            entry.realized_pnl += position.realized_pnl;
            entry.position_count += 1;
            if position.current_price > Decimal::ZERO {
                entry.last_price = position.current_price;
            }
        }

        for exposure in summary.symbols.values_mut() {
            if exposure.cost_basis > Decimal::ZERO {
                exposure.unrealized_pnl_pct =
                    exposure.unrealized_pnl / exposure.cost_basis * Decimal::ONE_HUNDRED;
            }
        }

        for position in closed {
            summary.total_realized_pnl += position.realized_pnl;
            summary.total_fees += position.fees;
        }

        summary
    }

    /// Market value held in `symbol`
    pub fn symbol_value(&self, symbol: &str) -> Decimal {
        self.symbols
            .get(symbol)
            .map(|s| s.market_value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Per-symbol share of `denominator` (usually portfolio value)
    pub fn weights(&self, denominator: Decimal) -> BTreeMap<String, Decimal> {
        if denominator <= Decimal::ZERO {
            return BTreeMap::new();
        }
        self.symbols
            .iter()
            .map(|(symbol, exposure)| (symbol.clone(), exposure.market_value / denominator))
            .collect()
    }

    /// Latest known price per symbol
    pub fn prices(&self) -> BTreeMap<String, Decimal> {
        self.symbols
            .iter()
            .filter(|(_, e)| e.last_price > Decimal::ZERO)
            .map(|(s, e)| (s.clone(), e.last_price))
            .collect()
    }
}

//! Position book
//!
//! Live positions are indexed by id and by symbol. Fully closed or
//! cancelled positions move to an append-only history and are never
//! mutated again.

use crate::error::{Result, TrackerError};
use crate::summary::PortfolioSummary;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use meridian_core::{Position, PositionSide, PositionStatus};
use meridian_ports::Clock;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Parameters for opening a filled position
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub fees: Decimal,
    pub strategy: Option<String>,
    pub tags: Vec<String>,
}

impl OpenRequest {
    pub fn new(
        symbol: impl Into<String>,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            entry_price,
            fees: Decimal::ZERO,
            strategy: None,
            tags: Vec::new(),
        }
    }

    pub fn with_fees(mut self, fees: Decimal) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Serializable copy of the whole book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub open: Vec<Position>,
    pub closed: Vec<Position>,
}

#[derive(Debug, Default)]
struct TrackerState {
    positions: HashMap<Uuid, Position>,
    by_symbol: HashMap<String, Vec<Uuid>>,
    closed: Vec<Position>,
}

impl TrackerState {
    fn insert(&mut self, position: Position) {
        self.by_symbol
            .entry(position.symbol.clone())
            .or_default()
            .push(position.id);
        self.positions.insert(position.id, position);
    }

    /// Move a position out of the live book into history
    fn retire(&mut self, id: Uuid) {
        let Some(position) = self.positions.remove(&id) else {
            return;
        };
        if let Some(ids) = self.by_symbol.get_mut(&position.symbol) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_symbol.remove(&position.symbol);
            }
        }
        self.closed.push(position);
    }

    fn live_mut(&mut self, id: Uuid) -> Result<&mut Position> {
        self.positions
            .get_mut(&id)
            .ok_or(TrackerError::UnknownPosition(id))
    }

    fn sorted_live<'a>(&'a self, ids: impl Iterator<Item = &'a Uuid>) -> Vec<Position> {
        let mut out: Vec<Position> = ids.filter_map(|id| self.positions.get(id).cloned()).collect();
        out.sort_by_key(|p| p.created_at);
        out
    }
}

/// Authoritative store of positions
pub struct PositionTracker {
    clock: Arc<dyn Clock>,
    state: RwLock<TrackerState>,
}

impl PositionTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(TrackerState::default()),
        }
    }

    fn validate_symbol(symbol: &str) -> Result<()> {
        if symbol.trim().is_empty() {
            return Err(TrackerError::InvalidSymbol(symbol.to_string()));
        }
        Ok(())
    }

    /// Open a position filled in full at the entry price
    pub fn create_position(&self, request: OpenRequest) -> Result<Position> {
        Self::validate_symbol(&request.symbol)?;
        let now = self.clock.now();

        let position = Position::filled(
            request.symbol,
            request.side,
            request.size,
            request.entry_price,
            request.fees,
            now,
        )?
        .with_strategy(request.strategy)
        .with_tags(request.tags);

        info!(
            "[TRACKER] Opened {} {:?} {} @ {} ({})",
            position.symbol, position.side, position.original_size, position.entry_price, position.id
        );

        self.state.write().insert(position.clone());
        Ok(position)
    }

    /// Open a position with nothing filled yet
    pub fn create_pending(
        &self,
        symbol: &str,
        side: PositionSide,
        size: Decimal,
        strategy: Option<String>,
        tags: Vec<String>,
    ) -> Result<Position> {
        Self::validate_symbol(symbol)?;
        let position = Position::pending(symbol, side, size, self.clock.now())?
            .with_strategy(strategy)
            .with_tags(tags);

        debug!("[TRACKER] Pending {} {:?} {} ({})", symbol, side, size, position.id);

        self.state.write().insert(position.clone());
        Ok(position)
    }

    /// Apply an execution to a pending or partially filled position
    pub fn add_fill(
        &self,
        id: Uuid,
        size: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Result<Position> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let position = state.live_mut(id)?;
        position.apply_fill(size, price, fees, now)?;

        debug!(
            "[TRACKER] Fill {} {} @ {} -> avg {} ({}/{})",
            position.symbol,
            size,
            price,
            position.average_entry_price,
            position.filled_size,
            position.original_size
        );
        Ok(position.clone())
    }

    /// Cancel a position that never filled
    pub fn cancel(&self, id: Uuid) -> Result<Position> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let position = state.live_mut(id)?;
        position.cancel(now)?;
        let cancelled = position.clone();
        state.retire(id);

        info!("[TRACKER] Cancelled {} ({})", cancelled.symbol, id);
        Ok(cancelled)
    }

    /// Re-mark every live position in `symbol`.
    ///
    /// Returns the ids whose price actually moved. Repeating the same price
    /// is a no-op.
    pub fn update_price(&self, symbol: &str, price: Decimal) -> Result<Vec<Uuid>> {
        if price <= Decimal::ZERO {
            return Err(TrackerError::InvalidPrice {
                symbol: symbol.to_string(),
                price: price.to_string(),
            });
        }

        let now = self.clock.now();
        let mut guard = self.state.write();
        let state = &mut *guard;
        let Some(ids) = state.by_symbol.get(symbol) else {
            return Ok(Vec::new());
        };

        let mut changed = Vec::new();
        for id in ids {
            if let Some(position) = state.positions.get_mut(id) {
                // Unfilled positions have nothing to mark
                if position.filled_size.is_zero() {
                    continue;
                }
                if position.mark(price, now) {
                    changed.push(*id);
                }
            }
        }

        if !changed.is_empty() {
            debug!("[TRACKER] {} marked @ {} ({} positions)", symbol, price, changed.len());
        }
        Ok(changed)
    }

    /// Close up to `size` of a position, returning the realized PnL
    pub fn close_partial(
        &self,
        id: Uuid,
        size: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Result<Decimal> {
        let now = self.clock.now();
        let mut state = self.state.write();
        let position = state.live_mut(id)?;
        let pnl = position.close(size, price, fees, now)?;
        let status = position.status;
        let symbol = position.symbol.clone();

        if status == PositionStatus::Closed {
            state.retire(id);
            info!("[TRACKER] Closed {} @ {} pnl={} ({})", symbol, price, pnl, id);
        } else {
            info!("[TRACKER] Reduced {} by {} @ {} pnl={} ({})", symbol, size, price, pnl, id);
        }
        Ok(pnl)
    }

    /// Close the whole open size of a position
    pub fn close_full(&self, id: Uuid, price: Decimal, fees: Decimal) -> Result<Decimal> {
        let size = {
            let state = self.state.read();
            state
                .positions
                .get(&id)
                .map(|p| p.current_size)
                .ok_or(TrackerError::UnknownPosition(id))?
        };
        if size.is_zero() {
            warn!("[TRACKER] Close requested on unfilled position {}", id);
        }
        self.close_partial(id, size, price, fees)
    }

    /// Live or historical position by id
    pub fn position(&self, id: Uuid) -> Option<Position> {
        let state = self.state.read();
        state
            .positions
            .get(&id)
            .cloned()
            .or_else(|| state.closed.iter().find(|p| p.id == id).cloned())
    }

    /// All live positions, oldest first
    pub fn open_positions(&self) -> Vec<Position> {
        let state = self.state.read();
        state.sorted_live(state.positions.keys())
    }

    /// Live positions in one symbol, oldest first
    pub fn positions_for_symbol(&self, symbol: &str) -> Vec<Position> {
        let state = self.state.read();
        match state.by_symbol.get(symbol) {
            Some(ids) => state.sorted_live(ids.iter()),
            None => Vec::new(),
        }
    }

    pub fn closed_positions(&self) -> Vec<Position> {
        self.state.read().closed.clone()
    }

    /// Positions retired at or after `since`
    pub fn closed_since(&self, since: DateTime<Utc>) -> Vec<Position> {
        self.state
            .read()
            .closed
            .iter()
            .filter(|p| p.closed_at.is_some_and(|t| t >= since))
            .cloned()
            .collect()
    }

    pub fn open_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.state.read().by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn open_count(&self) -> usize {
        self.state.read().positions.len()
    }

    /// Aggregate the book. Computed under the exclusive lock so the result
    /// never mixes pre- and post-update positions.
    pub fn portfolio_summary(&self) -> PortfolioSummary {
        let now = self.clock.now();
        let state = self.state.write();
        PortfolioSummary::build(state.positions.values(), &state.closed, now)
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = self.state.read();
        TrackerSnapshot {
            open: state.sorted_live(state.positions.keys()),
            closed: state.closed.clone(),
        }
    }

    /// Replace the book with a previously saved snapshot.
    ///
    /// Entries in `open` that are no longer live go to history.
    pub fn restore(&self, snapshot: TrackerSnapshot) {
        let mut state = self.state.write();
        *state = TrackerState::default();

        let mut misplaced = 0usize;
        for position in snapshot.open {
            if position.status.is_live() {
                state.insert(position);
            } else {
                misplaced += 1;
                state.closed.push(position);
            }
        }
        state.closed.extend(snapshot.closed);

        if misplaced > 0 {
            warn!("[TRACKER] {} restored positions were not live, moved to history", misplaced);
        }
        info!(
            "[TRACKER] Restored {} open, {} closed positions",
            state.positions.len(),
            state.closed.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_clock::ManualClock;
    use rust_decimal_macros::dec;

    fn setup() -> (PositionTracker, Arc<ManualClock>) {
        let clock = ManualClock::starting_now();
        (PositionTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_create_and_lookup() {
        let (tracker, _) = setup();
        let pos = tracker
            .create_position(
                OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.5), dec!(60000))
                    .with_strategy("threshold")
                    .with_fees(dec!(3)),
            )
            .unwrap();

        assert_eq!(tracker.open_count(), 1);
        assert_eq!(tracker.position(pos.id).unwrap().strategy.as_deref(), Some("threshold"));
        assert_eq!(tracker.positions_for_symbol("BTC-USD").len(), 1);
        assert_eq!(tracker.open_symbols(), vec!["BTC-USD".to_string()]);
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let (tracker, _) = setup();
        let err = tracker
            .create_position(OpenRequest::new("  ", PositionSide::Long, dec!(1), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidSymbol(_)));
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn test_update_price_reports_changes_only() {
        let (tracker, _) = setup();
        let a = tracker
            .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(2), dec!(3000)))
            .unwrap();
        tracker
            .create_position(OpenRequest::new("SOL-USD", PositionSide::Long, dec!(10), dec!(150)))
            .unwrap();

        let changed = tracker.update_price("ETH-USD", dec!(3100)).unwrap();
        assert_eq!(changed, vec![a.id]);
        assert_eq!(tracker.position(a.id).unwrap().unrealized_pnl, dec!(200));

        assert!(tracker.update_price("ETH-USD", dec!(3100)).unwrap().is_empty());
        assert!(tracker.update_price("DOGE-USD", dec!(1)).unwrap().is_empty());
        assert!(tracker.update_price("ETH-USD", dec!(0)).is_err());
    }

    #[test]
    fn test_close_moves_to_history() {
        let (tracker, clock) = setup();
        let pos = tracker
            .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(1), dec!(100)))
            .unwrap();

        clock.advance(chrono::Duration::minutes(5));
        let pnl = tracker.close_full(pos.id, dec!(120), dec!(1)).unwrap();
        assert_eq!(pnl, dec!(19));

        assert_eq!(tracker.open_count(), 0);
        assert!(tracker.open_symbols().is_empty());
        assert_eq!(tracker.closed_positions().len(), 1);
        assert_eq!(tracker.closed_since(clock.now()).len(), 1);

        // History is terminal
        assert_eq!(
            tracker.close_full(pos.id, dec!(120), dec!(0)),
            Err(TrackerError::UnknownPosition(pos.id))
        );
        assert_eq!(tracker.position(pos.id).unwrap().status, PositionStatus::Closed);
    }

    #[test]
    fn test_pending_fill_and_cancel() {
        let (tracker, _) = setup();
        let pending = tracker
            .create_pending("ADA-USD", PositionSide::Long, dec!(100), None, vec![])
            .unwrap();
        let other = tracker
            .create_pending("ADA-USD", PositionSide::Long, dec!(50), None, vec![])
            .unwrap();

        let filled = tracker.add_fill(pending.id, dec!(40), dec!(0.5), dec!(0)).unwrap();
        assert_eq!(filled.filled_size, dec!(40));
        assert!(tracker.cancel(pending.id).is_err());

        let cancelled = tracker.cancel(other.id).unwrap();
        assert_eq!(cancelled.status, PositionStatus::Cancelled);
        assert_eq!(tracker.open_count(), 1);
    }

    #[test]
    fn test_summary_aggregates_symbols() {
        let (tracker, _) = setup();
        tracker
            .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(2), dec!(100)))
            .unwrap();
        tracker
            .create_position(OpenRequest::new("BTC-USD", PositionSide::Short, dec!(1), dec!(100)))
            .unwrap();
        let eth = tracker
            .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(1), dec!(50)))
            .unwrap();
        tracker.update_price("BTC-USD", dec!(110)).unwrap();
        tracker.close_partial(eth.id, dec!(1), dec!(60), dec!(0)).unwrap();

        let summary = tracker.portfolio_summary();
        assert_eq!(summary.open_positions, 2);
        assert_eq!(summary.closed_positions, 1);
        assert_eq!(summary.total_value, dec!(330));
        assert_eq!(summary.total_cost, dec!(300));
        // +20 long, -10 short
        assert_eq!(summary.total_unrealized_pnl, dec!(10));
        assert_eq!(summary.total_realized_pnl, dec!(10));

        let btc = &summary.symbols["BTC-USD"];
        assert_eq!(btc.net_size, dec!(1));
        assert_eq!(btc.gross_size, dec!(3));
        assert_eq!(btc.position_count, 2);
        assert_eq!(btc.last_price, dec!(110));
        assert!(!summary.symbols.contains_key("ETH-USD"));
    }

    #[test]
    fn test_snapshot_restore() {
        let (tracker, _) = setup();
        let open = tracker
            .create_position(OpenRequest::new("BTC-USD", PositionSide::Long, dec!(1), dec!(100)))
            .unwrap();
        let closed = tracker
            .create_position(OpenRequest::new("ETH-USD", PositionSide::Long, dec!(1), dec!(10)))
            .unwrap();
        tracker.close_full(closed.id, dec!(11), dec!(0)).unwrap();

        let snapshot = tracker.snapshot();
        let (restored, _) = setup();
        restored.restore(snapshot.clone());

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.position(open.id).unwrap().symbol, "BTC-USD");
        assert_eq!(restored.open_symbols(), vec!["BTC-USD".to_string()]);
    }
}

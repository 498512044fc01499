use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::side::PositionSide;
use crate::values::{Price, Quantity, Symbol};

/// Minimum price move that counts as a change when re-marking a position
pub const PRICE_EPSILON: Decimal = dec!(0.00000001);

/// Position lifecycle status
///
/// Moves forward only: `Open -> Partial -> Closed`, or `Open -> Cancelled`
/// while nothing has been filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Partial,
    Closed,
    Cancelled,
}

impl PositionStatus {
    /// Still part of the live book?
    pub fn is_live(&self) -> bool {
        matches!(self, PositionStatus::Open | PositionStatus::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::Partial => "partial",
            PositionStatus::Closed => "closed",
            PositionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("Size must be positive, got {0}")]
    InvalidSize(Decimal),

    #[error("Price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("Fees must not be negative, got {0}")]
    InvalidFees(Decimal),

    #[error("Fill of {fill} would exceed original size {original} (already filled {filled})")]
    Overfill {
        fill: Decimal,
        filled: Decimal,
        original: Decimal,
    },

    #[error("Position is {0:?}, operation not allowed")]
    InvalidStatus(PositionStatus),

    #[error("Position has no open size to close")]
    NothingToClose,
}

/// A tracked long/short exposure to one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique position identifier
    pub id: Uuid,
    /// Traded symbol
    pub symbol: Symbol,
    /// Long or short
    pub side: PositionSide,
    /// Lifecycle status
    pub status: PositionStatus,

    /// Size originally requested
    pub original_size: Quantity,
    /// Size currently open (filled minus closed)
    pub current_size: Quantity,
    /// Size filled so far
    pub filled_size: Quantity,

    /// Price of the first fill
    pub entry_price: Price,
    /// Latest mark price
    pub current_price: Price,
    /// Cost-weighted average entry over all fills
    pub average_entry_price: Price,

    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_pct: Decimal,
    pub realized_pnl: Decimal,
    pub realized_pnl_pct: Decimal,
    /// Average entry times open size
    pub cost_basis: Decimal,
    /// Open size times mark price
    pub current_value: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,

    /// Strategy that opened the position
    pub strategy: Option<String>,
    /// Free-form labels
    pub tags: Vec<String>,

    /// Cumulative fees paid
    pub fees: Decimal,
    /// Number of fills applied
    pub fill_count: u32,
}

impl Position {
    /// Create a position that is waiting for fills
    pub fn pending(
        symbol: impl Into<Symbol>,
        side: PositionSide,
        size: Quantity,
        now: DateTime<Utc>,
    ) -> Result<Self, PositionError> {
        if size <= Decimal::ZERO {
            return Err(PositionError::InvalidSize(size));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            side,
            status: PositionStatus::Open,
            original_size: size,
            current_size: Decimal::ZERO,
            filled_size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            current_price: Decimal::ZERO,
            average_entry_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_pct: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            realized_pnl_pct: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            current_value: Decimal::ZERO,
            created_at: now,
            updated_at: now,
            closed_at: None,
            strategy: None,
            tags: Vec::new(),
            fees: Decimal::ZERO,
            fill_count: 0,
        })
    }

    /// Create a position filled in full at the entry price
    pub fn filled(
        symbol: impl Into<Symbol>,
        side: PositionSide,
        size: Quantity,
        entry_price: Price,
        fees: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Self, PositionError> {
        let mut position = Self::pending(symbol, side, size, now)?;
        position.apply_fill(size, entry_price, fees, now)?;
        Ok(position)
    }

    /// Builder: set strategy tag
    pub fn with_strategy(mut self, strategy: Option<String>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder: set labels
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Size already closed out
    pub fn closed_size(&self) -> Quantity {
        self.filled_size - self.current_size
    }

    /// Notional at the average entry price
    pub fn notional(&self) -> Decimal {
        self.current_size * self.average_entry_price
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }

    /// Apply an execution to this position
    pub fn apply_fill(
        &mut self,
        size: Quantity,
        price: Price,
        fees: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), PositionError> {
        if self.status != PositionStatus::Open {
            return Err(PositionError::InvalidStatus(self.status));
        }
        if size <= Decimal::ZERO {
            return Err(PositionError::InvalidSize(size));
        }
        if price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice(price));
        }
        if fees < Decimal::ZERO {
            return Err(PositionError::InvalidFees(fees));
        }
        if self.filled_size + size > self.original_size {
            return Err(PositionError::Overfill {
                fill: size,
                filled: self.filled_size,
                original: self.original_size,
            });
        }

        // Running cost-weighted average over everything filled so far
        let total_cost = self.average_entry_price * self.filled_size + size * price;
        let new_filled = self.filled_size + size;
        self.average_entry_price = total_cost / new_filled;

        if self.fill_count == 0 {
            self.entry_price = price;
            self.current_price = price;
        }

        self.filled_size = new_filled;
        self.current_size += size;
        self.fees += fees;
        self.fill_count += 1;
        self.updated_at = now;
        self.recompute();

        Ok(())
    }

    /// Re-mark at a new price. Returns true if the price actually moved.
    pub fn mark(&mut self, price: Price, now: DateTime<Utc>) -> bool {
        if (price - self.current_price).abs() <= PRICE_EPSILON {
            return false;
        }
        self.current_price = price;
        self.updated_at = now;
        self.recompute();
        true
    }

    /// Close up to `size` at `price`, returning realized PnL for this close.
    ///
    /// `size` is clamped to the open size. Reaching zero marks the position
    /// closed and stamps `closed_at`.
    pub fn close(
        &mut self,
        size: Quantity,
        price: Price,
        fees: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, PositionError> {
        if !self.status.is_live() {
            return Err(PositionError::InvalidStatus(self.status));
        }
        if size <= Decimal::ZERO {
            return Err(PositionError::InvalidSize(size));
        }
        if price <= Decimal::ZERO {
            return Err(PositionError::InvalidPrice(price));
        }
        if fees < Decimal::ZERO {
            return Err(PositionError::InvalidFees(fees));
        }
        if self.current_size.is_zero() {
            return Err(PositionError::NothingToClose);
        }

        let closed = size.min(self.current_size);
        let pnl = self.side.direction() * (price - self.average_entry_price) * closed - fees;

        self.realized_pnl += pnl;
        self.current_size -= closed;
        self.fees += fees;
        self.current_price = price;
        self.updated_at = now;

        let closed_cost = self.closed_size() * self.average_entry_price;
        if closed_cost > Decimal::ZERO {
            self.realized_pnl_pct = self.realized_pnl / closed_cost * Decimal::ONE_HUNDRED;
        }

        if self.current_size.is_zero() {
            self.status = PositionStatus::Closed;
            if self.closed_at.is_none() {
                self.closed_at = Some(now);
            }
        } else {
            self.status = PositionStatus::Partial;
        }
        self.recompute();

        Ok(pnl)
    }

    /// Cancel a position that never received a fill
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), PositionError> {
        if self.status != PositionStatus::Open || !self.filled_size.is_zero() {
            return Err(PositionError::InvalidStatus(self.status));
        }
        self.status = PositionStatus::Cancelled;
        self.updated_at = now;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Derived fields. Called after every price or size mutation.
    fn recompute(&mut self) {
        self.cost_basis = self.average_entry_price * self.current_size;
        self.current_value = self.current_price * self.current_size;
        self.unrealized_pnl = self.side.direction()
            * (self.current_price - self.average_entry_price)
            * self.current_size;
        self.unrealized_pnl_pct = if self.cost_basis > Decimal::ZERO {
            self.unrealized_pnl / self.cost_basis * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_filled_long_position() {
        let pos = Position::filled("BTC-USD", PositionSide::Long, dec!(2), dec!(100), dec!(1), now())
            .unwrap();

        assert_eq!(pos.status, PositionStatus::Open);
        assert_eq!(pos.filled_size, dec!(2));
        assert_eq!(pos.current_size, dec!(2));
        assert_eq!(pos.average_entry_price, dec!(100));
        assert_eq!(pos.cost_basis, dec!(200));
        assert_eq!(pos.current_value, dec!(200));
        assert_eq!(pos.fees, dec!(1));
        assert_eq!(pos.fill_count, 1);
    }

    #[test]
    fn test_rejects_non_positive_inputs() {
        assert_eq!(
            Position::pending("BTC-USD", PositionSide::Long, dec!(0), now()),
            Err(PositionError::InvalidSize(dec!(0)))
        );
        assert_eq!(
            Position::filled("BTC-USD", PositionSide::Long, dec!(1), dec!(-5), dec!(0), now()),
            Err(PositionError::InvalidPrice(dec!(-5)))
        );
    }

    #[test]
    fn test_weighted_average_over_fills() {
        let mut pos = Position::pending("ETH-USD", PositionSide::Long, dec!(3), now()).unwrap();
        pos.apply_fill(dec!(1), dec!(100), dec!(0), now()).unwrap();
        pos.apply_fill(dec!(2), dec!(130), dec!(0), now()).unwrap();

        // (100 + 260) / 3
        assert_eq!(pos.average_entry_price, dec!(120));
        assert_eq!(pos.entry_price, dec!(100));
        assert_eq!(pos.status, PositionStatus::Open);
    }

    #[test]
    fn test_overfill_rejected() {
        let mut pos = Position::pending("ETH-USD", PositionSide::Long, dec!(1), now()).unwrap();
        pos.apply_fill(dec!(0.6), dec!(100), dec!(0), now()).unwrap();
        let err = pos.apply_fill(dec!(0.5), dec!(100), dec!(0), now()).unwrap_err();
        assert!(matches!(err, PositionError::Overfill { .. }));
        assert_eq!(pos.filled_size, dec!(0.6));
    }

    #[test]
    fn test_mark_updates_unrealized() {
        let mut pos =
            Position::filled("BTC-USD", PositionSide::Long, dec!(2), dec!(100), dec!(0), now()).unwrap();

        assert!(pos.mark(dec!(110), now()));
        assert_eq!(pos.unrealized_pnl, dec!(20));
        assert_eq!(pos.unrealized_pnl_pct, dec!(10));
        assert_eq!(pos.current_value, dec!(220));

        // Same price is not a change
        assert!(!pos.mark(dec!(110), now()));
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut pos =
            Position::filled("BTC-USD", PositionSide::Short, dec!(1), dec!(100), dec!(0), now()).unwrap();
        pos.mark(dec!(90), now());
        assert_eq!(pos.unrealized_pnl, dec!(10));

        let pnl = pos.close(dec!(1), dec!(80), dec!(0.5), now()).unwrap();
        assert_eq!(pnl, dec!(19.5));
        assert_eq!(pos.status, PositionStatus::Closed);
    }

    #[test]
    fn test_partial_then_full_close() {
        let mut pos =
            Position::filled("BTC-USD", PositionSide::Long, dec!(4), dec!(100), dec!(0), now()).unwrap();

        let first = pos.close(dec!(1), dec!(110), dec!(0), now()).unwrap();
        assert_eq!(first, dec!(10));
        assert_eq!(pos.status, PositionStatus::Partial);
        assert_eq!(pos.current_size, dec!(3));
        assert_eq!(pos.closed_size(), dec!(1));
        assert!(pos.closed_at.is_none());

        // Oversized close is clamped to what is open
        let second = pos.close(dec!(10), dec!(110), dec!(0), now()).unwrap();
        assert_eq!(second, dec!(30));
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.current_size, dec!(0));
        assert_eq!(pos.realized_pnl, dec!(40));
        assert_eq!(pos.realized_pnl_pct, dec!(10));
        assert!(pos.closed_at.is_some());

        assert!(matches!(
            pos.close(dec!(1), dec!(110), dec!(0), now()),
            Err(PositionError::InvalidStatus(PositionStatus::Closed))
        ));
    }

    #[test]
    fn test_cancel_only_before_fill() {
        let mut pending = Position::pending("SOL-USD", PositionSide::Long, dec!(5), now()).unwrap();
        pending.cancel(now()).unwrap();
        assert_eq!(pending.status, PositionStatus::Cancelled);
        assert!(pending.closed_at.is_some());

        let mut filled =
            Position::filled("SOL-USD", PositionSide::Long, dec!(5), dec!(20), dec!(0), now()).unwrap();
        assert!(filled.cancel(now()).is_err());
    }
}

//! Meridian Position Tracker
//!
//! Owns the canonical set of positions and their lifecycle:
//! - **Creation**: filled immediately, or pending until fills arrive
//! - **Fills**: running cost-weighted average entry price
//! - **Price ticks**: unrealized PnL recomputed on every move
//! - **Closes**: partial or full, realized PnL per close
//! - **History**: fully closed positions move into an append-only list
//!
//! Every mutation and the portfolio summary run under one exclusive lock,
//! so no reader ever sees a position mid-recomputation. Other components
//! only ever receive copies.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_position_tracker::{PositionTracker, OpenRequest};
//!
//! let tracker = PositionTracker::new(clock);
//! let position = tracker.create_position(
//!     OpenRequest::new("BTC-USD", PositionSide::Long, dec!(0.5), dec!(60000))
//! )?;
//! tracker.update_price("BTC-USD", dec!(61000));
//! let pnl = tracker.close_full(position.id, dec!(62000), dec!(3))?;
//! ```

pub mod error;
pub mod summary;
pub mod tracker;

// Re-export main types
pub use error::{Result, TrackerError};
pub use summary::{PortfolioSummary, SymbolExposure};
pub use tracker::{OpenRequest, PositionTracker, TrackerSnapshot};

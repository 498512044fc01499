//! Meridian Ports
//!
//! Port definitions (traits) for the Meridian portfolio engine.
//! These define the boundaries between the engine and its collaborators:
//! time, trade execution, market data/balances, and durable snapshots.

mod clock;
mod error;
mod executor;
mod price;
mod store;

pub use clock::Clock;
pub use error::{ExecutorError, PriceSourceError, StoreError};
pub use executor::{TradeExecutor, TradeFill};
pub use price::{PriceSource, Ticker};
pub use store::{SnapshotKind, SnapshotStore};

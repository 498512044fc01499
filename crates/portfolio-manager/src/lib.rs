//! Meridian Portfolio Manager
//!
//! Single entry point to the engine:
//!
//! ```text
//!                    ┌──────────────────────┐
//!   callers ───────► │   PortfolioManager   │ ──► events (broadcast)
//!                    └──────────┬───────────┘
//!        ┌──────────────┬───────┴──────┬───────────────┐
//!        ▼              ▼              ▼               ▼
//!   PositionTracker  RiskManager   Rebalancer    AnalyticsEngine
//!                                      │
//!                                      ▼
//!                                TradeExecutor
//! ```
//!
//! Background tasks (value sampling, analytics, rebalance scan, price
//! refresh, backup) run on tokio and stop cooperatively. State is saved
//! through a [`SnapshotStore`](meridian_ports::SnapshotStore) after every
//! material change.

pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod manager;
mod scheduler;
pub mod store;

// Re-export main types
pub use config::{EngineConfig, PersistenceConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use events::PortfolioEvent;
pub use export::{ExportDocument, ExportFormat};
pub use manager::{BalanceDiscrepancy, PortfolioManager};
pub use store::{JsonFileStore, MemoryStore};

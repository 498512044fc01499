//! Meridian Risk Manager
//!
//! Decides whether a new position is acceptable, independent of the
//! strategy that asked for it:
//!
//! - **Pre-trade checks**: cooling-off, absolute size, % of portfolio,
//!   symbol exposure, position count, trade frequency, volatility, daily loss
//! - **Risk metrics**: VaR, expected shortfall, drawdown, Sharpe/Sortino/Calmar,
//!   concentration and a composite risk score
//! - **Sizing**: capped Kelly, inverse volatility and risk budget
//! - **Cooling-off**: drawdown and position-count breaches block new
//!   positions for a configured window
//!
//! ## Check order
//!
//! ```text
//! cooling-off ─► size USD ─► position % ─► symbol % ─► count ─► frequency ─► volatility ─► daily loss
//!    Block        Block        Limit        Limit      Limit      Limit         Warn          Block
//! ```

pub mod decision;
pub mod error;
pub mod limits;
pub mod manager;
pub mod metrics;
pub mod sizing;

// Re-export main types
pub use decision::{RiskCheck, RiskDecision, RiskViolation, ViolationKind};
pub use error::{Result, RiskError};
pub use limits::RiskLimits;
pub use manager::{RiskManager, RiskReport};
pub use metrics::{RiskLevel, RiskMetrics};
pub use sizing::{PositionSizing, SizingConstraint, TradeStats, kelly_fraction};

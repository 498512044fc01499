//! Meridian Rebalancer
//!
//! Keeps the book close to a set of target weights:
//!
//! 1. **Drift**: current weight minus target weight, in points
//! 2. **Plan**: one of six strategies turns drift into trades
//! 3. **Execute**: trades run one at a time by priority, each risk-checked
//!    just before it is sent, with a pause between trades
//!
//! ## Strategies
//!
//! | Strategy | Trades |
//! |----------|--------|
//! | Threshold | Overweight symbols past the minimum drift sold back to target |
//! | DCA | Buy-only, a slice of each gap, capped per symbol |
//! | Grid | Buy ladder evenly spaced around the price |
//! | Momentum | Targets tilted by unrealized PnL |
//! | MeanReversion | Half of each gap |
//! | RiskParity | Inverse-volatility weights |

pub mod config;
pub mod error;
pub mod plan;
pub mod rebalancer;
pub mod strategies;

// Re-export main types
pub use config::{RebalanceConfig, RebalanceStrategy};
pub use error::{RebalanceError, Result};
pub use plan::{DriftReport, RebalanceResult, RebalanceTarget, TradeAction};
pub use rebalancer::Rebalancer;
pub use strategies::PlanInputs;

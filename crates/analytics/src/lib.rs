//! Meridian Analytics
//!
//! Performance reporting over rolling periods:
//!
//! - **Metrics**: return, annualized return, volatility, Sharpe, Sortino,
//!   Calmar, drawdown, trade statistics, beta and alpha
//! - **Attribution**: PnL by symbol and strategy, market/selection/interaction
//! - **Reports**: metrics for many periods plus benchmark comparison and a
//!   risk snapshot
//!
//! Metrics are cached per period for the configured TTL.

pub mod attribution;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod report;

// Re-export main types
pub use attribution::AttributionAnalysis;
pub use config::AnalyticsConfig;
pub use engine::AnalyticsEngine;
pub use metrics::{PerformanceMetrics, Sample};
pub use report::{BenchmarkComparison, PerformanceReport};

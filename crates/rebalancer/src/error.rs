//! Rebalancer errors

use meridian_core::ArithmeticError;
use meridian_position_tracker::TrackerError;
use meridian_risk_manager::RiskError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RebalanceError {
    #[error("Invalid target allocation: {0}")]
    InvalidAllocation(String),

    #[error("No target allocations set")]
    NoTargets,

    #[error("A rebalance is already executing")]
    AlreadyRunning,

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

pub type Result<T> = std::result::Result<T, RebalanceError>;

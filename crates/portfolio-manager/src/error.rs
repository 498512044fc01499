//! Portfolio manager errors

use meridian_ports::{PriceSourceError, StoreError};
use meridian_position_tracker::TrackerError;
use meridian_rebalancer::RebalanceError;
use meridian_risk_manager::{RiskCheck, RiskError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Risk check {outcome:?}: {reason}")]
    RiskRejected {
        outcome: RiskCheck,
        reason: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Rebalance error: {0}")]
    Rebalance(#[from] RebalanceError),

    #[error("Price source error: {0}")]
    PriceSource(#[from] PriceSourceError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Background tasks already running")]
    AlreadyRunning,
}

impl Error {
    /// Seconds until a rejected request may succeed
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Error::RiskRejected {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

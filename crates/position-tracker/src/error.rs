//! Position Tracker errors

use meridian_core::PositionError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Unknown position: {0}")]
    UnknownPosition(Uuid),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: String },

    #[error(transparent)]
    Position(#[from] PositionError),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

//! Risk Manager errors
//!
//! Pre-trade outcomes (Warn/Limit/Block) are values, see [`crate::RiskDecision`].
//! These errors are for inputs the manager cannot evaluate at all.

use meridian_core::ArithmeticError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Price must be positive, got {0}")]
    InvalidPrice(Decimal),

    #[error("Size must be positive, got {0}")]
    InvalidSize(Decimal),

    #[error("Volatility for {symbol} must be positive, got {value}")]
    InvalidVolatility { symbol: String, value: f64 },

    #[error("Invalid Kelly inputs: {0}")]
    InvalidKellyInputs(String),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),
}

pub type Result<T> = std::result::Result<T, RiskError>;

//! Guarded arithmetic
//!
//! Division by a zero or near-zero denominator and non-finite float results
//! never crash and never silently become zero: they either surface as an
//! [`ArithmeticError`] or resolve to an explicit default with a `warn!` trail.

use log::warn;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use thiserror::Error;

/// Denominators smaller than this are treated as zero
pub const F64_EPSILON: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArithmeticError {
    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Non-positive {context}: {value}")]
    NonPositive { context: String, value: f64 },

    #[error("Non-finite result in {context}")]
    NonFinite { context: String },
}

/// Decimal division that fails on a zero denominator
pub fn checked_div(
    numerator: Decimal,
    denominator: Decimal,
    context: &str,
) -> Result<Decimal, ArithmeticError> {
    if denominator.is_zero() {
        return Err(ArithmeticError::DivisionByZero {
            context: context.to_string(),
        });
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| ArithmeticError::NonFinite {
            context: context.to_string(),
        })
}

/// Float division that fails on a near-zero denominator or non-finite result
pub fn checked_ratio(numerator: f64, denominator: f64, context: &str) -> Result<f64, ArithmeticError> {
    if !denominator.is_finite() || denominator.abs() < F64_EPSILON {
        return Err(ArithmeticError::DivisionByZero {
            context: context.to_string(),
        });
    }
    let value = numerator / denominator;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ArithmeticError::NonFinite {
            context: context.to_string(),
        })
    }
}

/// Float division resolving to `default` (logged) when unguarded division would misbehave
pub fn ratio_or(numerator: f64, denominator: f64, default: f64, context: &str) -> f64 {
    match checked_ratio(numerator, denominator, context) {
        Ok(value) => value,
        Err(e) => {
            warn!("[MATH] {}, using {}", e, default);
            default
        }
    }
}

/// Decimal division resolving to `default` (logged) on a zero denominator
pub fn div_or(numerator: Decimal, denominator: Decimal, default: Decimal, context: &str) -> Decimal {
    match checked_div(numerator, denominator, context) {
        Ok(value) => value,
        Err(e) => {
            warn!("[MATH] {}, using {}", e, default);
            default
        }
    }
}

/// Require a strictly positive, finite value
pub fn require_positive(value: f64, context: &str) -> Result<f64, ArithmeticError> {
    if !value.is_finite() {
        return Err(ArithmeticError::NonFinite {
            context: context.to_string(),
        });
    }
    if value <= 0.0 {
        return Err(ArithmeticError::NonPositive {
            context: context.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Decimal to f64 for statistics
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_else(|| {
        warn!("[MATH] Decimal {} not representable as f64, using 0", value);
        0.0
    })
}

/// f64 back to Decimal (money-facing results)
pub fn to_decimal(value: f64, context: &str) -> Result<Decimal, ArithmeticError> {
    if !value.is_finite() {
        return Err(ArithmeticError::NonFinite {
            context: context.to_string(),
        });
    }
    Decimal::from_f64(value).ok_or_else(|| ArithmeticError::NonFinite {
        context: context.to_string(),
    })
}

/// f64 to Decimal, falling back to zero with a warning
pub fn to_decimal_or_zero(value: f64, context: &str) -> Decimal {
    to_decimal(value, context).unwrap_or_else(|e| {
        warn!("[MATH] {}, using 0", e);
        Decimal::ZERO
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_checked_div() {
        assert_eq!(checked_div(dec!(10), dec!(4), "test"), Ok(dec!(2.5)));
        assert!(matches!(
            checked_div(dec!(10), dec!(0), "test"),
            Err(ArithmeticError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn test_checked_ratio_near_zero() {
        assert!(checked_ratio(1.0, 1e-15, "tiny").is_err());
        assert!(checked_ratio(1.0, f64::NAN, "nan").is_err());
        assert_eq!(checked_ratio(3.0, 2.0, "ok"), Ok(1.5));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(ratio_or(1.0, 0.0, -1.0, "test"), -1.0);
        assert_eq!(div_or(dec!(1), dec!(0), dec!(7), "test"), dec!(7));
    }

    #[test]
    fn test_require_positive() {
        assert!(require_positive(0.0, "vol").is_err());
        assert!(require_positive(-1.0, "vol").is_err());
        assert!(require_positive(f64::INFINITY, "vol").is_err());
        assert_eq!(require_positive(0.3, "vol"), Ok(0.3));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(to_f64(dec!(1.5)), 1.5);
        assert!(to_decimal(f64::NAN, "nan").is_err());
        assert_eq!(to_decimal_or_zero(f64::INFINITY, "inf"), Decimal::ZERO);
    }
}

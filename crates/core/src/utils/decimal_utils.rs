use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::constants::{FLOAT_REL_TOLERANCE, QUANTITY_THRESHOLD};

/// Absolute tolerance for decimal comparisons.
pub fn quantity_threshold() -> Decimal {
    Decimal::from_str(QUANTITY_THRESHOLD).unwrap_or(Decimal::ZERO)
}

/// Decimal closeness check used by the multiplier and report code.
pub fn is_close(a: Decimal, b: Decimal) -> bool {
    (a - b).abs() <= quantity_threshold()
}

pub fn is_zero(value: Decimal) -> bool {
    is_close(value, Decimal::ZERO)
}

/// Float closeness check with a relative tolerance.
pub fn is_close_f64(a: f64, b: f64) -> bool {
    (a - b).abs() <= FLOAT_REL_TOLERANCE * a.abs().max(b.abs()).max(1e-12) || (a - b).abs() < 1e-12
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Converts a float into a decimal, mapping NaN and infinities to zero.
pub fn from_f64(value: f64) -> Decimal {
    if value.is_finite() {
        Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
    } else {
        Decimal::ZERO
    }
}

/// Division that yields zero instead of failing on a zero divisor.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        Decimal::ZERO
    } else {
        numerator.checked_div(denominator).unwrap_or(Decimal::ZERO)
    }
}

//! Instrument and schedule math error types.

use thiserror::Error;

/// Errors raised by period arithmetic, day-count conventions and bond math.
///
/// Callers in the computation layer log these and fall back to `0.0` or an
/// empty sequence; they only surface directly from the low-level functions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InstrumentError {
    /// Day-count dispatch failed. `key` identifies the calling routine
    /// (`coupon_accrual_factor` or `get_coupon`) so the failure is traceable.
    #[error("Unknown accrual calculation model in {key}: {message}")]
    UnknownConvention { key: String, message: String },

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Instrument {0} has no maturity date")]
    NoMaturity(String),

    #[error("Instrument {0} has no accrual schedule active on {1}")]
    NoActiveSchedule(String, String),

    #[error("Calculation did not converge: {0}")]
    NotConverged(String),

    #[error("Invalid instrument data: {0}")]
    InvalidData(String),
}

impl InstrumentError {
    pub fn unknown_convention(key: &str, message: impl Into<String>) -> Self {
        InstrumentError::UnknownConvention {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Deterministic error key for structured error entries.
    pub fn error_key(&self) -> &str {
        match self {
            InstrumentError::UnknownConvention { key, .. } => key,
            InstrumentError::InvalidPeriod(_) => "invalid_period",
            InstrumentError::NoMaturity(_) => "no_maturity",
            InstrumentError::NoActiveSchedule(_, _) => "no_active_schedule",
            InstrumentError::NotConverged(_) => "not_converged",
            InstrumentError::InvalidData(_) => "invalid_data",
        }
    }
}

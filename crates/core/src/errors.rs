//! Error types shared by every module of the core.

use chrono::ParseError as ChronoParseError;
use std::num::ParseFloatError;
use thiserror::Error;

use crate::expressions::ExpressionError;
use crate::instruments::InstrumentError;

pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the core.
///
/// Computation-layer errors (day-count, periods) are usually degraded to safe
/// defaults before they reach this type. Processor errors are collected into
/// [`crate::transactions::ProcessErrors`] instead of being returned.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Instrument calculation failed: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Invalid expression \"{expression}\": {reason}")]
    InvalidExpression {
        expression: String,
        reason: ExpressionError,
    },

    #[error("Instrument type is missing required relation '{field}'")]
    Configuration { field: String },

    #[error("Transaction unique code is already in use: {0}")]
    UniquenessViolation(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// Builds an `InvalidExpression` error for the given source string.
    pub fn invalid_expression(expression: &str, reason: ExpressionError) -> Self {
        Error::InvalidExpression {
            expression: expression.to_string(),
            reason,
        }
    }
}

/// Failures reported by repository implementations.
///
/// Details are plain strings so any store can map its own errors here.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Store unavailable: {0}")]
    ConnectionFailed(String),

    #[error("Store query failed: {0}")]
    QueryFailed(String),

    /// No row for the requested id or user code.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate user code or transaction unique code.
    #[error("Duplicate key: {0}")]
    UniqueViolation(String),

    /// A savepoint could not be opened, released or rolled back.
    #[error("Savepoint failed: {0}")]
    TransactionFailed(String),

    #[error("Store error: {0}")]
    Internal(String),
}

/// Rejected inputs: malformed numbers and dates, missing or out-of-range values.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Not a number: {0}")]
    NumberParse(#[from] ParseFloatError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Required field '{0}' is missing")]
    MissingField(String),

    #[error("Value '{value}' is not one of the allowed selector values for '{field}'")]
    InvalidSelector { field: String, value: String },

    #[error("Not a decimal: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Not a date: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        ValidationError::DecimalParse(err).into()
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        ValidationError::DateTimeParse(err).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidInput(err.to_string()).into()
    }
}

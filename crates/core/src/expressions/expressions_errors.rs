//! Expression evaluation error types.

use thiserror::Error;

/// Reasons an expression could not produce a value.
///
/// Wrapped into [`crate::Error::InvalidExpression`] together with the
/// offending source string at the evaluator boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Name '{0}' is not defined")]
    NameNotFound(String),

    #[error("Unsupported operand types for {op}: {left} and {right}")]
    TypeMismatch {
        op: String,
        left: String,
        right: String,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Function '{0}' is not defined")]
    UnknownFunction(String),

    #[error("Invalid arguments for {function}: {message}")]
    ArgumentError { function: String, message: String },

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
}

impl ExpressionError {
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Parse {
            position,
            message: message.into(),
        }
    }

    pub fn type_mismatch(op: &str, left: &str, right: &str) -> Self {
        ExpressionError::TypeMismatch {
            op: op.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn argument(function: &str, message: impl Into<String>) -> Self {
        ExpressionError::ArgumentError {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

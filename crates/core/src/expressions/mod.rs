//! Expressions module - a side-effect free expression language.
//!
//! Source strings are tokenized, parsed into a typed AST and evaluated against
//! a [`Namespace`]. Builtins that need persisted data (instrument accrued
//! price, factor, coupon) resolve through an optional [`EvaluationContext`].

mod evaluator;
mod expressions_errors;
mod functions;
mod lexer;
mod parser;
mod value;

#[cfg(test)]
mod expressions_tests;

pub use evaluator::{
    compare_values, evaluate, validate, values_equal, EvaluationContext, Evaluator, Namespace,
};
pub use expressions_errors::ExpressionError;
pub use parser::{parse, BinaryOp, CompareOp, Expr, UnaryOp};
pub use value::{EntityRef, Interval, Value};

//! Ledgerfolio Core - portfolio accounting and instrument analytics.
//!
//! This crate contains the booking, pricing and reporting logic. It is
//! storage-agnostic and defines repository traits that callers implement
//! over their own persistence.

pub mod constants;
pub mod errors;
pub mod event_schedules;
pub mod events;
pub mod expressions;
pub mod instruments;
pub mod pricing;
pub mod reports;
pub mod settings;
pub mod tables;
pub mod transactions;
pub mod utils;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

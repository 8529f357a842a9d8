//! Shared helpers.

pub mod cancellation;
pub mod decimal_utils;
pub mod time_utils;

pub use cancellation::CancellationToken;

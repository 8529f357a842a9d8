//! Pricing module - price history, fx history and price auto-calculation.

mod currency_history;
mod price_history_service;
mod pricing_model;
mod pricing_traits;

#[cfg(test)]
mod currency_history_tests;

pub use currency_history::{CurrencyHistory, PriceIndex};
pub use price_history_service::{PriceHistoryService, PriceHistoryServiceTrait};
pub use pricing_model::{
    CurrencyHistoryRecord, PriceHistory, PriceRecalculateInput, PricingPolicy,
};
pub use pricing_traits::PricingRepositoryTrait;

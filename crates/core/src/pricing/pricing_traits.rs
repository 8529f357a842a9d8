//! Repository traits for price and currency histories.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::pricing_model::{CurrencyHistoryRecord, PriceHistory, PricingPolicy};
use crate::errors::Result;

/// Tenant-scoped price and fx history storage.
#[async_trait]
pub trait PricingRepositoryTrait: Send + Sync {
    fn get_pricing_policy(&self, user_code: &str) -> Result<PricingPolicy>;

    fn get_price_history(
        &self,
        instrument_id: &str,
        pricing_policy: &str,
        date: NaiveDate,
    ) -> Result<Option<PriceHistory>>;

    /// All prices under `pricing_policy` dated on or before `up_to`.
    fn get_price_histories(&self, pricing_policy: &str, up_to: NaiveDate)
        -> Result<Vec<PriceHistory>>;

    /// All fx rates under `pricing_policy` dated on or before `up_to`.
    fn get_currency_histories(
        &self,
        pricing_policy: &str,
        up_to: NaiveDate,
    ) -> Result<Vec<CurrencyHistoryRecord>>;

    /// Upserts on `(instrument_id, pricing_policy, date)`.
    async fn save_price_history(&self, price: PriceHistory) -> Result<PriceHistory>;
}

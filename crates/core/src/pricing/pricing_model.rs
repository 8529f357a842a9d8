//! Pricing domain models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Named bundle of pricing defaults. Price and fx histories are keyed by it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PricingPolicy {
    pub id: String,
    pub user_code: String,
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Price of one instrument under one pricing policy on one date.
///
/// `accrued_price` and `factor` left as `None` are filled by auto-calculation
/// on save; a zero `ytm` or `modified_duration` is recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceHistory {
    pub id: String,
    pub instrument_id: String,
    pub pricing_policy: String,
    pub date: NaiveDate,
    pub principal_price: Decimal,
    pub accrued_price: Option<Decimal>,
    pub factor: Option<Decimal>,
    #[serde(default)]
    pub long_delta: Decimal,
    #[serde(default)]
    pub short_delta: Decimal,
    #[serde(default)]
    pub nav: Decimal,
    #[serde(default)]
    pub cash_flow: Decimal,
    #[serde(default)]
    pub ytm: f64,
    #[serde(default)]
    pub modified_duration: f64,
    #[serde(default)]
    pub is_temporary_price: bool,
    #[serde(default)]
    pub error_message: String,
}

impl PriceHistory {
    pub fn new(
        instrument_id: impl Into<String>,
        pricing_policy: impl Into<String>,
        date: NaiveDate,
        principal_price: Decimal,
    ) -> Self {
        PriceHistory {
            id: String::new(),
            instrument_id: instrument_id.into(),
            pricing_policy: pricing_policy.into(),
            date,
            principal_price,
            accrued_price: None,
            factor: None,
            long_delta: Decimal::ZERO,
            short_delta: Decimal::ZERO,
            nav: Decimal::ZERO,
            cash_flow: Decimal::ZERO,
            ytm: 0.0,
            modified_duration: 0.0,
            is_temporary_price: false,
            error_message: String::new(),
        }
    }

    /// Appends to `error_message`, separated by "; ".
    pub fn push_error(&mut self, message: impl AsRef<str>) {
        if self.error_message.is_empty() {
            self.error_message = message.as_ref().to_string();
        } else {
            self.error_message = format!("{}; {}", self.error_message, message.as_ref());
        }
    }
}

/// Fields of a price history row that can be explicitly recalculated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRecalculateInput {
    Ytm,
    ModifiedDuration,
    Factor,
    AccruedPrice,
}

/// Rate of one currency to the tenant's system currency on one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyHistoryRecord {
    pub id: String,
    pub currency: String,
    pub pricing_policy: String,
    pub date: NaiveDate,
    pub fx_rate: Decimal,
}

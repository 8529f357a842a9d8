use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::pricing_model::{CurrencyHistoryRecord, PriceHistory};

/// Per-policy fx series to the system currency.
///
/// Rates are stored as independent time-series per `(currency, pricing_policy)`
/// and looked up with "latest on or before" semantics. The system currency
/// always has rate 1.
#[derive(Debug, Clone, Default)]
pub struct CurrencyHistory {
    system_currency: String,

    /// Key: (currency, pricing_policy)
    /// Value: BTreeMap<Date, Rate>
    rates: HashMap<(String, String), BTreeMap<NaiveDate, Decimal>>,
}

impl CurrencyHistory {
    pub fn new(system_currency: impl Into<String>, records: Vec<CurrencyHistoryRecord>) -> Self {
        let mut history = CurrencyHistory {
            system_currency: system_currency.into(),
            rates: HashMap::new(),
        };
        history.add_records(records);
        history
    }

    pub fn system_currency(&self) -> &str {
        &self.system_currency
    }

    /// Adds rates; a later record for the same date replaces the earlier one.
    pub fn add_records(&mut self, records: Vec<CurrencyHistoryRecord>) {
        for record in records {
            if record.currency == self.system_currency {
                continue;
            }
            self.rates
                .entry((record.currency, record.pricing_policy))
                .or_default()
                .insert(record.date, record.fx_rate);
        }
    }

    /// Rate of `currency` to the system currency on `date`.
    pub fn fx_rate(&self, currency: &str, pricing_policy: &str, date: NaiveDate) -> Option<Decimal> {
        if currency == self.system_currency {
            return Some(Decimal::ONE);
        }
        let key = (currency.to_string(), pricing_policy.to_string());
        self.rates
            .get(&key)?
            .range(..=date)
            .next_back()
            .map(|(_, rate)| *rate)
    }

    /// Like [`fx_rate`](Self::fx_rate) but 0 when no rate is known.
    pub fn fx_rate_or_zero(&self, currency: &str, pricing_policy: &str, date: NaiveDate) -> Decimal {
        self.fx_rate(currency, pricing_policy, date)
            .unwrap_or(Decimal::ZERO)
    }

    /// Converts `amount` between two currencies through the system currency.
    /// A zero or missing target rate yields 0.
    pub fn convert(
        &self,
        amount: Decimal,
        from_currency: &str,
        to_currency: &str,
        pricing_policy: &str,
        date: NaiveDate,
    ) -> Decimal {
        if from_currency == to_currency {
            return amount;
        }
        let from_rate = self.fx_rate_or_zero(from_currency, pricing_policy, date);
        let to_rate = self.fx_rate_or_zero(to_currency, pricing_policy, date);
        if to_rate.is_zero() {
            return Decimal::ZERO;
        }
        amount * from_rate / to_rate
    }
}

/// Price lookup by instrument with "latest on or before" semantics.
#[derive(Debug, Clone, Default)]
pub struct PriceIndex {
    prices: HashMap<String, BTreeMap<NaiveDate, PriceHistory>>,
}

impl PriceIndex {
    pub fn new(prices: Vec<PriceHistory>) -> Self {
        let mut index = PriceIndex::default();
        for price in prices {
            index
                .prices
                .entry(price.instrument_id.clone())
                .or_default()
                .insert(price.date, price);
        }
        index
    }

    pub fn price_on(&self, instrument_id: &str, date: NaiveDate) -> Option<&PriceHistory> {
        self.prices
            .get(instrument_id)?
            .range(..=date)
            .next_back()
            .map(|(_, price)| price)
    }
}

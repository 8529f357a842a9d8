//! Price and fx lookups of one report build.

use chrono::NaiveDate;
use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::instruments::Instrument;
use crate::pricing::{CurrencyHistory, PriceIndex};
use crate::utils::decimal_utils::{from_f64, safe_div};

/// Rates and prices frozen for one report date and pricing policy.
///
/// Every `*_fx` lookup returns the rate of a currency to the report
/// currency; a missing rate or a zero report-currency rate yields 0.
pub struct ReportPricing {
    report_date: NaiveDate,
    report_currency: String,
    pricing_policy: String,
    currencies: CurrencyHistory,
    prices: PriceIndex,
    instruments: HashMap<String, Instrument>,
}

impl ReportPricing {
    pub fn new(
        report_date: NaiveDate,
        report_currency: impl Into<String>,
        pricing_policy: impl Into<String>,
        currencies: CurrencyHistory,
        prices: PriceIndex,
        instruments: Vec<Instrument>,
    ) -> Self {
        ReportPricing {
            report_date,
            report_currency: report_currency.into(),
            pricing_policy: pricing_policy.into(),
            currencies,
            prices,
            instruments: instruments
                .into_iter()
                .map(|instrument| (instrument.id.clone(), instrument))
                .collect(),
        }
    }

    pub fn report_date(&self) -> NaiveDate {
        self.report_date
    }

    pub fn instrument(&self, instrument_id: &str) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    /// Rate of `currency` to the system currency on `date`.
    pub fn system_fx(&self, currency: &str, date: NaiveDate) -> Decimal {
        self.currencies
            .fx_rate_or_zero(currency, &self.pricing_policy, date)
    }

    /// Rate of the report currency to the system currency on the report date.
    pub fn report_rate(&self) -> Decimal {
        self.system_fx(&self.report_currency, self.report_date)
    }

    /// Rate of `currency` to the report currency on `date`.
    pub fn fx_on(&self, currency: Option<&str>, date: NaiveDate) -> Decimal {
        let currency = match currency {
            Some(c) if !c.is_empty() => c,
            _ => return Decimal::ZERO,
        };
        let report_rate = self.system_fx(&self.report_currency, date);
        if report_rate.is_zero() {
            return Decimal::ZERO;
        }
        safe_div(self.system_fx(currency, date), report_rate)
    }

    /// Rate of `currency` to the report currency on the report date.
    pub fn fx(&self, currency: Option<&str>) -> Decimal {
        self.fx_on(currency, self.report_date)
    }

    /// Converts a report-currency amount to the system currency.
    pub fn to_system(&self, amount: Decimal) -> Decimal {
        amount * self.report_rate()
    }

    /// Principal and accrued price on the report date. Falls back to the
    /// instrument defaults when no price is stored; a stored price without
    /// accrued uses the accrual schedule.
    pub fn price(&self, instrument: &Instrument) -> (Decimal, Decimal) {
        match self.prices.price_on(&instrument.id, self.report_date) {
            Some(price) => {
                let accrued = price
                    .accrued_price
                    .unwrap_or_else(|| from_f64(instrument.accrued_price(self.report_date)));
                (price.principal_price, accrued)
            }
            None => {
                debug!(
                    "No {} price for {} on {}, using defaults",
                    self.pricing_policy, instrument.user_code, self.report_date
                );
                (instrument.default_price, instrument.default_accrued)
            }
        }
    }
}

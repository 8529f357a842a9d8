//! Yield and duration entry points used by price history and reports.

use std::sync::Arc;

use chrono::NaiveDate;
use log::warn;

use super::bond_math::{BondCashFlows, BondMathTrait, CashFlowBondMath, SolverConfig};
use super::instruments_errors::InstrumentError;
use super::instruments_model::Instrument;

/// Instrument-level analytics on top of a [`BondMathTrait`] implementation.
///
/// Every function degrades to `0.0` and logs when the underlying math fails,
/// so callers never see a NaN or a propagated error.
#[derive(Clone)]
pub struct InstrumentAnalytics {
    bond_math: Arc<dyn BondMathTrait>,
}

impl Default for InstrumentAnalytics {
    fn default() -> Self {
        Self::new(Arc::new(CashFlowBondMath::default()))
    }
}

impl InstrumentAnalytics {
    pub fn new(bond_math: Arc<dyn BondMathTrait>) -> Self {
        InstrumentAnalytics { bond_math }
    }

    pub fn with_solver(config: SolverConfig) -> Self {
        Self::new(Arc::new(CashFlowBondMath::new(config)))
    }

    pub fn bond_math(&self) -> &dyn BondMathTrait {
        self.bond_math.as_ref()
    }

    /// Yield to maturity for a clean `principal_price` on `price_date`.
    pub fn ytm(&self, instrument: &Instrument, price_date: NaiveDate, principal_price: f64) -> f64 {
        self.try_ytm(instrument, price_date, principal_price)
            .unwrap_or_else(|e| {
                warn!(
                    "ytm for instrument {} on {}: {}",
                    instrument.user_code, price_date, e
                );
                0.0
            })
    }

    pub fn try_ytm(
        &self,
        instrument: &Instrument,
        price_date: NaiveDate,
        principal_price: f64,
    ) -> Result<f64, InstrumentError> {
        let bond = BondCashFlows::from_instrument(instrument, price_date, self.bond_math())?;
        let accrued = instrument.accrued_price(price_date);
        let ytm = self
            .bond_math
            .price_to_yield(&bond, principal_price, accrued)?;
        finite(ytm, "ytm")
    }

    /// Modified duration at `ytm` on `price_date`.
    pub fn modified_duration(&self, instrument: &Instrument, price_date: NaiveDate, ytm: f64) -> f64 {
        self.try_modified_duration(instrument, price_date, ytm)
            .unwrap_or_else(|e| {
                warn!(
                    "modified_duration for instrument {} on {}: {}",
                    instrument.user_code, price_date, e
                );
                0.0
            })
    }

    pub fn try_modified_duration(
        &self,
        instrument: &Instrument,
        price_date: NaiveDate,
        ytm: f64,
    ) -> Result<f64, InstrumentError> {
        let bond = BondCashFlows::from_instrument(instrument, price_date, self.bond_math())?;
        let duration = self.bond_math.yield_to_duration(&bond, ytm)?;
        finite(duration, "modified duration")
    }

    /// Clean price per 100 implied by `ytm` on `price_date`.
    pub fn price_from_yield(&self, instrument: &Instrument, price_date: NaiveDate, ytm: f64) -> f64 {
        let accrued = instrument.accrued_price(price_date);
        BondCashFlows::from_instrument(instrument, price_date, self.bond_math())
            .and_then(|bond| self.bond_math.yield_to_price(&bond, ytm, accrued))
            .and_then(|price| finite(price, "price"))
            .unwrap_or_else(|e| {
                warn!(
                    "price_from_yield for instrument {} on {}: {}",
                    instrument.user_code, price_date, e
                );
                0.0
            })
    }

    /// Accrued price on `d`, 0 when no accrual row is active.
    pub fn accrued_price(&self, instrument: &Instrument, d: NaiveDate) -> f64 {
        instrument.accrued_price(d)
    }
}

fn finite(value: f64, what: &str) -> Result<f64, InstrumentError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(InstrumentError::InvalidData(format!("{} is not finite", what)))
    }
}

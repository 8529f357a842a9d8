//! Instrument domain models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::day_count::AccrualCalculationModel;
use super::periodicity::Periodicity;
use crate::constants::PERPETUAL_MATURITY;

/// Instrument class driving event-schedule generation and cost matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentClass {
    #[default]
    General,
    EventAtMaturity,
    RegularEventAtMaturity,
    PerpetualRegularEvent,
    ContractForDifference,
}

impl InstrumentClass {
    /// Classes producing one regular event per accrual row.
    pub fn has_regular_event(&self) -> bool {
        matches!(
            self,
            InstrumentClass::RegularEventAtMaturity | InstrumentClass::PerpetualRegularEvent
        )
    }

    /// Classes producing a single one-off event at maturity.
    pub fn has_one_off_event(&self) -> bool {
        matches!(
            self,
            InstrumentClass::EventAtMaturity | InstrumentClass::RegularEventAtMaturity
        )
    }
}

/// Template of an instrument: class plus the transaction types used by
/// generated event schedules (referenced by user code).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentType {
    pub id: String,
    pub user_code: String,
    pub name: String,
    pub instrument_class: InstrumentClass,
    pub regular_event: Option<String>,
    pub one_off_event: Option<String>,
    pub factor_same: Option<String>,
    pub factor_up: Option<String>,
    pub factor_down: Option<String>,
}

/// How accrual sizes are quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentSizeDetail {
    #[default]
    Percent,
    PerAnnum,
    PerQuarter,
    PerMonth,
    PerWeek,
    PerDay,
}

/// One accrual period definition. The row's end is implicit: the next row's
/// start, or maturity + 1 day for the last row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccrualCalculationSchedule {
    pub id: String,
    pub accrual_start_date: NaiveDate,
    pub first_payment_date: NaiveDate,
    pub accrual_size: f64,
    pub accrual_calculation_model: AccrualCalculationModel,
    pub periodicity: Periodicity,
    pub periodicity_n: i32,
    #[serde(default)]
    pub eom: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FactorSchedule {
    pub id: String,
    pub effective_date: NaiveDate,
    pub factor_value: f64,
}

/// Expression used to compute manual prices for one pricing policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManualPricingFormula {
    pub id: String,
    pub pricing_policy: String,
    pub expr: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Instrument aggregate: attributes plus its accrual, factor and manual
/// pricing collections. Event schedules live in their own repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    pub user_code: String,
    pub name: String,
    pub short_name: Option<String>,
    pub public_name: Option<String>,
    pub notes: Option<String>,
    pub instrument_type: String,
    pub pricing_currency: String,
    pub price_multiplier: Decimal,
    pub accrued_currency: String,
    pub accrued_multiplier: Decimal,
    pub payment_size_detail: PaymentSizeDetail,
    pub default_price: Decimal,
    pub default_accrued: Decimal,
    pub maturity_date: Option<NaiveDate>,
    pub maturity_price: Decimal,
    pub user_text_1: Option<String>,
    pub user_text_2: Option<String>,
    pub user_text_3: Option<String>,
    pub long_underlying_instrument: Option<String>,
    pub short_underlying_instrument: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub accrual_calculation_schedules: Vec<AccrualCalculationSchedule>,
    #[serde(default)]
    pub factor_schedules: Vec<FactorSchedule>,
    #[serde(default)]
    pub manual_pricing_formulas: Vec<ManualPricingFormula>,
}

impl Default for Instrument {
    fn default() -> Self {
        Instrument {
            id: String::new(),
            user_code: String::new(),
            name: String::new(),
            short_name: None,
            public_name: None,
            notes: None,
            instrument_type: String::new(),
            pricing_currency: String::new(),
            price_multiplier: Decimal::ONE,
            accrued_currency: String::new(),
            accrued_multiplier: Decimal::ONE,
            payment_size_detail: PaymentSizeDetail::default(),
            default_price: Decimal::ZERO,
            default_accrued: Decimal::ZERO,
            maturity_date: None,
            maturity_price: Decimal::ZERO,
            user_text_1: None,
            user_text_2: None,
            user_text_3: None,
            long_underlying_instrument: None,
            short_underlying_instrument: None,
            country: None,
            is_deleted: false,
            accrual_calculation_schedules: Vec::new(),
            factor_schedules: Vec::new(),
            manual_pricing_formulas: Vec::new(),
        }
    }
}

impl Instrument {
    /// True when the maturity date is missing or the perpetual sentinel.
    pub fn is_perpetual(&self) -> bool {
        let (y, m, d) = PERPETUAL_MATURITY;
        match self.maturity_date {
            None => true,
            Some(date) => Some(date) == NaiveDate::from_ymd_opt(y, m, d),
        }
    }
}

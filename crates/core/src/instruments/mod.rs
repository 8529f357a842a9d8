//! Instruments module - schedule math, day-count conventions and bond analytics.

mod accrual_schedule;
mod bond_math;
mod day_count;
mod instrument_analytics;
mod instruments_errors;
mod instruments_model;
mod instruments_traits;
mod periodicity;

#[cfg(test)]
mod accrual_schedule_tests;
#[cfg(test)]
mod bond_math_tests;
#[cfg(test)]
mod day_count_tests;

pub use accrual_schedule::{AccrualPeriod, FuturePayments};
pub use bond_math::{
    xirr, xnpv, BondCashFlow, BondCashFlows, BondKind, BondMathTrait, CashFlowBondMath,
    SolverConfig,
};
pub use day_count::{
    accrual_factor, coupon_amount, coupon_amount_or_zero, year_fraction, AccrualCalculationModel,
    ACCRUAL_FACTOR_ERROR_KEY, COUPON_ERROR_KEY,
};
pub use instrument_analytics::InstrumentAnalytics;
pub use instruments_errors::InstrumentError;
pub use instruments_model::{
    AccrualCalculationSchedule, FactorSchedule, Instrument, InstrumentClass, InstrumentType,
    ManualPricingFormula, PaymentSizeDetail,
};
pub use instruments_traits::InstrumentRepositoryTrait;
pub use periodicity::{period_advance, Periodicity};

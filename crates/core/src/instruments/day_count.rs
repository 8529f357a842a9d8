//! Day-count conventions.
//!
//! Two entry points: [`accrual_factor`] returns the accrued share of the
//! current coupon period at a valuation date, [`coupon_amount`] returns the
//! coupon paid over a stepped payment period.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::instruments_errors::InstrumentError;
use super::periodicity::Periodicity;
use crate::utils::time_utils::{
    add_years, days_between, days_in_year, is_last_day_of_month, is_leap, weekday_count,
};

/// Error key reported by [`accrual_factor`].
pub const ACCRUAL_FACTOR_ERROR_KEY: &str = "coupon_accrual_factor";

/// Error key reported by [`coupon_amount`].
pub const COUPON_ERROR_KEY: &str = "get_coupon";

/// Accrual calculation model (day-count convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccrualCalculationModel {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "ACT/ACT ICMA")]
    #[default]
    ActActIcma,
    #[serde(rename = "ACT/ACT ISDA")]
    ActActIsda,
    #[serde(rename = "ACT/360")]
    Act360,
    #[serde(rename = "ACT/365")]
    Act365,
    #[serde(rename = "ACT/365L")]
    Act365L,
    #[serde(rename = "ACT/365A")]
    Act365A,
    #[serde(rename = "ACT/366")]
    Act366,
    #[serde(rename = "ACT/364")]
    Act364,
    #[serde(rename = "30/360 US")]
    Thirty360Us,
    #[serde(rename = "30/360 ISDA")]
    Thirty360Isda,
    #[serde(rename = "30E/360")]
    Thirty360E,
    #[serde(rename = "30E+/360")]
    Thirty360EPlus,
    #[serde(rename = "30/360 GERMAN")]
    Thirty360German,
    #[serde(rename = "30/365")]
    Thirty365,
    #[serde(rename = "NL/365")]
    Nl365,
    #[serde(rename = "BD/252")]
    Bd252,
    #[serde(rename = "ACT/ACT AFB")]
    ActActAfb,
    #[serde(rename = "SIMPLE")]
    Simple,
}

impl AccrualCalculationModel {
    pub const ALL: [AccrualCalculationModel; 19] = [
        AccrualCalculationModel::None,
        AccrualCalculationModel::ActActIcma,
        AccrualCalculationModel::ActActIsda,
        AccrualCalculationModel::Act360,
        AccrualCalculationModel::Act365,
        AccrualCalculationModel::Act365L,
        AccrualCalculationModel::Act365A,
        AccrualCalculationModel::Act366,
        AccrualCalculationModel::Act364,
        AccrualCalculationModel::Thirty360Us,
        AccrualCalculationModel::Thirty360Isda,
        AccrualCalculationModel::Thirty360E,
        AccrualCalculationModel::Thirty360EPlus,
        AccrualCalculationModel::Thirty360German,
        AccrualCalculationModel::Thirty365,
        AccrualCalculationModel::Nl365,
        AccrualCalculationModel::Bd252,
        AccrualCalculationModel::ActActAfb,
        AccrualCalculationModel::Simple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccrualCalculationModel::None => "NONE",
            AccrualCalculationModel::ActActIcma => "ACT/ACT ICMA",
            AccrualCalculationModel::ActActIsda => "ACT/ACT ISDA",
            AccrualCalculationModel::Act360 => "ACT/360",
            AccrualCalculationModel::Act365 => "ACT/365",
            AccrualCalculationModel::Act365L => "ACT/365L",
            AccrualCalculationModel::Act365A => "ACT/365A",
            AccrualCalculationModel::Act366 => "ACT/366",
            AccrualCalculationModel::Act364 => "ACT/364",
            AccrualCalculationModel::Thirty360Us => "30/360 US",
            AccrualCalculationModel::Thirty360Isda => "30/360 ISDA",
            AccrualCalculationModel::Thirty360E => "30E/360",
            AccrualCalculationModel::Thirty360EPlus => "30E+/360",
            AccrualCalculationModel::Thirty360German => "30/360 GERMAN",
            AccrualCalculationModel::Thirty365 => "30/365",
            AccrualCalculationModel::Nl365 => "NL/365",
            AccrualCalculationModel::Bd252 => "BD/252",
            AccrualCalculationModel::ActActAfb => "ACT/ACT AFB",
            AccrualCalculationModel::Simple => "SIMPLE",
        }
    }

    /// Looks up a convention by its wire name, failing with `UnknownConvention`.
    pub fn parse(code: &str, key: &str) -> Result<Self, InstrumentError> {
        let normalized = code.trim().to_uppercase();
        AccrualCalculationModel::ALL
            .iter()
            .find(|m| m.as_str() == normalized)
            .copied()
            .ok_or_else(|| {
                InstrumentError::unknown_convention(
                    key,
                    format!("unknown accrual_calculation_model={}", code),
                )
            })
    }
}

impl fmt::Display for AccrualCalculationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccrualCalculationModel {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccrualCalculationModel::parse(s, ACCRUAL_FACTOR_ERROR_KEY)
    }
}

/// Accrued share of the coupon period containing `dt2`.
///
/// `dt1` is the accrual start, `dt2` the valuation date and `dt3` the first
/// payment date of the schedule row. For periodicities paying up to monthly,
/// `dt3` is rolled forward until it passes `dt2` and `dt1` follows one period
/// behind; the rolled `dt3` is clamped to maturity. Calendar-driven
/// periodicities are treated as annual from `dt1`, sub-monthly ones accrue 0.
pub fn accrual_factor(
    model: AccrualCalculationModel,
    periodicity: Periodicity,
    dt1: NaiveDate,
    dt2: NaiveDate,
    dt3: NaiveDate,
    maturity_date: Option<NaiveDate>,
) -> Result<f64, InstrumentError> {
    let (dt1, dt3, freq) = roll_period(periodicity, dt1, dt2, dt3, maturity_date)?;
    if freq == 0 {
        return Ok(0.0);
    }

    let factor = match model {
        AccrualCalculationModel::ActActIcma => {
            let period_days = days_between(dt1, dt3);
            if period_days == 0 {
                0.0
            } else {
                days_between(dt1, dt2) as f64 / period_days as f64 / freq as f64
            }
        }
        _ => year_fraction(model, dt1, dt2, maturity_date),
    };
    Ok(factor)
}

/// Returns `(dt1, dt3, freq)` after the period roll; `freq == 0` means
/// the factor is 0 (sub-monthly periodicity).
fn roll_period(
    periodicity: Periodicity,
    dt1: NaiveDate,
    dt2: NaiveDate,
    dt3: NaiveDate,
    maturity_date: Option<NaiveDate>,
) -> Result<(NaiveDate, NaiveDate, u32), InstrumentError> {
    let freq = periodicity.frequency();

    if freq > 0 && freq <= 12 {
        let step = |k: i64| periodicity.advance(1, dt3, k, dt3);
        let mut k: i64 = 0;
        while step(k)? <= dt2 {
            k += 1;
        }
        let rolled = step(k)?;
        let mut start = dt1;
        if k > 0 {
            start = periodicity.advance(1, rolled, -1, rolled)?;
        }
        let mut end = rolled;
        if let Some(maturity) = maturity_date {
            if end >= maturity && maturity > dt2 {
                end = maturity;
            }
        }
        Ok((start, end, freq))
    } else if freq > 12 {
        Ok((dt1, dt3, 0))
    } else {
        let end = add_years(dt1, 1).ok_or_else(|| {
            InstrumentError::InvalidPeriod(format!("date out of range adding a year to {}", dt1))
        })?;
        Ok((dt1, end, 1))
    }
}

/// Coupon paid for the stepped period `[dt1, dt2]`.
///
/// With `as_factor` the notional is 1.0 instead of `accrual_size`. ACT/ACT
/// ICMA pays `size / freq`; a calendar-driven periodicity has no frequency and
/// fails with `UnknownConvention`.
pub fn coupon_amount(
    model: AccrualCalculationModel,
    periodicity: Periodicity,
    accrual_size: f64,
    dt1: NaiveDate,
    dt2: NaiveDate,
    maturity_date: Option<NaiveDate>,
    as_factor: bool,
) -> Result<f64, InstrumentError> {
    let cpn = if as_factor { 1.0 } else { accrual_size };

    match model {
        AccrualCalculationModel::ActActIcma => {
            let freq = periodicity.frequency();
            if freq == 0 {
                return Err(InstrumentError::unknown_convention(
                    COUPON_ERROR_KEY,
                    format!(
                        "{} has no payment frequency for periodicity {}",
                        model, periodicity
                    ),
                ));
            }
            Ok(cpn / freq as f64)
        }
        _ => Ok(cpn * year_fraction(model, dt1, dt2, maturity_date)),
    }
}

/// Coupon amount that logs and degrades to 0 on failure.
pub fn coupon_amount_or_zero(
    model: AccrualCalculationModel,
    periodicity: Periodicity,
    accrual_size: f64,
    dt1: NaiveDate,
    dt2: NaiveDate,
    maturity_date: Option<NaiveDate>,
    as_factor: bool,
) -> f64 {
    match coupon_amount(
        model,
        periodicity,
        accrual_size,
        dt1,
        dt2,
        maturity_date,
        as_factor,
    ) {
        Ok(value) if value.is_finite() => value,
        Ok(_) => 0.0,
        Err(e) => {
            warn!("{}: {}", e.error_key(), e);
            0.0
        }
    }
}

/// Plain year fraction between two dates. ACT/ACT ICMA falls back to ACT/365
/// here; it needs period information and is handled by the callers.
pub fn year_fraction(
    model: AccrualCalculationModel,
    dt1: NaiveDate,
    dt2: NaiveDate,
    maturity_date: Option<NaiveDate>,
) -> f64 {
    let days = days_between(dt1, dt2) as f64;

    match model {
        AccrualCalculationModel::None => 0.0,
        AccrualCalculationModel::ActActIcma | AccrualCalculationModel::Act365 => days / 365.0,
        AccrualCalculationModel::ActActIsda => act_act_isda(dt1, dt2),
        AccrualCalculationModel::Act360 => days / 360.0,
        AccrualCalculationModel::Act366 => days / 366.0,
        AccrualCalculationModel::Act364 => days / 364.0,
        AccrualCalculationModel::Act365A => (days + 1.0) / 365.0,
        AccrualCalculationModel::Act365L => act_365_leap(dt1, dt2),
        AccrualCalculationModel::Thirty360Us => thirty_360_us(dt1, dt2) as f64 / 360.0,
        AccrualCalculationModel::Thirty365 => thirty_360_us(dt1, dt2) as f64 / 365.0,
        AccrualCalculationModel::Thirty360Isda | AccrualCalculationModel::Thirty360E => {
            match maturity_date {
                Some(maturity) => thirty_360_eom(dt1, dt2, Some(maturity)) as f64 / 360.0,
                None => 0.0,
            }
        }
        AccrualCalculationModel::Thirty360German => {
            thirty_360_eom(dt1, dt2, maturity_date) as f64 / 360.0
        }
        AccrualCalculationModel::Thirty360EPlus => thirty_e_plus_360(dt1, dt2) as f64 / 360.0,
        AccrualCalculationModel::Nl365 => (days - leap_days_skipped(dt1, dt2) as f64) / 365.0,
        AccrualCalculationModel::Bd252 => {
            let weekend = weekday_count(dt1, dt2, Weekday::Sat) + weekday_count(dt1, dt2, Weekday::Sun);
            (days - weekend as f64) / 252.0
        }
        AccrualCalculationModel::ActActAfb => act_act_afb(dt1, dt2),
        AccrualCalculationModel::Simple => days / 365.0,
    }
}

fn thirty_360_numerator(y1: i32, m1: u32, d1: u32, y2: i32, m2: u32, d2: u32) -> i64 {
    (y2 - y1) as i64 * 360 + (m2 as i64 - m1 as i64) * 30 + (d2 as i64 - d1 as i64)
}

/// 30/360 US: d1 31 snaps to 30; d2 31 snaps to 30 only when d1 is 30 or 31.
pub(crate) fn thirty_360_us(dt1: NaiveDate, dt2: NaiveDate) -> i64 {
    let d1_raw = dt1.day();
    let mut d1 = d1_raw;
    let mut d2 = dt2.day();
    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && (d1_raw == 30 || d1_raw == 31) {
        d2 = 30;
    }
    thirty_360_numerator(dt1.year(), dt1.month(), d1, dt2.year(), dt2.month(), d2)
}

/// End-of-month snap: month-end days count as 30, except a February maturity.
fn thirty_360_eom(dt1: NaiveDate, dt2: NaiveDate, maturity_date: Option<NaiveDate>) -> i64 {
    let mut d1 = dt1.day();
    let mut d2 = dt2.day();
    if is_last_day_of_month(dt1) {
        d1 = 30;
    }
    let is_feb_maturity = maturity_date == Some(dt2) && dt2.month() == 2;
    if is_last_day_of_month(dt2) && !is_feb_maturity {
        d2 = 30;
    }
    thirty_360_numerator(dt1.year(), dt1.month(), d1, dt2.year(), dt2.month(), d2)
}

fn thirty_e_plus_360(dt1: NaiveDate, dt2: NaiveDate) -> i64 {
    let mut d1 = dt1.day();
    let mut d2 = dt2.day();
    let mut m2 = dt2.month();
    let mut y2 = dt2.year();
    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 {
        d2 = 1;
        if m2 == 12 {
            m2 = 1;
            y2 += 1;
        } else {
            m2 += 1;
        }
    }
    thirty_360_numerator(dt1.year(), dt1.month(), d1, y2, m2, d2)
}

/// ACT/ACT ISDA. Years of the same leap status count plain days over 365;
/// otherwise the span splits at Jan 1 of `dt2`'s year, each side over its
/// own year length.
fn act_act_isda(dt1: NaiveDate, dt2: NaiveDate) -> f64 {
    if dt2 < dt1 {
        return -act_act_isda(dt2, dt1);
    }
    let (y1, y2) = (dt1.year(), dt2.year());
    if is_leap(y1) == is_leap(y2) {
        return days_between(dt1, dt2) as f64 / 365.0;
    }

    let new_year = match NaiveDate::from_ymd_opt(y2, 1, 1) {
        Some(d) => d,
        None => return days_between(dt1, dt2) as f64 / 365.0,
    };
    days_between(dt1, new_year) as f64 / days_in_year(y1) as f64
        + days_between(new_year, dt2) as f64 / days_in_year(y2) as f64
}

/// ACT/365L (Act+1 over 365 or 366).
///
/// The 366 denominator applies when either year is a leap year and the day
/// after Feb 28 of `dt1`'s year (Feb 29 in leap years, Mar 1 otherwise) lies in
/// `[dt1, dt2]`.
fn act_365_leap(dt1: NaiveDate, dt2: NaiveDate) -> f64 {
    let days = days_between(dt1, dt2) as f64 + 1.0;
    let pivot = NaiveDate::from_ymd_opt(dt1.year(), 2, 28).map(|d| d + Duration::days(1));
    let leap_involved = is_leap(dt1.year()) || is_leap(dt2.year());
    match pivot {
        Some(p) if leap_involved && dt1 <= p && p <= dt2 => days / 366.0,
        _ => days / 365.0,
    }
}

/// Number of Feb 29ths in `(dt1, dt2]`, capped at one per boundary year.
fn leap_days_skipped(dt1: NaiveDate, dt2: NaiveDate) -> i64 {
    let crosses = |year: i32| {
        is_leap(year)
            && NaiveDate::from_ymd_opt(year, 2, 29)
                .map(|feb29| dt1 < feb29 && feb29 <= dt2)
                .unwrap_or(false)
    };
    if crosses(dt1.year()) || crosses(dt2.year()) {
        1
    } else {
        0
    }
}

fn contains_feb29(start: NaiveDate, end: NaiveDate) -> bool {
    (start.year()..=end.year()).any(|year| {
        is_leap(year)
            && NaiveDate::from_ymd_opt(year, 2, 29)
                .map(|feb29| start < feb29 && feb29 <= end)
                .unwrap_or(false)
    })
}

/// ACT/ACT AFB: whole years are counted back from `dt2` by anniversaries;
/// the remaining stub uses 366 when it contains a Feb 29.
fn act_act_afb(dt1: NaiveDate, dt2: NaiveDate) -> f64 {
    if dt1 == dt2 {
        return 0.0;
    }
    if dt2 < dt1 {
        return -act_act_afb(dt2, dt1);
    }

    let mut whole_years = 0.0;
    let mut stub_end = dt2;
    loop {
        let mut previous = match add_years(stub_end, -1) {
            Some(d) => d,
            None => break,
        };
        if previous.month() == 2 && previous.day() == 28 && is_leap(previous.year()) {
            previous += Duration::days(1);
        }
        if previous < dt1 {
            break;
        }
        whole_years += 1.0;
        stub_end = previous;
    }

    let denominator = if contains_feb29(dt1, stub_end) {
        366.0
    } else {
        365.0
    };
    whole_years + days_between(dt1, stub_end) as f64 / denominator
}

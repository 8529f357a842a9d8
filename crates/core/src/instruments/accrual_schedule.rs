//! Accrual schedule queries on an instrument: active row lookup, payment
//! stream expansion, coupon at a date and accrued price.

use chrono::{Duration, NaiveDate};
use log::warn;

use super::day_count::{accrual_factor, coupon_amount_or_zero};
use super::instruments_errors::InstrumentError;
use super::instruments_model::{AccrualCalculationSchedule, Instrument};
use crate::constants::MAX_PERIOD_STEPS;
use crate::utils::decimal_utils::to_f64;

/// An accrual row together with its implicit half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccrualPeriod<'a> {
    pub schedule: &'a AccrualCalculationSchedule,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl<'a> AccrualPeriod<'a> {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Payment date of step `index`: the first payment date, then periodic
    /// steps from it reusing the accrual start's day.
    fn payment_date(&self, index: i64) -> Result<NaiveDate, InstrumentError> {
        let row = self.schedule;
        if index == 0 {
            Ok(row.first_payment_date)
        } else {
            row.periodicity.advance(
                row.periodicity_n,
                row.first_payment_date,
                index,
                row.accrual_start_date,
            )
        }
    }
}

impl Instrument {
    /// Accrual rows sorted by start date with their implicit end dates.
    pub fn accrual_periods(&self) -> Vec<AccrualPeriod<'_>> {
        let mut rows: Vec<&AccrualCalculationSchedule> =
            self.accrual_calculation_schedules.iter().collect();
        rows.sort_by_key(|r| r.accrual_start_date);

        let last_end = self
            .maturity_date
            .and_then(|m| m.checked_add_signed(Duration::days(1)))
            .unwrap_or(NaiveDate::MAX);

        rows.iter()
            .enumerate()
            .map(|(i, row)| AccrualPeriod {
                schedule: row,
                start: row.accrual_start_date,
                end: rows
                    .get(i + 1)
                    .map(|next| next.accrual_start_date)
                    .unwrap_or(last_end),
            })
            .collect()
    }

    /// The accrual row whose interval contains `date`; none at or after maturity.
    pub fn find_active(&self, date: NaiveDate) -> Option<AccrualPeriod<'_>> {
        if let Some(maturity) = self.maturity_date {
            if date >= maturity {
                return None;
            }
        }
        self.accrual_periods()
            .into_iter()
            .rev()
            .find(|p| p.start <= date)
            .filter(|p| p.contains(date))
    }

    /// Factor in effect at `date`: the latest row effective on or before it.
    pub fn factor_at(&self, date: NaiveDate) -> f64 {
        self.factor_schedules
            .iter()
            .filter(|f| f.effective_date <= date)
            .max_by_key(|f| f.effective_date)
            .map(|f| f.factor_value)
            .unwrap_or(1.0)
    }

    /// Accrual size of the active row, 0 when none is active.
    pub fn accrual_size_at(&self, date: NaiveDate) -> f64 {
        self.find_active(date)
            .map(|p| p.schedule.accrual_size)
            .unwrap_or(0.0)
    }

    /// Accrued price at `date`: active row size times its accrual factor.
    pub fn accrued_price(&self, date: NaiveDate) -> f64 {
        let period = match self.find_active(date) {
            Some(p) => p,
            None => return 0.0,
        };
        let row = period.schedule;
        match accrual_factor(
            row.accrual_calculation_model,
            row.periodicity,
            period.start,
            date,
            row.first_payment_date,
            self.maturity_date,
        ) {
            Ok(factor) if factor.is_finite() => row.accrual_size * factor,
            Ok(_) => 0.0,
            Err(e) => {
                warn!(
                    "accrued_price for instrument {} on {}: {} ({})",
                    self.user_code,
                    date,
                    e,
                    e.error_key()
                );
                0.0
            }
        }
    }

    /// Coupon paid on `date` with the instrument's accrual sizes.
    pub fn coupon_at(&self, date: NaiveDate, with_maturity: bool) -> (f64, bool) {
        self.coupon_at_as(date, with_maturity, false)
    }

    /// Coupon paid on `date`, `(0.0, false)` when `date` is not a payment date.
    ///
    /// With `as_factor` the coupon is computed on a unit notional and the
    /// maturity payment is 1.0.
    pub fn coupon_at_as(&self, date: NaiveDate, with_maturity: bool, as_factor: bool) -> (f64, bool) {
        if let Some(maturity) = self.maturity_date {
            if with_maturity && date == maturity {
                return (self.maturity_payment(as_factor), true);
            }
            if date >= maturity {
                return (0.0, false);
            }
        }

        let period = match self.accrual_periods().into_iter().find(|p| p.contains(date)) {
            Some(p) => p,
            None => return (0.0, false),
        };
        let row = period.schedule;
        let mut prev = period.start;

        for index in 0..MAX_PERIOD_STEPS as i64 {
            let mut payment = match period.payment_date(index) {
                Ok(d) => d,
                Err(e) => {
                    warn!("coupon_at for instrument {}: {}", self.user_code, e);
                    return (0.0, false);
                }
            };
            let is_last = payment >= period.end;
            if is_last {
                payment = period.end - Duration::days(1);
            }
            if payment == date {
                let value = coupon_amount_or_zero(
                    row.accrual_calculation_model,
                    row.periodicity,
                    row.accrual_size,
                    prev,
                    payment,
                    self.maturity_date,
                    as_factor,
                );
                return (value, true);
            }
            if is_last || payment > date {
                break;
            }
            prev = payment;
        }
        (0.0, false)
    }

    /// Lazy `(date, value)` stream of payments on or after `from_date`.
    pub fn future_payments(
        &self,
        from_date: NaiveDate,
        with_maturity: bool,
        as_factor: bool,
    ) -> FuturePayments<'_> {
        FuturePayments {
            instrument: self,
            periods: self.accrual_periods(),
            from_date,
            with_maturity,
            as_factor,
            period_index: 0,
            step: 0,
            prev: None,
            maturity_emitted: false,
            halted: false,
        }
    }

    fn maturity_payment(&self, as_factor: bool) -> f64 {
        if as_factor {
            1.0
        } else {
            to_f64(self.maturity_price)
        }
    }
}

/// Iterator over an instrument's payment stream.
///
/// Each accrual row overlapping `[from_date, maturity]` is stepped from its
/// first payment date; the last step of a row is clamped to the day before
/// the row's end. Stepping errors and the step bound halt the iteration.
pub struct FuturePayments<'a> {
    instrument: &'a Instrument,
    periods: Vec<AccrualPeriod<'a>>,
    from_date: NaiveDate,
    with_maturity: bool,
    as_factor: bool,
    period_index: usize,
    step: usize,
    prev: Option<NaiveDate>,
    maturity_emitted: bool,
    halted: bool,
}

impl<'a> FuturePayments<'a> {
    fn next_period(&mut self) {
        self.period_index += 1;
        self.step = 0;
        self.prev = None;
    }

    fn maturity_item(&mut self) -> Option<(NaiveDate, f64)> {
        if self.maturity_emitted || !self.with_maturity {
            return None;
        }
        self.maturity_emitted = true;
        let maturity = self.instrument.maturity_date?;
        if maturity < self.from_date {
            return None;
        }
        Some((maturity, self.instrument.maturity_payment(self.as_factor)))
    }
}

impl<'a> Iterator for FuturePayments<'a> {
    type Item = (NaiveDate, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.halted {
            return None;
        }

        while let Some(period) = self.periods.get(self.period_index).copied() {
            if self.from_date >= period.end {
                self.next_period();
                continue;
            }
            if self.step >= MAX_PERIOD_STEPS {
                warn!(
                    "future_payments for instrument {} exceeded the step bound",
                    self.instrument.user_code
                );
                self.halted = true;
                return None;
            }

            let row = period.schedule;
            let prev = self.prev.unwrap_or(period.start);
            let mut payment = match period.payment_date(self.step as i64) {
                Ok(d) => d,
                Err(e) => {
                    warn!(
                        "future_payments for instrument {}: {}",
                        self.instrument.user_code, e
                    );
                    self.halted = true;
                    return None;
                }
            };
            self.step += 1;

            if payment < self.from_date {
                self.prev = Some(payment);
                continue;
            }

            let is_last = payment >= period.end;
            if is_last {
                payment = period.end - Duration::days(1);
                self.next_period();
                if payment <= prev && prev != period.start {
                    continue;
                }
            } else {
                self.prev = Some(payment);
            }

            let value = coupon_amount_or_zero(
                row.accrual_calculation_model,
                row.periodicity,
                row.accrual_size,
                prev,
                payment,
                self.instrument.maturity_date,
                self.as_factor,
            );
            return Some((payment, value));
        }

        self.maturity_item()
    }
}

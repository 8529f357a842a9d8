//! Schedule periodicities and period arithmetic.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::instruments_errors::InstrumentError;
use crate::utils::time_utils::{
    add_days, add_months, add_months_with_day, clamped_date, next_friday,
};

/// Named time-step used to advance accrual and event schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Periodicity {
    NDay,
    NWeekEobw,
    NMonthEom,
    NMonthSameDay,
    NYearEoy,
    NYearSameDay,
    Weekly,
    Monthly,
    Bimonthly,
    Quarterly,
    #[default]
    SemiAnnually,
    Annually,
}

impl Periodicity {
    pub const ALL: [Periodicity; 12] = [
        Periodicity::NDay,
        Periodicity::NWeekEobw,
        Periodicity::NMonthEom,
        Periodicity::NMonthSameDay,
        Periodicity::NYearEoy,
        Periodicity::NYearSameDay,
        Periodicity::Weekly,
        Periodicity::Monthly,
        Periodicity::Bimonthly,
        Periodicity::Quarterly,
        Periodicity::SemiAnnually,
        Periodicity::Annually,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Periodicity::NDay => "N_DAY",
            Periodicity::NWeekEobw => "N_WEEK_EOBW",
            Periodicity::NMonthEom => "N_MONTH_EOM",
            Periodicity::NMonthSameDay => "N_MONTH_SAME_DAY",
            Periodicity::NYearEoy => "N_YEAR_EOY",
            Periodicity::NYearSameDay => "N_YEAR_SAME_DAY",
            Periodicity::Weekly => "WEEKLY",
            Periodicity::Monthly => "MONTHLY",
            Periodicity::Bimonthly => "BIMONTHLY",
            Periodicity::Quarterly => "QUARTERLY",
            Periodicity::SemiAnnually => "SEMI_ANNUALLY",
            Periodicity::Annually => "ANNUALLY",
        }
    }

    /// True for the calendar-driven periodicities that need a non-zero `n`.
    pub fn requires_n(&self) -> bool {
        matches!(
            self,
            Periodicity::NDay
                | Periodicity::NWeekEobw
                | Periodicity::NMonthEom
                | Periodicity::NMonthSameDay
                | Periodicity::NYearEoy
                | Periodicity::NYearSameDay
        )
    }

    /// Payments per year. Calendar-driven periodicities report 0.
    pub fn frequency(&self) -> u32 {
        match self {
            Periodicity::Weekly => 52,
            Periodicity::Monthly => 12,
            Periodicity::Bimonthly => 6,
            Periodicity::Quarterly => 4,
            Periodicity::SemiAnnually => 2,
            Periodicity::Annually => 1,
            _ => 0,
        }
    }

    /// Advances `anchor` by `n * index` steps.
    ///
    /// `same_date` supplies the day (and month, for yearly steps) reused by the
    /// same-day periodicities; schedules pass their accrual start date here.
    pub fn advance(
        &self,
        n: i32,
        anchor: NaiveDate,
        index: i64,
        same_date: NaiveDate,
    ) -> Result<NaiveDate, InstrumentError> {
        if self.requires_n() && n == 0 {
            return Err(InstrumentError::InvalidPeriod(format!(
                "{}: n can't be zero",
                self.as_str()
            )));
        }

        let steps = (n as i64)
            .checked_mul(index)
            .ok_or_else(|| self.overflow(anchor, index))?;

        let result = match self {
            Periodicity::NDay => add_days(anchor, steps),
            Periodicity::NWeekEobw => steps
                .checked_mul(7)
                .and_then(|days| add_days(anchor, days))
                .map(next_friday),
            Periodicity::NMonthEom => add_months_with_day(anchor, steps, 31),
            Periodicity::NMonthSameDay => add_months_with_day(anchor, steps, same_date.day()),
            Periodicity::NYearEoy => {
                let year = anchor.year() as i64 + steps;
                i32::try_from(year)
                    .ok()
                    .and_then(|y| NaiveDate::from_ymd_opt(y, 12, 31))
            }
            Periodicity::NYearSameDay => {
                let year = anchor.year() as i64 + steps;
                i32::try_from(year)
                    .ok()
                    .and_then(|y| clamped_date(y, same_date.month(), same_date.day()))
            }
            Periodicity::Weekly => index.checked_mul(7).and_then(|days| add_days(anchor, days)),
            Periodicity::Monthly => add_months(anchor, index),
            Periodicity::Bimonthly => index.checked_mul(2).and_then(|m| add_months(anchor, m)),
            Periodicity::Quarterly => index.checked_mul(3).and_then(|m| add_months(anchor, m)),
            Periodicity::SemiAnnually => index.checked_mul(6).and_then(|m| add_months(anchor, m)),
            Periodicity::Annually => index.checked_mul(12).and_then(|m| add_months(anchor, m)),
        };

        result.ok_or_else(|| self.overflow(anchor, index))
    }

    fn overflow(&self, anchor: NaiveDate, index: i64) -> InstrumentError {
        InstrumentError::InvalidPeriod(format!(
            "{}: date out of range advancing {} by {} periods",
            self.as_str(),
            anchor,
            index
        ))
    }
}

/// Advances `anchor_date` by `occurrence_index` periods, reusing the anchor's
/// own day for same-day periodicities.
pub fn period_advance(
    periodicity: Periodicity,
    periodicity_n: i32,
    anchor_date: NaiveDate,
    occurrence_index: i64,
) -> Result<NaiveDate, InstrumentError> {
    periodicity.advance(periodicity_n, anchor_date, occurrence_index, anchor_date)
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Periodicity {
    type Err = InstrumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Periodicity::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| InstrumentError::InvalidPeriod(format!("unknown periodicity '{}'", s)))
    }
}

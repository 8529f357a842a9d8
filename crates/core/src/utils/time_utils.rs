use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_year(year: i32) -> i64 {
    if is_leap(year) {
        366
    } else {
        365
    }
}

/// Last calendar day of the given month.
pub fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

pub fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.day() == last_day_of_month(date.year(), date.month())
}

/// Builds a date, clamping the day to the month length.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.min(last_day_of_month(year, month)).max(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Adds calendar months, keeping `day` (clamped to the target month length).
pub fn add_months_with_day(date: NaiveDate, months: i64, day: u32) -> Option<NaiveDate> {
    let total = date.year() as i64 * 12 + (date.month() as i64 - 1) + months;
    let year = total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let year = i32::try_from(year).ok()?;
    clamped_date(year, month, day)
}

/// Adds calendar months, keeping the day of month when it exists.
pub fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    add_months_with_day(date, months, date.day())
}

pub fn add_years(date: NaiveDate, years: i64) -> Option<NaiveDate> {
    add_months(date, years.checked_mul(12)?)
}

pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(Duration::try_days(days)?)
}

/// Signed number of days from `start` to `end`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Counts occurrences of `weekday` in the inclusive range `[d1, d2]`.
pub fn weekday_count(d1: NaiveDate, d2: NaiveDate, weekday: Weekday) -> i64 {
    if d2 < d1 {
        return 0;
    }
    let offset = (7 + weekday.num_days_from_monday() as i64
        - d1.weekday().num_days_from_monday() as i64)
        % 7;
    let span = days_between(d1, d2);
    if offset > span {
        0
    } else {
        (span - offset) / 7 + 1
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The closest Monday-Friday on or before `date`.
pub fn last_business_day(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date - Duration::days(2),
        _ => date,
    }
}

/// Adds `n` business days (Mon-Fri), skipping weekends.
pub fn add_workdays(date: NaiveDate, n: i64) -> Option<NaiveDate> {
    let weeks = n.div_euclid(5);
    let rest = n.rem_euclid(5);
    let mut current = add_days(date, weeks * 7)?;
    let mut left = rest;
    while left > 0 {
        current = current.succ_opt()?;
        if is_business_day(current) {
            left -= 1;
        }
    }
    if !is_business_day(current) {
        // landing on a weekend from a weekend anchor
        while !is_business_day(current) {
            current = current.succ_opt()?;
        }
    }
    Some(current)
}

/// Snaps forward to the Friday of the same week (the date itself when it is a Friday).
pub fn next_friday(date: NaiveDate) -> NaiveDate {
    let from_monday = date.weekday().num_days_from_monday() as i64;
    let friday = Weekday::Fri.num_days_from_monday() as i64;
    let delta = (friday - from_monday).rem_euclid(7);
    date + Duration::days(delta)
}

/// Inclusive list of days from `start` to `end`.
pub fn get_days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    if start > end {
        return Vec::new();
    }
    start.iter_days().take_while(|d| *d <= end).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_leap_years() {
        assert!(is_leap(2000));
        assert!(is_leap(2016));
        assert!(!is_leap(1900));
        assert!(!is_leap(2015));
    }

    #[test]
    fn test_add_months_clamps_to_month_end() {
        assert_eq!(add_months(d(2016, 1, 31), 1), Some(d(2016, 2, 29)));
        assert_eq!(add_months(d(2015, 1, 31), 1), Some(d(2015, 2, 28)));
        assert_eq!(add_months(d(2016, 3, 31), -1), Some(d(2016, 2, 29)));
        assert_eq!(add_months(d(2016, 11, 15), 3), Some(d(2017, 2, 15)));
    }

    #[test]
    fn test_weekday_count_inclusive() {
        // 2024-01-01 is a Monday
        assert_eq!(weekday_count(d(2024, 1, 1), d(2024, 1, 7), Weekday::Sat), 1);
        assert_eq!(weekday_count(d(2024, 1, 1), d(2024, 1, 31), Weekday::Mon), 5);
        assert_eq!(weekday_count(d(2024, 1, 6), d(2024, 1, 6), Weekday::Sat), 1);
        assert_eq!(weekday_count(d(2024, 1, 7), d(2024, 1, 6), Weekday::Sat), 0);
    }

    #[test]
    fn test_business_day_helpers() {
        assert_eq!(last_business_day(d(2024, 1, 7)), d(2024, 1, 5));
        assert_eq!(last_business_day(d(2024, 1, 3)), d(2024, 1, 3));
        assert_eq!(add_workdays(d(2024, 1, 5), 1), Some(d(2024, 1, 8)));
        assert_eq!(add_workdays(d(2024, 1, 1), 5), Some(d(2024, 1, 8)));
        assert_eq!(next_friday(d(2024, 1, 1)), d(2024, 1, 5));
        assert_eq!(next_friday(d(2024, 1, 5)), d(2024, 1, 5));
        assert_eq!(next_friday(d(2024, 1, 6)), d(2024, 1, 12));
    }

    #[test]
    fn test_get_days_between() {
        assert_eq!(get_days_between(d(2024, 1, 1), d(2024, 1, 3)).len(), 3);
        assert!(get_days_between(d(2024, 1, 3), d(2024, 1, 1)).is_empty());
    }
}

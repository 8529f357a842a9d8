//! Tests for day-count conventions and coupon amounts.

#[cfg(test)]
mod tests {
    use crate::instruments::{
        accrual_factor, coupon_amount, coupon_amount_or_zero, year_fraction,
        AccrualCalculationModel, InstrumentError, Periodicity, COUPON_ERROR_KEY,
    };
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    // ==================== Year fraction Tests ====================

    #[test]
    fn test_thirty_360_us_month_end_snaps_both_days() {
        let f = year_fraction(
            AccrualCalculationModel::Thirty360Us,
            d(2016, 1, 31),
            d(2016, 3, 31),
            None,
        );
        assert_close(f, 60.0 / 360.0);
    }

    #[test]
    fn test_thirty_360_us_keeps_d2_when_d1_is_mid_month() {
        let f = year_fraction(
            AccrualCalculationModel::Thirty360Us,
            d(2016, 1, 15),
            d(2016, 3, 31),
            None,
        );
        assert_close(f, 76.0 / 360.0);
    }

    #[test]
    fn test_act_365_full_year_is_one() {
        let f = year_fraction(
            AccrualCalculationModel::Act365,
            d(2015, 1, 1),
            d(2016, 1, 1),
            None,
        );
        assert_close(f, 1.0);
    }

    #[test]
    fn test_act_360_three_hundred_sixty_days_is_one() {
        let start = d(2021, 3, 1);
        let end = start + chrono::Duration::days(360);
        assert_close(
            year_fraction(AccrualCalculationModel::Act360, start, end, None),
            1.0,
        );
    }

    #[test]
    fn test_act_act_isda_splits_at_year_boundary() {
        let f = year_fraction(
            AccrualCalculationModel::ActActIsda,
            d(2015, 7, 1),
            d(2016, 7, 1),
            None,
        );
        assert_close(f, 184.0 / 365.0 + 182.0 / 366.0);
    }

    #[test]
    fn test_act_act_isda_same_leap_status_uses_365() {
        let inside_leap_year = year_fraction(
            AccrualCalculationModel::ActActIsda,
            d(2016, 1, 1),
            d(2016, 7, 1),
            None,
        );
        assert_close(inside_leap_year, 182.0 / 365.0);

        let two_years = year_fraction(
            AccrualCalculationModel::ActActIsda,
            d(2015, 7, 1),
            d(2017, 7, 1),
            None,
        );
        assert_close(two_years, 731.0 / 365.0);
    }

    #[test]
    fn test_act_act_isda_splits_only_at_end_year() {
        let f = year_fraction(
            AccrualCalculationModel::ActActIsda,
            d(2016, 7, 1),
            d(2017, 7, 1),
            None,
        );
        assert_close(f, 184.0 / 366.0 + 181.0 / 365.0);
    }

    #[test]
    fn test_bd_252_excludes_weekends() {
        // Monday to Monday: 7 days, one Saturday and one Sunday
        let f = year_fraction(
            AccrualCalculationModel::Bd252,
            d(2024, 1, 1),
            d(2024, 1, 8),
            None,
        );
        assert_close(f, 5.0 / 252.0);
    }

    #[test]
    fn test_nl_365_skips_february_29() {
        let f = year_fraction(
            AccrualCalculationModel::Nl365,
            d(2024, 2, 1),
            d(2024, 3, 1),
            None,
        );
        assert_close(f, 28.0 / 365.0);
    }

    #[test]
    fn test_thirty_360_isda_requires_maturity() {
        let f = year_fraction(
            AccrualCalculationModel::Thirty360Isda,
            d(2020, 1, 1),
            d(2020, 7, 1),
            None,
        );
        assert_eq!(f, 0.0);

        let f = year_fraction(
            AccrualCalculationModel::Thirty360Isda,
            d(2020, 1, 1),
            d(2020, 7, 1),
            Some(d(2025, 1, 1)),
        );
        assert_close(f, 0.5);
    }

    #[test]
    fn test_act_365a_counts_inclusive_days() {
        let f = year_fraction(
            AccrualCalculationModel::Act365A,
            d(2021, 1, 1),
            d(2021, 1, 31),
            None,
        );
        assert_close(f, 31.0 / 365.0);
    }

    #[test]
    fn test_none_is_zero() {
        let f = year_fraction(
            AccrualCalculationModel::None,
            d(2021, 1, 1),
            d(2022, 1, 1),
            None,
        );
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_wire_names_round_trip_through_serde() {
        assert_eq!(
            serde_json::to_string(&AccrualCalculationModel::Thirty360Us).unwrap(),
            "\"30/360 US\""
        );
        assert_eq!(
            serde_json::from_str::<AccrualCalculationModel>("\"ACT/ACT ISDA\"").unwrap(),
            AccrualCalculationModel::ActActIsda
        );
    }

    // ==================== Accrual factor Tests ====================

    #[test]
    fn test_icma_factor_first_period() {
        let f = accrual_factor(
            AccrualCalculationModel::ActActIcma,
            Periodicity::SemiAnnually,
            d(2020, 1, 1),
            d(2020, 4, 1),
            d(2020, 7, 1),
            Some(d(2025, 1, 1)),
        )
        .unwrap();
        // 91 of 182 days in a half-year period
        assert_close(f, 0.25);
    }

    #[test]
    fn test_icma_factor_rolls_to_current_period() {
        let f = accrual_factor(
            AccrualCalculationModel::ActActIcma,
            Periodicity::SemiAnnually,
            d(2020, 1, 1),
            d(2020, 10, 1),
            d(2020, 7, 1),
            Some(d(2025, 1, 1)),
        )
        .unwrap();
        // 92 of 184 days from 2020-07-01 to 2021-01-01
        assert_close(f, 0.25);
    }

    #[test]
    fn test_sub_monthly_periodicity_accrues_nothing() {
        let f = accrual_factor(
            AccrualCalculationModel::Act365,
            Periodicity::Weekly,
            d(2020, 1, 1),
            d(2020, 1, 20),
            d(2020, 1, 8),
            None,
        )
        .unwrap();
        assert_eq!(f, 0.0);
    }

    #[test]
    fn test_calendar_periodicity_accrues_annually_from_start() {
        let f = accrual_factor(
            AccrualCalculationModel::Act365,
            Periodicity::NDay,
            d(2021, 1, 1),
            d(2021, 7, 2),
            d(2021, 2, 1),
            None,
        )
        .unwrap();
        assert_close(f, 182.0 / 365.0);
    }

    // ==================== Coupon Tests ====================

    #[test]
    fn test_icma_coupon_divides_by_frequency() {
        let c = coupon_amount(
            AccrualCalculationModel::ActActIcma,
            Periodicity::Quarterly,
            8.0,
            d(2020, 1, 1),
            d(2020, 4, 1),
            None,
            false,
        )
        .unwrap();
        assert_close(c, 2.0);
    }

    #[test]
    fn test_icma_coupon_as_factor_uses_unit_notional() {
        let c = coupon_amount(
            AccrualCalculationModel::ActActIcma,
            Periodicity::SemiAnnually,
            8.0,
            d(2020, 1, 1),
            d(2020, 7, 1),
            None,
            true,
        )
        .unwrap();
        assert_close(c, 0.5);
    }

    #[test]
    fn test_icma_coupon_without_frequency_is_unknown_convention() {
        let err = coupon_amount(
            AccrualCalculationModel::ActActIcma,
            Periodicity::NDay,
            5.0,
            d(2020, 1, 1),
            d(2020, 2, 1),
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, InstrumentError::UnknownConvention { .. }));
        assert_eq!(err.error_key(), COUPON_ERROR_KEY);

        let degraded = coupon_amount_or_zero(
            AccrualCalculationModel::ActActIcma,
            Periodicity::NDay,
            5.0,
            d(2020, 1, 1),
            d(2020, 2, 1),
            None,
            false,
        );
        assert_eq!(degraded, 0.0);
    }

    #[test]
    fn test_act_360_coupon_scales_size() {
        let c = coupon_amount(
            AccrualCalculationModel::Act360,
            Periodicity::Quarterly,
            4.0,
            d(2021, 1, 1),
            d(2021, 4, 1),
            None,
            false,
        )
        .unwrap();
        assert_close(c, 4.0 * 90.0 / 360.0);
    }
}

//! Tests for accrual schedule queries on instruments.

#[cfg(test)]
mod tests {
    use crate::instruments::{
        AccrualCalculationModel, AccrualCalculationSchedule, FactorSchedule, Instrument,
        Periodicity,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(
        id: &str,
        start: NaiveDate,
        first_payment: NaiveDate,
        size: f64,
        model: AccrualCalculationModel,
    ) -> AccrualCalculationSchedule {
        AccrualCalculationSchedule {
            id: id.to_string(),
            accrual_start_date: start,
            first_payment_date: first_payment,
            accrual_size: size,
            accrual_calculation_model: model,
            periodicity: Periodicity::SemiAnnually,
            periodicity_n: 1,
            ..Default::default()
        }
    }

    fn create_two_row_instrument() -> Instrument {
        Instrument {
            id: "inst-1".to_string(),
            user_code: "BOND-2005".to_string(),
            maturity_date: Some(d(2005, 1, 1)),
            maturity_price: dec!(100),
            // stored out of order on purpose
            accrual_calculation_schedules: vec![
                row(
                    "acc-2",
                    d(2003, 1, 1),
                    d(2003, 7, 1),
                    20.0,
                    AccrualCalculationModel::ActActIcma,
                ),
                row(
                    "acc-1",
                    d(2001, 1, 1),
                    d(2001, 7, 1),
                    10.0,
                    AccrualCalculationModel::ActActIcma,
                ),
            ],
            ..Default::default()
        }
    }

    fn create_single_row_instrument(model: AccrualCalculationModel) -> Instrument {
        Instrument {
            id: "inst-2".to_string(),
            user_code: "BOND-SINGLE".to_string(),
            maturity_date: Some(d(2005, 1, 1)),
            maturity_price: dec!(100),
            accrual_calculation_schedules: vec![row(
                "acc-1",
                d(2001, 1, 1),
                d(2001, 7, 1),
                10.0,
                model,
            )],
            ..Default::default()
        }
    }

    // ==================== find_active Tests ====================

    #[test]
    fn test_find_active_picks_row_by_interval() {
        let instrument = create_two_row_instrument();

        let active = instrument.find_active(d(2002, 6, 30)).unwrap();
        assert_eq!(active.schedule.accrual_size, 10.0);
        assert_eq!(active.end, d(2003, 1, 1));

        let active = instrument.find_active(d(2003, 1, 1)).unwrap();
        assert_eq!(active.schedule.accrual_size, 20.0);
        assert_eq!(active.end, d(2005, 1, 2));
    }

    #[test]
    fn test_find_active_outside_schedule() {
        let instrument = create_two_row_instrument();
        assert!(instrument.find_active(d(2000, 12, 31)).is_none());
        assert!(instrument.find_active(d(2005, 1, 1)).is_none());
        assert!(instrument.find_active(d(2006, 1, 1)).is_none());
    }

    #[test]
    fn test_find_active_interval_contains_date() {
        let instrument = create_two_row_instrument();
        let mut date = d(2001, 1, 1);
        while date < d(2005, 1, 1) {
            let active = instrument.find_active(date).unwrap();
            assert!(active.contains(date), "{} not in its active row", date);
            date += chrono::Duration::days(17);
        }
    }

    // ==================== coupon_at Tests ====================

    #[test]
    fn test_coupon_at_payment_dates() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        assert_eq!(instrument.coupon_at(d(2002, 1, 1), false), (5.0, true));
        assert_eq!(instrument.coupon_at(d(2002, 2, 1), false), (0.0, false));
    }

    #[test]
    fn test_coupon_at_maturity_with_maturity_flag() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        assert_eq!(instrument.coupon_at(d(2005, 1, 1), true), (100.0, true));
        assert_eq!(instrument.coupon_at_as(d(2005, 1, 1), true, true), (1.0, true));
        assert_eq!(instrument.coupon_at(d(2005, 6, 1), false), (0.0, false));
    }

    // ==================== future_payments Tests ====================

    #[test]
    fn test_future_payments_single_row_with_maturity() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        let payments: Vec<(NaiveDate, f64)> =
            instrument.future_payments(d(2001, 1, 1), true, false).collect();

        let dates: Vec<NaiveDate> = payments.iter().map(|(date, _)| *date).collect();
        assert_eq!(
            dates,
            vec![
                d(2001, 7, 1),
                d(2002, 1, 1),
                d(2002, 7, 1),
                d(2003, 1, 1),
                d(2003, 7, 1),
                d(2004, 1, 1),
                d(2004, 7, 1),
                d(2005, 1, 1),
                d(2005, 1, 1),
            ]
        );
        assert!(payments[..8].iter().all(|(_, value)| *value == 5.0));
        assert_eq!(payments.last().unwrap().1, 100.0);
    }

    #[test]
    fn test_future_payments_from_mid_schedule() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        let dates: Vec<NaiveDate> = instrument
            .future_payments(d(2003, 6, 1), true, false)
            .map(|(date, _)| date)
            .collect();
        assert_eq!(
            dates,
            vec![
                d(2003, 7, 1),
                d(2004, 1, 1),
                d(2004, 7, 1),
                d(2005, 1, 1),
                d(2005, 1, 1)
            ]
        );
    }

    #[test]
    fn test_future_payments_clamps_last_step_of_row() {
        let instrument = create_two_row_instrument();
        let dates: Vec<NaiveDate> = instrument
            .future_payments(d(2002, 3, 1), false, false)
            .map(|(date, _)| date)
            .collect();
        assert_eq!(dates[0], d(2002, 7, 1));
        assert_eq!(dates[1], d(2002, 12, 31));
        assert_eq!(dates[2], d(2003, 7, 1));
        assert_eq!(*dates.last().unwrap(), d(2005, 1, 1));
    }

    #[test]
    fn test_future_payments_after_maturity_is_empty() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        assert_eq!(instrument.future_payments(d(2006, 1, 1), true, false).count(), 0);
    }

    #[test]
    fn test_coupons_tile_the_row() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::Act365);
        let total: f64 = instrument
            .future_payments(d(2001, 1, 1), false, false)
            .map(|(_, value)| value)
            .sum();
        let days = (d(2005, 1, 1) - d(2001, 1, 1)).num_days() as f64;
        assert!((total - 10.0 * days / 365.0).abs() < 1e-9);
    }

    // ==================== accrued_price / factor_at Tests ====================

    #[test]
    fn test_accrued_price() {
        let instrument = create_single_row_instrument(AccrualCalculationModel::ActActIcma);
        assert_eq!(instrument.accrued_price(d(2001, 1, 1)), 0.0);
        let mid = instrument.accrued_price(d(2001, 4, 1));
        assert!((mid - 10.0 * 90.0 / 181.0 / 2.0).abs() < 1e-12);
        assert_eq!(instrument.accrued_price(d(2005, 1, 1)), 0.0);
    }

    #[test]
    fn test_factor_at_uses_latest_effective_row() {
        let mut instrument = create_single_row_instrument(AccrualCalculationModel::Act365);
        instrument.factor_schedules = vec![
            FactorSchedule {
                id: "f-2".to_string(),
                effective_date: d(2003, 1, 1),
                factor_value: 0.5,
            },
            FactorSchedule {
                id: "f-1".to_string(),
                effective_date: d(2002, 1, 1),
                factor_value: 0.8,
            },
        ];
        assert_eq!(instrument.factor_at(d(2001, 6, 1)), 1.0);
        assert_eq!(instrument.factor_at(d(2002, 1, 1)), 0.8);
        assert_eq!(instrument.factor_at(d(2004, 1, 1)), 0.5);
    }
}

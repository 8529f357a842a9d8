//! Tests for bond projection, yield and duration.

#[cfg(test)]
mod tests {
    use crate::instruments::{
        xirr, xnpv, AccrualCalculationModel, AccrualCalculationSchedule, BondCashFlows, BondKind,
        BondMathTrait, CashFlowBondMath, FactorSchedule, Instrument, InstrumentAnalytics,
        Periodicity, SolverConfig,
    };
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn create_fixed_rate_bond() -> Instrument {
        Instrument {
            id: "bond-1".to_string(),
            user_code: "FIX-5-2025".to_string(),
            maturity_date: Some(d(2025, 1, 1)),
            maturity_price: dec!(100),
            accrual_calculation_schedules: vec![AccrualCalculationSchedule {
                id: "acc-1".to_string(),
                accrual_start_date: d(2020, 1, 1),
                first_payment_date: d(2020, 7, 1),
                accrual_size: 5.0,
                accrual_calculation_model: AccrualCalculationModel::ActActIcma,
                periodicity: Periodicity::SemiAnnually,
                periodicity_n: 1,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_fixed_rate_projection() {
        let math = CashFlowBondMath::default();
        let bond = BondCashFlows::from_instrument(&create_fixed_rate_bond(), d(2020, 1, 1), &math)
            .unwrap();

        assert_eq!(bond.kind, BondKind::FixedRate);
        assert_eq!(bond.frequency, 2);
        assert_eq!(bond.cash_flows.len(), 10);
        assert_eq!(bond.cash_flows[0].date, d(2020, 7, 1));
        assert_eq!(bond.cash_flows[0].amount, 2.5);
        let last = bond.cash_flows.last().unwrap();
        assert_eq!(last.date, d(2025, 1, 1));
        assert_eq!(last.amount, 102.5);
    }

    #[test]
    fn test_par_bond_yield_is_close_to_coupon() {
        let analytics = InstrumentAnalytics::default();
        let ytm = analytics.ytm(&create_fixed_rate_bond(), d(2020, 1, 1), 100.0);
        assert!((ytm - 0.05).abs() < 2e-3, "ytm {}", ytm);
    }

    #[test]
    fn test_yield_round_trips_through_price() {
        let analytics = InstrumentAnalytics::default();
        let bond = create_fixed_rate_bond();
        let ytm = analytics.ytm(&bond, d(2021, 3, 15), 97.0);
        let price = analytics.price_from_yield(&bond, d(2021, 3, 15), ytm);
        assert!((price - 97.0).abs() < 1e-3, "price {}", price);
    }

    #[test]
    fn test_duration_decreases_with_yield() {
        let analytics = InstrumentAnalytics::default();
        let bond = create_fixed_rate_bond();
        let date = d(2020, 1, 1);
        let low = analytics.modified_duration(&bond, date, 0.02);
        let mid = analytics.modified_duration(&bond, date, 0.05);
        let high = analytics.modified_duration(&bond, date, 0.08);
        assert!(low > 0.0);
        assert!(low >= mid && mid >= high, "{} {} {}", low, mid, high);
        assert!(mid < 5.0);
    }

    #[test]
    fn test_zero_coupon_yield() {
        let instrument = Instrument {
            user_code: "ZERO-2030".to_string(),
            maturity_date: Some(d(2030, 1, 1)),
            maturity_price: dec!(100),
            ..Default::default()
        };
        let math = CashFlowBondMath::default();
        let bond = BondCashFlows::from_instrument(&instrument, d(2020, 1, 1), &math).unwrap();
        assert_eq!(bond.kind, BondKind::ZeroCoupon);
        assert_eq!(bond.cash_flows.len(), 1);

        let ytm = math.price_to_yield(&bond, 50.0, 0.0).unwrap();
        assert!((bond.present_value(ytm) - 50.0).abs() < 1e-3);
        assert!(ytm > 0.07 && ytm < 0.073, "ytm {}", ytm);
    }

    #[test]
    fn test_amortizing_projection_redeems_on_factor_drop() {
        let mut instrument = create_fixed_rate_bond();
        instrument.factor_schedules = vec![
            FactorSchedule {
                id: "f-1".to_string(),
                effective_date: d(2020, 1, 1),
                factor_value: 1.0,
            },
            FactorSchedule {
                id: "f-2".to_string(),
                effective_date: d(2022, 1, 1),
                factor_value: 0.5,
            },
        ];
        let math = CashFlowBondMath::default();
        let bond = BondCashFlows::from_instrument(&instrument, d(2020, 1, 1), &math).unwrap();

        assert_eq!(bond.kind, BondKind::Amortizing);
        assert_eq!(bond.notional, 100.0);
        let drop = bond
            .cash_flows
            .iter()
            .find(|cf| cf.date == d(2022, 1, 1))
            .unwrap();
        assert_eq!(drop.amount, 52.5);
        assert_eq!(bond.cash_flows.last().unwrap().amount, 51.25);
    }

    #[test]
    fn test_perpetual_has_no_yield() {
        let mut instrument = create_fixed_rate_bond();
        instrument.maturity_date = Some(d(9999, 12, 31));
        let analytics = InstrumentAnalytics::default();
        assert_eq!(analytics.ytm(&instrument, d(2020, 1, 1), 100.0), 0.0);
        assert_eq!(analytics.modified_duration(&instrument, d(2020, 1, 1), 0.05), 0.0);
    }

    #[test]
    fn test_settlement_after_maturity_degrades_to_zero() {
        let analytics = InstrumentAnalytics::default();
        assert_eq!(
            analytics.ytm(&create_fixed_rate_bond(), d(2026, 1, 1), 100.0),
            0.0
        );
    }

    #[test]
    fn test_non_positive_price_degrades_to_zero() {
        let analytics = InstrumentAnalytics::default();
        assert_eq!(analytics.ytm(&create_fixed_rate_bond(), d(2020, 1, 1), -5.0), 0.0);
    }

    #[test]
    fn test_xirr_one_year_flow() {
        let flows = vec![(d(2020, 1, 1), -100.0), (d(2021, 1, 1), 110.0)];
        let rate = xirr(&flows, SolverConfig::default());
        assert!(xnpv(&flows, rate).abs() < 1e-3);
        assert!((rate - 0.0997).abs() < 1e-3, "rate {}", rate);
    }

    #[test]
    fn test_xirr_empty_is_zero() {
        assert_eq!(xirr(&[], SolverConfig::default()), 0.0);
    }
}

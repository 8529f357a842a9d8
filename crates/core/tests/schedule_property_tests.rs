//! Property-based tests for accrual schedules, day counts and cost matching.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use ledgerfolio_core::instruments::{
    year_fraction, AccrualCalculationModel, AccrualCalculationSchedule, Instrument, Periodicity,
};
use ledgerfolio_core::reports::{annotate_multipliers, CostMethod, ReportSpec, VirtualTransaction};
use ledgerfolio_core::transactions::TransactionClass;
use ledgerfolio_core::utils::decimal_utils::is_close;

// =============================================================================
// Generators
// =============================================================================

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
}

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..12_000).prop_map(|days| base_date() + Duration::days(days))
}

fn arb_periodicity() -> impl Strategy<Value = Periodicity> {
    prop_oneof![
        Just(Periodicity::Monthly),
        Just(Periodicity::Quarterly),
        Just(Periodicity::SemiAnnually),
        Just(Periodicity::Annually),
    ]
}

/// A bond with a single accrual row paying from one period after its start.
fn arb_bond() -> impl Strategy<Value = Instrument> {
    (arb_date(), arb_periodicity(), 1i64..40, 0.5f64..10.0).prop_map(
        |(start, periodicity, periods, size)| {
            let first_payment = periodicity.advance(1, start, 1, start).unwrap();
            let maturity = periodicity.advance(1, start, periods, start).unwrap();
            Instrument {
                id: "bond".to_string(),
                user_code: "BOND".to_string(),
                maturity_date: Some(maturity),
                maturity_price: Decimal::ONE_HUNDRED,
                accrual_calculation_schedules: vec![AccrualCalculationSchedule {
                    id: "row-1".to_string(),
                    accrual_start_date: start,
                    first_payment_date: first_payment,
                    accrual_size: size,
                    accrual_calculation_model: AccrualCalculationModel::Act365,
                    periodicity,
                    periodicity_n: 1,
                    ..Default::default()
                }],
                ..Default::default()
            }
        },
    )
}

/// Non-zero trade sizes; the sign picks BUY or SELL.
fn arb_trades() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(
        prop_oneof![(-50i64..=-1), (1i64..=50)],
        1..25,
    )
}

fn trade_rows(sizes: &[i64]) -> Vec<VirtualTransaction> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let position = Decimal::from(*size);
            VirtualTransaction {
                id: format!("t{}", i),
                source_id: format!("t{}", i),
                transaction_code: i as i64,
                class: if *size > 0 {
                    TransactionClass::Buy
                } else {
                    TransactionClass::Sell
                },
                instrument: Some("inst-1".to_string()),
                position_size: position,
                principal: -position,
                cash: -position,
                ..Default::default()
            }
        })
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The active accrual period always contains the queried date.
    #[test]
    fn prop_find_active_contains_date(bond in arb_bond(), offset in 0i64..15_000) {
        let start = bond.accrual_calculation_schedules[0].accrual_start_date;
        let maturity = bond.maturity_date.unwrap();
        let date = start + Duration::days(offset);

        match bond.find_active(date) {
            Some(period) => {
                prop_assert!(period.contains(date));
                prop_assert!(date < maturity);
            }
            None => prop_assert!(date >= maturity),
        }
    }

    /// Future payment dates never go backwards and end at maturity.
    #[test]
    fn prop_future_payments_ordered_and_end_at_maturity(bond in arb_bond(), offset in 0i64..400) {
        let start = bond.accrual_calculation_schedules[0].accrual_start_date;
        let maturity = bond.maturity_date.unwrap();
        let from = start + Duration::days(offset);
        prop_assume!(from <= maturity);

        let payments: Vec<(NaiveDate, f64)> = bond.future_payments(from, true, false).collect();

        prop_assert!(!payments.is_empty());
        prop_assert!(payments.windows(2).all(|w| w[0].0 <= w[1].0));
        prop_assert!(payments.iter().all(|(date, _)| *date >= from));
        prop_assert_eq!(payments.last().map(|p| p.0), Some(maturity));
        prop_assert!(payments.iter().all(|(_, value)| value.is_finite() && *value >= 0.0));
    }

    /// Fixed-denominator conventions give exactly one year over their own basis.
    #[test]
    fn prop_fixed_basis_year_is_one(start in arb_date()) {
        let after_365 = start + Duration::days(365);
        let after_360 = start + Duration::days(360);

        let act_365 = year_fraction(AccrualCalculationModel::Act365, start, after_365, None);
        let act_360 = year_fraction(AccrualCalculationModel::Act360, start, after_360, None);

        prop_assert!((act_365 - 1.0).abs() < 1e-12);
        prop_assert!((act_360 - 1.0).abs() < 1e-12);
        prop_assert_eq!(
            year_fraction(AccrualCalculationModel::Act365, start, start, None),
            0.0
        );
    }

    /// What cost matching leaves open adds up to the net traded position.
    #[test]
    fn prop_open_positions_sum_to_rolling(sizes in arb_trades(), fifo in any::<bool>()) {
        let mut spec = ReportSpec::new(base_date(), "USD", "standard");
        spec.cost_method = if fifo { CostMethod::Fifo } else { CostMethod::Avco };
        let mut rows = trade_rows(&sizes);

        annotate_multipliers(&mut rows, &spec, |_| false);

        let rolling: Decimal = sizes.iter().map(|s| Decimal::from(*s)).sum();
        let open: Decimal = rows
            .iter()
            .map(|r| r.position_size * (Decimal::ONE - r.multiplier))
            .sum();
        prop_assert!(is_close(open, rolling), "open {} vs rolling {}", open, rolling);
        prop_assert!(rows
            .iter()
            .all(|r| r.multiplier >= Decimal::ZERO && r.multiplier <= Decimal::ONE + Decimal::new(1, 8)));
    }
}

#[cfg(test)]
mod tests {
    use crate::pricing::{CurrencyHistory, CurrencyHistoryRecord, PriceHistory, PriceIndex};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rate(currency: &str, policy: &str, date: NaiveDate, fx_rate: Decimal) -> CurrencyHistoryRecord {
        CurrencyHistoryRecord {
            id: format!("{}-{}-{}", currency, policy, date),
            currency: currency.to_string(),
            pricing_policy: policy.to_string(),
            date,
            fx_rate,
        }
    }

    fn create_history() -> CurrencyHistory {
        CurrencyHistory::new(
            "USD",
            vec![
                rate("EUR", "default", d(2024, 1, 1), dec!(1.10)),
                rate("EUR", "default", d(2024, 1, 10), dec!(1.20)),
                rate("EUR", "stress", d(2024, 1, 1), dec!(0.90)),
                rate("GBP", "default", d(2024, 1, 1), dec!(1.25)),
            ],
        )
    }

    #[test]
    fn test_system_currency_is_always_one() {
        let history = create_history();
        assert_eq!(history.fx_rate("USD", "default", d(1990, 1, 1)), Some(Decimal::ONE));
    }

    #[test]
    fn test_latest_rate_on_or_before() {
        let history = create_history();
        assert_eq!(history.fx_rate("EUR", "default", d(2024, 1, 5)), Some(dec!(1.10)));
        assert_eq!(history.fx_rate("EUR", "default", d(2024, 1, 10)), Some(dec!(1.20)));
        assert_eq!(history.fx_rate("EUR", "default", d(2023, 12, 31)), None);
        assert_eq!(history.fx_rate_or_zero("EUR", "default", d(2023, 12, 31)), Decimal::ZERO);
    }

    #[test]
    fn test_rates_are_per_policy() {
        let history = create_history();
        assert_eq!(history.fx_rate("EUR", "stress", d(2024, 2, 1)), Some(dec!(0.90)));
        assert_eq!(history.fx_rate("GBP", "stress", d(2024, 2, 1)), None);
    }

    #[test]
    fn test_convert_through_system_currency() {
        let history = create_history();
        let converted = history.convert(dec!(100), "EUR", "GBP", "default", d(2024, 1, 2));
        assert_eq!(converted, dec!(88));
        assert_eq!(history.convert(dec!(100), "EUR", "EUR", "default", d(2024, 1, 2)), dec!(100));
    }

    #[test]
    fn test_convert_to_unknown_currency_is_zero() {
        let history = create_history();
        assert_eq!(
            history.convert(dec!(100), "EUR", "JPY", "default", d(2024, 1, 2)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_price_index_lookup() {
        let index = PriceIndex::new(vec![
            PriceHistory::new("bond-1", "default", d(2024, 1, 1), dec!(99)),
            PriceHistory::new("bond-1", "default", d(2024, 2, 1), dec!(101)),
        ]);
        assert_eq!(
            index.price_on("bond-1", d(2024, 1, 15)).unwrap().principal_price,
            dec!(99)
        );
        assert_eq!(
            index.price_on("bond-1", d(2024, 3, 1)).unwrap().principal_price,
            dec!(101)
        );
        assert!(index.price_on("bond-1", d(2023, 3, 1)).is_none());
        assert!(index.price_on("bond-2", d(2024, 3, 1)).is_none());
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{DatabaseError, Error, Result};
    use crate::instruments::{Instrument, InstrumentClass, InstrumentRepositoryTrait, InstrumentType};
    use crate::pricing::{CurrencyHistoryRecord, PriceHistory, PricingPolicy, PricingRepositoryTrait};
    use crate::reports::{
        annotate_multipliers, CostMethod, PlComponents, ReportBuilder, ReportBuilderTrait, ReportItem,
        ReportItemKind, ReportSpec, TransactionCase, VirtualTransaction,
    };
    use crate::transactions::{
        ComplexTransaction, Transaction, TransactionClass, TransactionRepositoryTrait,
        INVALID_EXPRESSION_VALUE,
    };
    use crate::utils::decimal_utils::is_close;
    use crate::utils::CancellationToken;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    const POLICY: &str = "standard";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // --- In-memory ledger, instruments and prices ---
    #[derive(Default)]
    struct MockLedger {
        transactions: Arc<Mutex<Vec<Transaction>>>,
        instruments: Vec<Instrument>,
        instrument_types: Vec<InstrumentType>,
        prices: Vec<PriceHistory>,
        currencies: Vec<CurrencyHistoryRecord>,
    }

    impl MockLedger {
        fn new() -> Self {
            MockLedger {
                instruments: vec![Instrument {
                    id: "inst-1".to_string(),
                    user_code: "ACME".to_string(),
                    name: "Acme Corp".to_string(),
                    instrument_type: "stock".to_string(),
                    pricing_currency: "USD".to_string(),
                    accrued_currency: "USD".to_string(),
                    ..Default::default()
                }],
                instrument_types: vec![InstrumentType {
                    id: "type-1".to_string(),
                    user_code: "stock".to_string(),
                    name: "Stock".to_string(),
                    instrument_class: InstrumentClass::General,
                    ..Default::default()
                }],
                prices: vec![PriceHistory {
                    accrued_price: Some(Decimal::ZERO),
                    ..PriceHistory::new("inst-1", POLICY, d(2024, 1, 8), dec!(2))
                }],
                ..Default::default()
            }
        }

        fn with_transactions(self, transactions: Vec<Transaction>) -> Self {
            *self.transactions.lock().unwrap() = transactions;
            self
        }

        fn with_fx(mut self, currency: &str, date: NaiveDate, fx_rate: Decimal) -> Self {
            self.currencies.push(CurrencyHistoryRecord {
                id: format!("{}-{}", currency, date),
                currency: currency.to_string(),
                pricing_policy: POLICY.to_string(),
                date,
                fx_rate,
            });
            self
        }

        fn builder(self) -> ReportBuilder {
            let ledger = Arc::new(self);
            ReportBuilder::new(ledger.clone(), ledger.clone(), ledger)
        }
    }

    #[async_trait]
    impl TransactionRepositoryTrait for MockLedger {
        fn get_complex_transaction(&self, _complex_transaction_id: &str) -> Result<ComplexTransaction> {
            unimplemented!()
        }

        fn find_complex_transactions_by_unique_code(
            &self,
            _unique_code: &str,
        ) -> Result<Vec<ComplexTransaction>> {
            unimplemented!()
        }

        fn get_transactions(&self, _complex_transaction_id: &str) -> Result<Vec<Transaction>> {
            unimplemented!()
        }

        fn list_transactions(&self) -> Result<Vec<Transaction>> {
            Ok(self.transactions.lock().unwrap().clone())
        }

        fn next_complex_transaction_code(&self) -> Result<i64> {
            unimplemented!()
        }

        fn next_transaction_code(&self) -> Result<i64> {
            unimplemented!()
        }

        async fn save_complex_transaction(
            &self,
            _complex_transaction: ComplexTransaction,
        ) -> Result<ComplexTransaction> {
            unimplemented!()
        }

        async fn save_transaction(&self, _transaction: Transaction) -> Result<Transaction> {
            unimplemented!()
        }

        async fn delete_transactions(&self, _transaction_ids: &[String]) -> Result<()> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl InstrumentRepositoryTrait for MockLedger {
        fn get_instrument(&self, _instrument_id: &str) -> Result<Instrument> {
            unimplemented!()
        }

        fn find_instrument_by_user_code(&self, _user_code: &str) -> Result<Option<Instrument>> {
            unimplemented!()
        }

        fn list_instruments(&self) -> Result<Vec<Instrument>> {
            Ok(self.instruments.clone())
        }

        fn get_instrument_type(&self, user_code: &str) -> Result<InstrumentType> {
            self.instrument_types
                .iter()
                .find(|t| t.user_code == user_code)
                .cloned()
                .ok_or_else(|| Error::Database(DatabaseError::NotFound(user_code.to_string())))
        }

        async fn save_instrument(&self, _instrument: Instrument) -> Result<Instrument> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl PricingRepositoryTrait for MockLedger {
        fn get_pricing_policy(&self, _user_code: &str) -> Result<PricingPolicy> {
            unimplemented!()
        }

        fn get_price_history(
            &self,
            _instrument_id: &str,
            _pricing_policy: &str,
            _date: NaiveDate,
        ) -> Result<Option<PriceHistory>> {
            unimplemented!()
        }

        fn get_price_histories(&self, pricing_policy: &str, up_to: NaiveDate) -> Result<Vec<PriceHistory>> {
            Ok(self
                .prices
                .iter()
                .filter(|p| p.pricing_policy == pricing_policy && p.date <= up_to)
                .cloned()
                .collect())
        }

        fn get_currency_histories(
            &self,
            pricing_policy: &str,
            up_to: NaiveDate,
        ) -> Result<Vec<CurrencyHistoryRecord>> {
            Ok(self
                .currencies
                .iter()
                .filter(|c| c.pricing_policy == pricing_policy && c.date <= up_to)
                .cloned()
                .collect())
        }

        async fn save_price_history(&self, _price: PriceHistory) -> Result<PriceHistory> {
            unimplemented!()
        }
    }

    // --- Fixtures ---
    fn trade(
        id: &str,
        code: i64,
        class: TransactionClass,
        date: NaiveDate,
        position: Decimal,
        principal: Decimal,
    ) -> Transaction {
        Transaction {
            id: id.to_string(),
            transaction_code: code,
            transaction_class: class,
            instrument: Some("inst-1".to_string()),
            transaction_currency: Some("USD".to_string()),
            settlement_currency: Some("USD".to_string()),
            position_size_with_sign: position,
            cash_consideration: principal,
            principal_with_sign: principal,
            transaction_date: date,
            accounting_date: date,
            cash_date: date,
            portfolio: Some("pf-1".to_string()),
            account_position: Some("acc-1".to_string()),
            account_cash: Some("acc-1".to_string()),
            account_interim: Some("acc-interim".to_string()),
            reference_fx_rate: dec!(1),
            ..Default::default()
        }
    }

    fn scenario_trades() -> Vec<Transaction> {
        vec![
            trade("t1", 1, TransactionClass::Buy, d(2024, 1, 2), dec!(5), dec!(-10)),
            trade("t2", 2, TransactionClass::Buy, d(2024, 1, 3), dec!(5), dec!(-15)),
            trade("t3", 3, TransactionClass::Sell, d(2024, 1, 4), dec!(-5), dec!(20)),
        ]
    }

    fn row(id: &str, class: TransactionClass, position: Decimal, principal: Decimal) -> VirtualTransaction {
        VirtualTransaction {
            id: id.to_string(),
            source_id: id.to_string(),
            class,
            instrument: Some("inst-1".to_string()),
            position_size: position,
            principal,
            cash: principal,
            ..Default::default()
        }
    }

    fn spec() -> ReportSpec {
        ReportSpec::new(d(2024, 1, 10), "USD", POLICY)
    }

    fn open_balance(rows: &[VirtualTransaction]) -> Decimal {
        rows.iter()
            .filter(|r| r.class.is_trade())
            .map(|r| r.position_size * (Decimal::ONE - r.multiplier))
            .sum()
    }

    fn find_item<'a>(items: &'a [ReportItem], kind: ReportItemKind, currency: Option<&str>) -> &'a ReportItem {
        items
            .iter()
            .find(|i| i.kind == kind && (currency.is_none() || i.currency.as_deref() == currency))
            .expect("item present")
    }

    // --- Cost matching ---
    #[test]
    fn test_avco_closes_opens_proportionally() {
        let mut rows = vec![
            row("b1", TransactionClass::Buy, dec!(5), dec!(-10)),
            row("b2", TransactionClass::Buy, dec!(5), dec!(-15)),
            row("s1", TransactionClass::Sell, dec!(-5), dec!(20)),
        ];

        let closures = annotate_multipliers(&mut rows, &spec(), |_| false);

        assert_eq!(rows[0].multiplier, dec!(0.5));
        assert_eq!(rows[1].multiplier, dec!(0.5));
        assert_eq!(rows[2].multiplier, dec!(1));
        assert_eq!(rows[2].rolling_position, dec!(5));
        assert_eq!(closures.len(), 1);
        assert_eq!(closures[0].closer, 2);
        assert_eq!(rows[0].closed_by, vec![(2, dec!(0.5))]);
    }

    #[test]
    fn test_fifo_closes_oldest_first() {
        let mut rows = vec![
            row("b1", TransactionClass::Buy, dec!(10), dec!(-100)),
            row("b2", TransactionClass::Buy, dec!(10), dec!(-105)),
            row("s1", TransactionClass::Sell, dec!(-15), dec!(225)),
        ];

        annotate_multipliers(&mut rows, &spec().with_cost_method(CostMethod::Fifo), |_| false);

        assert_eq!(rows[0].multiplier, dec!(1));
        assert_eq!(rows[1].multiplier, dec!(0.5));
        assert_eq!(rows[2].multiplier, dec!(1));
        assert_eq!(rows[2].rolling_position, dec!(5));
        assert_eq!(open_balance(&rows), dec!(5));
    }

    #[test]
    fn test_avco_diverges_from_fifo() {
        let mut rows = vec![
            row("b1", TransactionClass::Buy, dec!(10), dec!(-100)),
            row("b2", TransactionClass::Buy, dec!(10), dec!(-105)),
            row("s1", TransactionClass::Sell, dec!(-15), dec!(225)),
        ];

        annotate_multipliers(&mut rows, &spec(), |_| false);

        assert_eq!(rows[0].multiplier, dec!(0.75));
        assert_eq!(rows[1].multiplier, dec!(0.75));
        assert_eq!(open_balance(&rows), rows[2].rolling_position);
    }

    #[test]
    fn test_contract_for_difference_is_matched_fifo() {
        let mut rows = vec![
            row("b1", TransactionClass::Buy, dec!(10), dec!(-100)),
            row("b2", TransactionClass::Buy, dec!(10), dec!(-105)),
            row("s1", TransactionClass::Sell, dec!(-15), dec!(225)),
        ];

        annotate_multipliers(&mut rows, &spec(), |id| id == "inst-1");

        assert_eq!(rows[0].multiplier, dec!(1));
        assert_eq!(rows[1].multiplier, dec!(0.5));
    }

    #[test]
    fn test_position_flip_reopens_the_remainder() {
        let mut rows = vec![
            row("b1", TransactionClass::Buy, dec!(10), dec!(-100)),
            row("s1", TransactionClass::Sell, dec!(-15), dec!(160)),
        ];

        annotate_multipliers(&mut rows, &spec(), |_| false);

        assert_eq!(rows[0].multiplier, dec!(1));
        assert!(is_close(rows[1].rolling_position, dec!(-5)));
        assert!(is_close(open_balance(&rows), rows[1].rolling_position));
    }

    #[test]
    fn test_transaction_pl_is_fully_closed() {
        let mut rows = vec![row("p1", TransactionClass::TransactionPl, dec!(0), dec!(-3))];

        annotate_multipliers(&mut rows, &spec(), |_| false);

        assert_eq!(rows[0].multiplier, dec!(1));
    }

    // --- Virtual rows ---
    #[test]
    fn test_equal_dates_are_normal_case() {
        let day = d(2024, 1, 10);
        assert_eq!(TransactionCase::classify(day, day, day), TransactionCase::Normal);
        assert_eq!(
            TransactionCase::classify(d(2024, 1, 5), d(2024, 1, 15), day),
            TransactionCase::CashPending
        );
        assert_eq!(
            TransactionCase::classify(d(2024, 1, 15), d(2024, 1, 5), day),
            TransactionCase::AccountingPending
        );
        assert_eq!(
            TransactionCase::classify(d(2024, 1, 11), d(2024, 1, 15), day),
            TransactionCase::Normal
        );
    }

    #[test]
    fn test_transfer_splits_into_mirrored_legs() {
        let mut transfer = row("tr", TransactionClass::Transfer, dec!(10), dec!(0));
        transfer.account_position = Some("from".to_string());
        transfer.account_cash = Some("to".to_string());

        let (first, second) = transfer.split_transfer();

        assert_eq!(first.class, TransactionClass::Sell);
        assert_eq!(second.class, TransactionClass::Buy);
        assert_eq!(first.position_size + second.position_size, Decimal::ZERO);
        assert_eq!(first.account_position.as_deref(), Some("from"));
        assert_eq!(second.account_position.as_deref(), Some("to"));
        assert_eq!(first.source_id, "tr");
        assert!(first.is_cloned() && second.is_cloned());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_fx_trade_splits_into_cash_legs() {
        let mut fx = row("fx", TransactionClass::FxTrade, dec!(100), dec!(-110));
        fx.instrument = None;
        fx.transaction_currency = Some("EUR".to_string());
        fx.settlement_currency = Some("USD".to_string());

        let (bought, sold) = fx.split_fx_trade();

        assert_eq!(bought.settlement_currency.as_deref(), Some("EUR"));
        assert_eq!(bought.cash, dec!(100));
        assert_eq!(bought.reference_fx_rate, dec!(1));
        assert_eq!(sold.settlement_currency.as_deref(), Some("USD"));
        assert_eq!(sold.position_size, dec!(-110));
        assert_eq!(sold.cash, dec!(-110));
    }

    #[test]
    fn test_approach_pair_nets_to_zero() {
        let mut closed = row("b1", TransactionClass::Buy, dec!(5), dec!(-10));
        closed.pl.full.all = PlComponents::new(dec!(-10), Decimal::ZERO, Decimal::ZERO);
        let mut closer = row("s1", TransactionClass::Sell, dec!(-5), dec!(20));
        closer.pl.full.all = PlComponents::new(dec!(20), Decimal::ZERO, Decimal::ZERO);

        let (first, second) =
            VirtualTransaction::approach_pair(&closed, &closer, dec!(1), dec!(0.5), dec!(0.5));

        assert_eq!(first.class, TransactionClass::Sell);
        assert_eq!(second.class, TransactionClass::Buy);
        assert_eq!(first.position_size, dec!(-5));
        assert_eq!(first.pl.full.all.total, dec!(-5));
        assert_eq!(first.pl.full.all.total + second.pl.full.all.total, Decimal::ZERO);
        assert_eq!(first.pl.full.closed.total, first.pl.full.all.total);
        assert_eq!(first.multiplier, dec!(1));
    }

    // --- Report builder ---
    #[test]
    fn test_report_splits_real_and_unreal() {
        let builder = MockLedger::new().with_transactions(scenario_trades()).builder();

        let report = builder.build_report(&spec(), &CancellationToken::new()).unwrap();

        let instrument = find_item(&report.items, ReportItemKind::Instrument, None);
        assert_eq!(instrument.name, "ACME");
        assert_eq!(instrument.position_size, dec!(5));
        assert_eq!(instrument.market_value, dec!(10));
        assert_eq!(instrument.pl.full.all.total, dec!(5));
        assert_eq!(instrument.total_real, dec!(7.5));
        assert_eq!(instrument.cost, dec!(-12.5));
        assert_eq!(instrument.total_unreal, dec!(-2.5));
        assert_eq!(instrument.total_real + instrument.total_unreal, instrument.pl.full.all.total);

        let cash = find_item(&report.items, ReportItemKind::Currency, Some("USD"));
        assert_eq!(cash.position_size, dec!(-5));
        assert_eq!(cash.market_value, dec!(-5));

        assert_eq!(report.summary.market_value, dec!(5));
        assert_eq!(report.summary.total, dec!(5));
        assert!(report.mismatch_items.is_empty());
    }

    #[test]
    fn test_report_is_deterministic() {
        let builder = MockLedger::new().with_transactions(scenario_trades()).builder();
        let cancel = CancellationToken::new();

        let first = builder.build_report(&spec(), &cancel).unwrap();
        let second = builder.build_report(&spec(), &cancel).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_zero_report_rate_yields_zero_totals() {
        let builder = MockLedger::new().with_transactions(scenario_trades()).builder();
        let spec = ReportSpec::new(d(2024, 1, 10), "EUR", POLICY);

        let report = builder.build_report(&spec, &CancellationToken::new()).unwrap();

        assert!(!report.items.is_empty());
        assert_eq!(report.summary.total, Decimal::ZERO);
        assert_eq!(report.summary.market_value, Decimal::ZERO);
        for item in &report.items {
            assert_eq!(item.market_value, Decimal::ZERO);
            assert_eq!(item.market_value_loc, Decimal::ZERO);
        }
    }

    #[test]
    fn test_excludes_canceled_and_future_rows() {
        let mut transactions = scenario_trades();
        transactions[1].is_canceled = true;
        transactions.push(trade(
            "t4",
            4,
            TransactionClass::Buy,
            d(2024, 2, 1),
            dec!(100),
            dec!(-200),
        ));
        let builder = MockLedger::new().with_transactions(transactions).builder();

        let report = builder.build_report(&spec(), &CancellationToken::new()).unwrap();

        let instrument = find_item(&report.items, ReportItemKind::Instrument, None);
        assert_eq!(instrument.position_size, Decimal::ZERO);
    }

    #[test]
    fn test_cash_pending_trade_books_cash_on_interim_account() {
        let mut buy = trade("t1", 1, TransactionClass::Buy, d(2024, 1, 5), dec!(5), dec!(-10));
        buy.cash_date = d(2024, 1, 15);
        let builder = MockLedger::new().with_transactions(vec![buy]).builder();
        let mut spec = spec();
        spec.slice_by_account = true;

        let report = builder.build_report(&spec, &CancellationToken::new()).unwrap();

        let cash = find_item(&report.items, ReportItemKind::Currency, Some("USD"));
        assert_eq!(cash.account.as_deref(), Some("acc-interim"));
        assert_eq!(cash.position_size, dec!(-10));
        let instrument = find_item(&report.items, ReportItemKind::Instrument, None);
        assert_eq!(instrument.position_size, dec!(5));
    }

    #[test]
    fn test_fx_trade_books_both_currencies() {
        let mut fx = trade("fx", 1, TransactionClass::FxTrade, d(2024, 1, 5), dec!(100), dec!(-110));
        fx.instrument = None;
        fx.transaction_currency = Some("EUR".to_string());
        let builder = MockLedger::new()
            .with_fx("EUR", d(2024, 1, 1), dec!(1.1))
            .with_transactions(vec![fx])
            .builder();

        let report = builder.build_report(&spec(), &CancellationToken::new()).unwrap();

        let eur = find_item(&report.items, ReportItemKind::Currency, Some("EUR"));
        assert_eq!(eur.position_size, dec!(100));
        assert_eq!(eur.market_value, dec!(110.0));
        let usd = find_item(&report.items, ReportItemKind::Currency, Some("USD"));
        assert_eq!(usd.position_size, dec!(-110));
        assert_eq!(report.summary.market_value, Decimal::ZERO);
    }

    #[test]
    fn test_mismatch_item_for_linked_instrument() {
        let mut coupon = trade("c1", 1, TransactionClass::CashInflow, d(2024, 1, 5), dec!(0), dec!(0));
        coupon.instrument = None;
        coupon.cash_consideration = dec!(12);
        coupon.principal_with_sign = dec!(10);
        coupon.linked_instrument = Some("inst-1".to_string());
        let mut pl = coupon.clone();
        pl.id = "c2".to_string();
        pl.transaction_code = 2;
        pl.transaction_class = TransactionClass::TransactionPl;
        let builder = MockLedger::new().with_transactions(vec![coupon, pl]).builder();

        let report = builder.build_report(&spec(), &CancellationToken::new()).unwrap();

        assert_eq!(report.mismatch_items.len(), 1);
        let mismatch = &report.mismatch_items[0];
        assert_eq!(mismatch.kind, ReportItemKind::Mismatch);
        assert_eq!(mismatch.instrument.as_deref(), Some("inst-1"));
        assert_eq!(mismatch.mismatch, dec!(2));
        assert_eq!(mismatch.mismatch_portfolio.as_deref(), Some("pf-1"));
    }

    #[test]
    fn test_custom_columns_evaluate_per_item() {
        let builder = MockLedger::new().with_transactions(scenario_trades()).builder();
        let spec = spec()
            .with_custom_column("double_mv", "item.marketValue * 2")
            .with_custom_column("broken", "item.marketValue +");

        let report = builder.build_report(&spec, &CancellationToken::new()).unwrap();

        let instrument = find_item(&report.items, ReportItemKind::Instrument, None);
        assert_eq!(instrument.custom_fields["double_mv"].as_f64(), Some(20.0));
        assert_eq!(
            instrument.custom_fields["broken"],
            serde_json::Value::String(INVALID_EXPRESSION_VALUE.to_string())
        );
    }

    #[test]
    fn test_cancelled_build_returns_error() {
        let builder = MockLedger::new().with_transactions(scenario_trades()).builder();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = builder.build_report(&spec(), &cancel);

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}

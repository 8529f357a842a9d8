#[cfg(test)]
mod tests {
    use crate::errors::Error;
    use crate::expressions::{
        evaluate, parse, validate, EntityRef, EvaluationContext, Evaluator, Expr, ExpressionError,
        Interval, Namespace, Value,
    };
    use crate::instruments::{FactorSchedule, Instrument};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn eval(source: &str) -> Value {
        evaluate(source, &Namespace::new()).unwrap()
    }

    fn eval_with(source: &str, names: &Namespace) -> Value {
        evaluate(source, names).unwrap()
    }

    fn reason(source: &str) -> ExpressionError {
        match evaluate(source, &Namespace::new()) {
            Err(Error::InvalidExpression { expression, reason }) => {
                assert_eq!(expression, source);
                reason
            }
            other => panic!("expected invalid expression, got {:?}", other),
        }
    }

    // --- Mock EvaluationContext ---
    struct MockContext {
        instruments: Vec<Instrument>,
    }

    impl EvaluationContext for MockContext {
        fn find_instrument(&self, reference: &EntityRef) -> Option<Instrument> {
            self.instruments
                .iter()
                .find(|i| i.id == reference.id || i.user_code == reference.user_code)
                .cloned()
        }

        fn entity_attribute(&self, entity: &EntityRef, name: &str) -> Option<Value> {
            let instrument = self.find_instrument(entity)?;
            match name {
                "maturity_date" => Some(Value::from(instrument.maturity_date)),
                _ => None,
            }
        }
    }

    // ==================== Arithmetic ====================

    #[test]
    fn test_operator_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(dec!(7)));
        assert_eq!(eval("(1 + 2) * 3"), Value::Number(dec!(9)));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Number(dec!(512)));
        assert_eq!(eval("-2 ** 2"), Value::Number(dec!(-4)));
        assert_eq!(eval("1 / 4"), Value::Number(dec!(0.25)));
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(eval("7 // 2"), Value::Number(dec!(3)));
        assert_eq!(eval("-7 // 2"), Value::Number(dec!(-4)));
        assert_eq!(eval("7 % -3"), Value::Number(dec!(-2)));
        assert_eq!(eval("-7 % 3"), Value::Number(dec!(2)));
    }

    #[test]
    fn test_division_by_zero_is_invalid_expression() {
        assert_eq!(reason("10 / 0"), ExpressionError::DivisionByZero);
        assert_eq!(reason("10 // 0"), ExpressionError::DivisionByZero);
        assert_eq!(reason("10 % 0"), ExpressionError::DivisionByZero);
    }

    #[test]
    fn test_exponent_limit() {
        assert!(matches!(reason("2 ** 20000"), ExpressionError::LimitExceeded(_)));
    }

    #[test]
    fn test_names_resolve_from_namespace() {
        let mut names = Namespace::new();
        names.insert("price".to_string(), Value::Number(dec!(10.5)));
        names.insert("quantity".to_string(), Value::from(4i64));

        assert_eq!(eval_with("price * quantity", &names), Value::Number(dec!(42)));
        assert_eq!(
            reason("missing + 1"),
            ExpressionError::NameNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_string_and_number_do_not_mix() {
        assert!(matches!(reason("'a' + 1"), ExpressionError::TypeMismatch { .. }));
        assert!(matches!(reason("'a' * 3"), ExpressionError::TypeMismatch { .. }));
        assert!(matches!(reason("'a' < 1"), ExpressionError::TypeMismatch { .. }));
        assert_eq!(eval("'ab' + 'cd'"), Value::from("abcd"));
    }

    // ==================== Dates ====================

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(eval("date(2020, 1, 31) + months(1)"), Value::Date(d(2020, 2, 29)));
        assert_eq!(eval("date(2020, 3, 1) - date(2020, 2, 1)"), Value::from(29i64));
        assert_eq!(eval("date(2020, 3, 1) - days(1)"), Value::Date(d(2020, 2, 29)));
        assert_eq!(eval("add_days('2020-12-30', 3)"), Value::Date(d(2021, 1, 2)));
        assert_eq!(eval("add_weeks(date(2020, 1, 1), 2)"), Value::Date(d(2020, 1, 15)));
        assert_eq!(eval("weeks(2) + days(1)"), Value::Interval(Interval::days(15)));
        assert_eq!(eval("days_diff('2020-01-01', '2020-03-01')"), Value::from(60i64));
    }

    #[test]
    fn test_date_helpers() {
        assert_eq!(eval("date(2021)"), Value::Date(d(2021, 1, 1)));
        assert_eq!(eval("isleap(2024)"), Value::Bool(true));
        assert_eq!(eval("isleap(date(2023, 5, 1))"), Value::Bool(false));
        assert_eq!(eval("get_quarter(date(2020, 5, 17))"), Value::from(2i64));
        assert_eq!(eval("get_year('2020-05-17')"), Value::from(2020i64));
        assert_eq!(eval("date(2020, 5, 17).month"), Value::from(5i64));
        assert_eq!(
            eval("last_business_day(date(2024, 6, 16))"),
            Value::Date(d(2024, 6, 14))
        );
        assert_eq!(
            eval("format_date(date(2020, 5, 17), '%d.%m.%Y')"),
            Value::from("17.05.2020")
        );
        assert_eq!(
            eval("parse_date('17/05/2020', '%d/%m/%Y')"),
            Value::Date(d(2020, 5, 17))
        );
        assert_eq!(
            eval("parse_date('2020.05.17', ['%d/%m/%Y', '%Y.%m.%d'])"),
            Value::Date(d(2020, 5, 17))
        );
        assert_eq!(eval("parse_date('')"), Value::Null);
    }

    #[test]
    fn test_invalid_date_is_argument_error() {
        assert!(matches!(
            reason("date(2021, 2, 30)"),
            ExpressionError::ArgumentError { .. }
        ));
        assert!(matches!(
            reason("format_date(date(2021, 1, 1), '%Q')"),
            ExpressionError::ArgumentError { .. }
        ));
    }

    // ==================== Logic ====================

    #[test]
    fn test_boolean_short_circuit() {
        assert_eq!(eval("False and undefined_name"), Value::Bool(false));
        assert_eq!(eval("True or undefined_name"), Value::Bool(true));
        assert_eq!(eval("0 or 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("not ''"), Value::Bool(true));
    }

    #[test]
    fn test_chained_comparisons_and_membership() {
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2"), Value::Bool(false));
        assert_eq!(eval("'USD' in ['EUR', 'USD']"), Value::Bool(true));
        assert_eq!(eval("'x' not in 'abc'"), Value::Bool(true));
        assert_eq!(eval("True == 1"), Value::Bool(true));
        assert_eq!(eval("None == None"), Value::Bool(true));
    }

    #[test]
    fn test_conditional_expression() {
        let mut names = Namespace::new();
        names.insert("side".to_string(), Value::from("buy"));
        assert_eq!(
            eval_with("1 if side == 'buy' else -1", &names),
            Value::from(1i64)
        );
        assert_eq!(eval("iff(1 > 2, 'yes', 'no')"), Value::from("no"));
    }

    // ==================== Access ====================

    #[test]
    fn test_attribute_and_subscript_access() {
        let mut item = BTreeMap::new();
        item.insert("market_value".to_string(), Value::Number(dec!(1500)));
        let mut names = Namespace::new();
        names.insert("item".to_string(), Value::Map(item));
        names.insert(
            "rows".to_string(),
            Value::List(vec![Value::from("a"), Value::from("b"), Value::from("c")]),
        );

        assert_eq!(
            eval_with("item.market_value / 3", &names),
            Value::Number(dec!(500))
        );
        assert_eq!(eval_with("item['market_value']", &names), Value::Number(dec!(1500)));
        assert_eq!(eval_with("rows[-1]", &names), Value::from("c"));
        assert!(evaluate("rows[5]", &names).is_err());
    }

    #[test]
    fn test_entity_attributes_use_context() {
        let instrument = Instrument {
            id: "ins-1".to_string(),
            user_code: "BOND".to_string(),
            maturity_date: Some(d(2030, 6, 1)),
            ..Default::default()
        };
        let context = MockContext {
            instruments: vec![instrument],
        };
        let mut names = Namespace::new();
        names.insert(
            "instrument".to_string(),
            Value::Entity(EntityRef::new("instrument", "ins-1", "BOND")),
        );

        let evaluator = Evaluator::new(&names).with_context(&context);
        assert_eq!(
            evaluator.evaluate("instrument.user_code").unwrap(),
            Value::from("BOND")
        );
        assert_eq!(
            evaluator.evaluate("instrument.maturity_date").unwrap(),
            Value::Date(d(2030, 6, 1))
        );
        assert_eq!(
            evaluator.evaluate("instrument == 'BOND'").unwrap(),
            Value::Bool(true)
        );
    }

    // ==================== Builtins ====================

    #[test]
    fn test_string_builtins() {
        assert_eq!(eval("upper('abc')"), Value::from("ABC"));
        assert_eq!(eval("str(1.50)"), Value::from("1.5"));
        assert_eq!(eval("contains('portfolio', 'folio')"), Value::Bool(true));
        assert_eq!(eval("replace('a-b-c', '-', '/')"), Value::from("a/b/c"));
        assert_eq!(eval("join(split('a,b,c', ','), '-')"), Value::from("a-b-c"));
        assert_eq!(eval("strip('  x ')"), Value::from("x"));
        assert_eq!(eval("reverse('abc')"), Value::from("cba"));
        assert_eq!(eval("substr('abcdef', 1, 3)"), Value::from("bc"));
        assert_eq!(eval("substr('abcdef', -2, None)"), Value::from("ef"));
        assert_eq!(eval("len('abcdef')"), Value::from(6i64));
        assert_eq!(eval("if_null('', 'default')"), Value::from("default"));
    }

    #[test]
    fn test_regex_builtins() {
        assert_eq!(
            eval(r"reg_search('ISIN US0378331005', '[A-Z]{2}[0-9]{10}')"),
            Value::from("US0378331005")
        );
        assert_eq!(eval("reg_search('abc', '[0-9]+')"), Value::Null);
        assert_eq!(
            eval(r"reg_replace('2020-01-31', '(\d+)-(\d+)-(\d+)', '\3/\2/\1')"),
            Value::from("31/01/2020")
        );
    }

    #[test]
    fn test_numeric_builtins() {
        assert_eq!(eval("round(3.14159, 2)"), Value::Number(dec!(3.14)));
        assert_eq!(eval("round(2.5)"), Value::Number(dec!(2)));
        assert_eq!(eval("int('42.7')"), Value::Number(dec!(42)));
        assert_eq!(eval("abs(-3)"), Value::Number(dec!(3)));
        assert_eq!(eval("min(3, 1, 2)"), Value::Number(dec!(1)));
        assert_eq!(eval("max([1, 5, 2])"), Value::Number(dec!(5)));
        assert_eq!(eval("isclose(0.1 + 0.2, 0.3)"), Value::Bool(true));
        assert_eq!(eval("float('1e3')"), Value::Number(dec!(1000)));
    }

    #[test]
    fn test_simple_price_interpolates_linearly() {
        assert_eq!(
            eval("simple_price(date(2020, 1, 11), date(2020, 1, 1), 100, date(2020, 1, 21), 110)"),
            Value::Number(dec!(105))
        );
        assert_eq!(
            eval("simple_price(date(2020, 2, 1), date(2020, 1, 1), 100, date(2020, 1, 21), 110)"),
            Value::Number(dec!(0))
        );
        assert_eq!(
            eval("simple_price('2020-01-01', '2020-01-01', 100, '2020-01-01', 110)"),
            Value::Number(dec!(100))
        );
    }

    #[test]
    fn test_find_row_returns_first_match() {
        let row = |code: &str, value: i64| {
            let mut map = BTreeMap::new();
            map.insert("code".to_string(), Value::from(code));
            map.insert("value".to_string(), Value::from(value));
            Value::Map(map)
        };
        let mut names = Namespace::new();
        names.insert(
            "rows".to_string(),
            Value::List(vec![row("A", 1), row("B", 2), row("B", 3)]),
        );

        assert_eq!(
            eval_with("find_row(rows, 'code', 'B').value", &names),
            Value::from(2i64)
        );
        assert_eq!(
            eval_with("find_row(rows, key='code', value='Z')", &names),
            Value::Null
        );
    }

    #[test]
    fn test_instrument_helpers_require_context() {
        let instrument = Instrument {
            id: "ins-1".to_string(),
            user_code: "ABS".to_string(),
            factor_schedules: vec![FactorSchedule {
                id: "f-1".to_string(),
                effective_date: d(2020, 1, 1),
                factor_value: 0.5,
            }],
            ..Default::default()
        };
        let context = MockContext {
            instruments: vec![instrument],
        };
        let names = Namespace::new();
        let evaluator = Evaluator::new(&names).with_context(&context);

        assert_eq!(
            evaluator
                .evaluate("get_instrument_factor('ABS', date(2021, 1, 1))")
                .unwrap(),
            Value::from(0.5)
        );
        assert_eq!(
            evaluator
                .evaluate("get_instrument_factor(None, date(2021, 1, 1))")
                .unwrap(),
            Value::from(0.0)
        );
        assert_eq!(
            reason("get_instrument_factor('ABS', date(2021, 1, 1))"),
            ExpressionError::UnknownFunction("get_instrument_factor".to_string())
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            reason("eval('1')"),
            ExpressionError::UnknownFunction("eval".to_string())
        );
    }

    // ==================== Parser ====================

    #[test]
    fn test_parse_errors_carry_position() {
        assert!(matches!(reason("1 +"), ExpressionError::Parse { .. }));
        assert!(matches!(reason("'open"), ExpressionError::Parse { position: 0, .. }));
        assert!(matches!(reason("1 2"), ExpressionError::Parse { position: 2, .. }));
        assert!(validate("").is_err());
        assert!(validate("a.b(1)").is_ok());
    }

    #[test]
    fn test_parse_call_with_keyword_arguments() {
        let expr = parse("round(x, ndigits=2)").unwrap();
        match expr {
            Expr::Call {
                function,
                args,
                kwargs,
            } => {
                assert_eq!(function, "round");
                assert_eq!(args.len(), 1);
                assert_eq!(kwargs[0].0, "ndigits");
            }
            other => panic!("expected call, got {:?}", other),
        }
        assert!(parse("f(a=1, 2)").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(matches!(reason(&source), ExpressionError::LimitExceeded(_)));
    }
}

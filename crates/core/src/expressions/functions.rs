//! Built-in functions callable from expressions.

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, NaiveDate};
use log::warn;
use num_traits::ToPrimitive;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

use super::evaluator::{compare_values, shift_date, values_equal, EvaluationContext};
use super::expressions_errors::ExpressionError;
use super::value::{EntityRef, Interval, Value};
use crate::constants::MAX_EXPRESSION_LIST_LEN;
use crate::utils::decimal_utils::to_f64;
use crate::utils::time_utils::{add_workdays, is_leap, last_business_day};

type FnResult = std::result::Result<Value, ExpressionError>;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Evaluated call arguments.
pub struct Arguments {
    function: String,
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Arguments {
    pub fn new(function: &str, positional: Vec<Value>, named: BTreeMap<String, Value>) -> Self {
        Arguments {
            function: function.to_string(),
            positional,
            named,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::argument(&self.function, message)
    }

    fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.positional.get(index).or_else(|| self.named.get(name))
    }

    fn required(&self, index: usize, name: &str) -> std::result::Result<&Value, ExpressionError> {
        self.get(index, name)
            .ok_or_else(|| self.error(format!("missing argument '{}'", name)))
    }

    fn number(&self, index: usize, name: &str) -> std::result::Result<Decimal, ExpressionError> {
        let value = self.required(index, name)?;
        to_number(value).ok_or_else(|| self.error(format!("'{}' must be a number", name)))
    }

    fn integer(&self, index: usize, name: &str) -> std::result::Result<i64, ExpressionError> {
        self.number(index, name)?
            .trunc()
            .to_i64()
            .ok_or_else(|| self.error(format!("'{}' is out of range", name)))
    }

    fn text(&self, index: usize, name: &str) -> std::result::Result<String, ExpressionError> {
        Ok(self.required(index, name)?.to_string())
    }

    fn date(&self, index: usize, name: &str) -> std::result::Result<NaiveDate, ExpressionError> {
        let value = self.required(index, name)?;
        to_date(value).ok_or_else(|| self.error(format!("'{}' must be a date", name)))
    }

    fn optional_date(&self, index: usize, name: &str) -> std::result::Result<Option<NaiveDate>, ExpressionError> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => to_date(value)
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a date", name))),
        }
    }

    fn interval(&self, index: usize, name: &str, unit_days: i64) -> std::result::Result<Interval, ExpressionError> {
        match self.required(index, name)? {
            Value::Interval(i) => Ok(*i),
            _ => Ok(Interval::days(self.integer(index, name)? * unit_days)),
        }
    }
}

fn to_number(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        other => other.as_decimal(),
    }
}

fn to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), DEFAULT_DATE_FORMAT).ok(),
        _ => None,
    }
}

/// Validates a strftime pattern before formatting; chrono panics on bad ones.
fn checked_format(date: NaiveDate, pattern: &str) -> Option<String> {
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

fn date_value(year: i64, month: i64, day: i64) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.to_i32()?, month.to_u32()?, day.to_u32()?)
}

/// Slice bounds over a sequence of `len` items; negative indices count from the end.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let clamp = |i: i64| -> i64 {
        if i < 0 {
            (len + i).max(0)
        } else {
            i.min(len)
        }
    };
    let s = start.map(clamp).unwrap_or(0);
    let e = end.map(clamp).unwrap_or(len);
    if s >= e {
        (0, 0)
    } else {
        (s as usize, e as usize)
    }
}

/// Converts `\1` style group references into the `${1}` form.
fn replacement_template(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(d) = chars.peek().copied().filter(|d| d.is_ascii_digit()) {
                chars.next();
                out.push_str(&format!("${{{}}}", d));
                continue;
            }
        }
        if c == '$' {
            out.push_str("$$");
            continue;
        }
        out.push(c);
    }
    out
}

fn instrument_helper(
    args: &Arguments,
    context: Option<&dyn EvaluationContext>,
    compute: impl Fn(&crate::instruments::Instrument, NaiveDate) -> f64,
) -> FnResult {
    let context = context.ok_or_else(|| ExpressionError::UnknownFunction(args.function.clone()))?;
    let reference = match args.get(0, "instrument") {
        None | Some(Value::Null) => return Ok(Value::from(0.0)),
        Some(Value::Entity(e)) => e.clone(),
        Some(Value::String(code)) => EntityRef::new("instrument", code.clone(), code.clone()),
        Some(other) => return Err(args.error(format!("cannot resolve instrument from {}", other.type_name()))),
    };
    let date = match args.optional_date(1, "date")? {
        Some(d) => d,
        None => return Ok(Value::from(0.0)),
    };
    match context.find_instrument(&reference) {
        Some(instrument) => Ok(Value::from(compute(&instrument, date))),
        None => {
            warn!("{}: instrument {} not found", args.function, reference.user_code);
            Ok(Value::from(0.0))
        }
    }
}

/// Dispatches a call to a builtin by name.
pub fn call_builtin(name: &str, args: Arguments, context: Option<&dyn EvaluationContext>) -> FnResult {
    match name {
        "str" => Ok(Value::String(args.text(0, "a")?)),
        "upper" => Ok(Value::String(args.text(0, "a")?.to_uppercase())),
        "lower" => Ok(Value::String(args.text(0, "a")?.to_lowercase())),
        "contains" => Ok(Value::Bool(args.text(0, "a")?.contains(&args.text(1, "b")?))),
        "replace" => {
            let text = args.text(0, "text")?;
            Ok(Value::String(text.replace(
                &args.text(1, "oldvalue")?,
                &args.text(2, "newvalue")?,
            )))
        }
        "int" | "trunc" => Ok(Value::Number(args.number(0, "a")?.trunc())),
        "float" => Ok(Value::Number(args.number(0, "a")?)),
        "bool" => Ok(Value::Bool(args.required(0, "a")?.is_truthy())),
        "round" => {
            let value = args.number(0, "a")?;
            let digits = match args.get(1, "ndigits") {
                None | Some(Value::Null) => 0,
                Some(_) => args.integer(1, "ndigits")?,
            };
            let rounded = if digits >= 0 {
                value.round_dp(digits.min(28) as u32)
            } else {
                let scale = Decimal::from(10i64.pow((-digits).min(18) as u32));
                (value / scale).round_dp(0) * scale
            };
            Ok(Value::Number(rounded))
        }
        "abs" => Ok(Value::Number(args.number(0, "a")?.abs())),
        "min" | "max" => {
            let candidates: Vec<Value> = match (args.positional.len(), args.positional.first()) {
                (1, Some(Value::List(items))) => items.clone(),
                _ => args.positional.clone(),
            };
            let mut best: Option<Value> = None;
            for candidate in candidates {
                best = Some(match best {
                    None => candidate,
                    Some(current) => {
                        let ordering = compare_values(&candidate, &current)?;
                        let replace = if name == "min" {
                            ordering.is_lt()
                        } else {
                            ordering.is_gt()
                        };
                        if replace {
                            candidate
                        } else {
                            current
                        }
                    }
                });
            }
            best.ok_or_else(|| args.error("expected at least one value"))
        }
        "isclose" => {
            let a = to_f64(args.number(0, "a")?);
            let b = to_f64(args.number(1, "b")?);
            let rel_tol = match args.get(2, "rel_tol") {
                Some(_) => to_f64(args.number(2, "rel_tol")?),
                None => 1e-9,
            };
            let abs_tol = match args.get(3, "abs_tol") {
                Some(_) => to_f64(args.number(3, "abs_tol")?),
                None => 0.0,
            };
            let close = (a - b).abs() <= (rel_tol * a.abs().max(b.abs())).max(abs_tol);
            Ok(Value::Bool(close))
        }
        "iff" => {
            let test = args.required(0, "test")?.is_truthy();
            let chosen = if test {
                args.required(1, "a")?
            } else {
                args.required(2, "b")?
            };
            Ok(chosen.clone())
        }
        "len" => match args.required(0, "a")? {
            Value::String(s) => Ok(Value::from(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::from(items.len() as i64)),
            Value::Map(map) => Ok(Value::from(map.len() as i64)),
            other => Err(args.error(format!("object of type {} has no len()", other.type_name()))),
        },
        "date" => {
            let year = args.integer(0, "year")?;
            let month = match args.get(1, "month") {
                Some(_) => args.integer(1, "month")?,
                None => 1,
            };
            let day = match args.get(2, "day") {
                Some(_) => args.integer(2, "day")?,
                None => 1,
            };
            date_value(year, month, day)
                .map(Value::Date)
                .ok_or_else(|| args.error(format!("invalid date {}-{}-{}", year, month, day)))
        }
        "date_min" => Ok(Value::Date(NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN))),
        "date_max" => Ok(Value::Date(
            NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
        )),
        "isleap" => {
            let year = match args.required(0, "date_or_year")? {
                Value::Date(d) => d.year(),
                _ => args.integer(0, "date_or_year")? as i32,
            };
            Ok(Value::Bool(is_leap(year)))
        }
        "days" => Ok(Value::Interval(Interval::days(args.integer(0, "days")?))),
        "weeks" => Ok(Value::Interval(Interval::days(args.integer(0, "weeks")? * 7))),
        "months" => Ok(Value::Interval(Interval::months(args.integer(0, "months")?))),
        "add_days" => {
            let date = args.date(0, "date")?;
            Ok(Value::Date(shift_date(date, args.interval(1, "days", 1)?)?))
        }
        "add_weeks" => {
            let date = args.date(0, "date")?;
            Ok(Value::Date(shift_date(date, args.interval(1, "weeks", 7)?)?))
        }
        "add_workdays" => {
            let date = args.date(0, "date")?;
            let workdays = args.integer(1, "workdays")?;
            add_workdays(date, workdays)
                .map(Value::Date)
                .ok_or_else(|| args.error("date out of range"))
        }
        "days_diff" => {
            let d1 = args.date(0, "date_1")?;
            let d2 = args.date(1, "date_2")?;
            Ok(Value::from((d2 - d1).num_days()))
        }
        "format_date" => {
            let date = args.date(0, "date")?;
            let pattern = match args.get(1, "format_") {
                None | Some(Value::Null) => DEFAULT_DATE_FORMAT.to_string(),
                Some(v) => v.to_string(),
            };
            checked_format(date, &pattern)
                .map(Value::String)
                .ok_or_else(|| args.error(format!("invalid date format '{}'", pattern)))
        }
        "parse_date" => {
            let source = match args.required(0, "date_string")? {
                Value::Date(d) => return Ok(Value::Date(*d)),
                Value::Null => return Ok(Value::Null),
                v => v.to_string(),
            };
            if source.is_empty() {
                return Ok(Value::Null);
            }
            let formats: Vec<String> = match args.get(1, "format") {
                None | Some(Value::Null) => vec![DEFAULT_DATE_FORMAT.to_string()],
                Some(Value::List(items)) => items.iter().map(|v| v.to_string()).collect(),
                Some(v) => vec![v.to_string()],
            };
            formats
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(source.trim(), f).ok())
                .map(Value::Date)
                .ok_or_else(|| args.error(format!("cannot parse '{}' as a date", source)))
        }
        "get_year" => Ok(Value::from(args.date(0, "date")?.year() as i64)),
        "get_month" => Ok(Value::from(args.date(0, "date")?.month() as i64)),
        "get_quarter" => Ok(Value::from(((args.date(0, "date")?.month() - 1) / 3 + 1) as i64)),
        "last_business_day" => Ok(Value::Date(last_business_day(args.date(0, "date")?))),
        "join" => {
            let separator = args.text(1, "separator")?;
            match args.required(0, "data")? {
                Value::List(items) => Ok(Value::String(
                    items
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(&separator),
                )),
                other => Err(args.error(format!("cannot join {}", other.type_name()))),
            }
        }
        "strip" => Ok(Value::String(args.text(0, "data")?.trim().to_string())),
        "split" => {
            let text = args.text(0, "text")?;
            let delimiter = args.text(1, "delimeter")?;
            if delimiter.is_empty() {
                return Err(args.error("empty separator"));
            }
            let parts: Vec<Value> = text.split(delimiter.as_str()).map(Value::from).collect();
            if parts.len() > MAX_EXPRESSION_LIST_LEN {
                return Err(ExpressionError::LimitExceeded("list too long".to_string()));
            }
            Ok(Value::List(parts))
        }
        "reverse" => match args.required(0, "items")? {
            Value::String(s) => Ok(Value::String(s.chars().rev().collect())),
            Value::List(items) => Ok(Value::List(items.iter().rev().cloned().collect())),
            other => Err(args.error(format!("cannot reverse {}", other.type_name()))),
        },
        "substr" => {
            let text = args.text(0, "text")?;
            let start = match args.get(1, "start_index") {
                None | Some(Value::Null) => None,
                Some(_) => Some(args.integer(1, "start_index")?),
            };
            let end = match args.get(2, "end_index") {
                None | Some(Value::Null) => None,
                Some(_) => Some(args.integer(2, "end_index")?),
            };
            let chars: Vec<char> = text.chars().collect();
            let (s, e) = slice_bounds(chars.len(), start, end);
            Ok(Value::String(chars[s..e].iter().collect()))
        }
        "if_null" => {
            let input = args.required(0, "input")?;
            if input.is_truthy() {
                Ok(input.clone())
            } else {
                Ok(args.required(1, "default")?.clone())
            }
        }
        "reg_search" => {
            let text = args.text(0, "text")?;
            let pattern = args.text(1, "expression")?;
            let regex = Regex::new(&pattern).map_err(|e| args.error(e.to_string()))?;
            Ok(regex
                .find(&text)
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null))
        }
        "reg_replace" => {
            let text = args.text(0, "text")?;
            let pattern = args.text(1, "expession")?;
            let replacement = args.text(2, "replace_text")?;
            let regex = Regex::new(&pattern).map_err(|e| args.error(e.to_string()))?;
            Ok(Value::String(
                regex
                    .replace_all(&text, replacement_template(&replacement).as_str())
                    .into_owned(),
            ))
        }
        "simple_price" => {
            let date = args.date(0, "date")?;
            let date1 = args.date(1, "date1")?;
            let value1 = args.number(2, "value1")?;
            let date2 = args.date(3, "date2")?;
            let value2 = args.number(4, "value2")?;
            if date < date1 || date > date2 {
                return Ok(Value::Number(Decimal::ZERO));
            }
            if date1 == date2 {
                return Ok(Value::Number(value1));
            }
            let elapsed = Decimal::from((date - date1).num_days());
            let span = Decimal::from((date2 - date1).num_days());
            Ok(Value::Number(value1 + elapsed / span * (value2 - value1)))
        }
        "find_row" => {
            let rows = match args.required(0, "rows")? {
                Value::List(rows) => rows,
                other => return Err(args.error(format!("cannot search {}", other.type_name()))),
            };
            let key = args.text(1, "key")?;
            let wanted = args.required(2, "value")?;
            Ok(rows
                .iter()
                .find(|row| match row {
                    Value::Map(map) => map.get(&key).map(|v| values_equal(v, wanted)).unwrap_or(false),
                    _ => false,
                })
                .cloned()
                .unwrap_or(Value::Null))
        }
        "get_instrument_accrued_price" => {
            instrument_helper(&args, context, |instrument, date| instrument.accrued_price(date))
        }
        "get_instrument_factor" => {
            instrument_helper(&args, context, |instrument, date| instrument.factor_at(date))
        }
        "get_instrument_coupon" => {
            instrument_helper(&args, context, |instrument, date| instrument.coupon_at(date, false).0)
        }
        _ => Err(ExpressionError::UnknownFunction(name.to_string())),
    }
}

//! Tree-walking evaluator over a bound name-space.

use chrono::NaiveDate;
use log::debug;
use rust_decimal::{Decimal, MathematicalOps};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::expressions_errors::ExpressionError;
use super::functions::{call_builtin, Arguments};
use super::parser::{parse, BinaryOp, CompareOp, Expr, UnaryOp};
use super::value::{EntityRef, Interval, Value};
use crate::constants::{MAX_EXPRESSION_EXPONENT, MAX_EXPRESSION_LIST_LEN, MAX_EXPRESSION_STRING_LEN};
use crate::errors::{Error, Result};
use crate::instruments::Instrument;
use crate::utils::time_utils::{add_days, add_months};

/// Names visible to an expression.
pub type Namespace = BTreeMap<String, Value>;

/// Host services for builtins that need persisted data.
pub trait EvaluationContext: Send + Sync {
    /// Resolves an instrument by entity reference (id first, then user code).
    fn find_instrument(&self, reference: &EntityRef) -> Option<Instrument>;

    /// Extra attributes of an entity beyond `id`, `user_code` and `kind`.
    fn entity_attribute(&self, _entity: &EntityRef, _name: &str) -> Option<Value> {
        None
    }
}

pub struct Evaluator<'a> {
    names: &'a Namespace,
    context: Option<&'a dyn EvaluationContext>,
}

impl<'a> Evaluator<'a> {
    pub fn new(names: &'a Namespace) -> Self {
        Evaluator {
            names,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &'a dyn EvaluationContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn context(&self) -> Option<&'a dyn EvaluationContext> {
        self.context
    }

    /// Parses and evaluates `source`, wrapping failures as `InvalidExpression`.
    pub fn evaluate(&self, source: &str) -> Result<Value> {
        let expr = parse(source).map_err(|e| Error::invalid_expression(source, e))?;
        self.eval(&expr).map_err(|e| {
            debug!("Expression '{}' failed: {}", source, e);
            Error::invalid_expression(source, e)
        })
    }

    pub fn eval(&self, expr: &Expr) -> std::result::Result<Value, ExpressionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .names
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::NameNotFound(name.clone())),
            Expr::List(items) => {
                if items.len() > MAX_EXPRESSION_LIST_LEN {
                    return Err(ExpressionError::LimitExceeded("list literal too long".to_string()));
                }
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Attribute { target, name } => {
                let target = self.eval(target)?;
                self.attribute(&target, name)
            }
            Expr::Subscript { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                subscript(&target, &index)
            }
            Expr::Call {
                function,
                args,
                kwargs,
            } => {
                let positional = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let mut named = BTreeMap::new();
                for (name, arg) in kwargs {
                    named.insert(name.clone(), self.eval(arg)?);
                }
                call_builtin(
                    function,
                    Arguments::new(function, positional, named),
                    self.context,
                )
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary(*op, value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::Compare { left, rest } => {
                let mut current = self.eval(left)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &current, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    current = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn attribute(&self, target: &Value, name: &str) -> std::result::Result<Value, ExpressionError> {
        match target {
            Value::Map(map) => map
                .get(name)
                .cloned()
                .ok_or_else(|| ExpressionError::NameNotFound(name.to_string())),
            Value::Entity(entity) => match name {
                "id" => Ok(Value::String(entity.id.clone())),
                "user_code" => Ok(Value::String(entity.user_code.clone())),
                "kind" => Ok(Value::String(entity.kind.clone())),
                _ => self
                    .context
                    .and_then(|ctx| ctx.entity_attribute(entity, name))
                    .ok_or_else(|| ExpressionError::NameNotFound(format!("{}.{}", entity.kind, name))),
            },
            Value::Date(date) => date_attribute(*date, name),
            other => Err(ExpressionError::type_mismatch(
                &format!(".{}", name),
                other.type_name(),
                "attribute",
            )),
        }
    }
}

/// Convenience: evaluates `source` against `names` without a context.
pub fn evaluate(source: &str, names: &Namespace) -> Result<Value> {
    Evaluator::new(names).evaluate(source)
}

/// Checks that `source` parses.
pub fn validate(source: &str) -> Result<()> {
    parse(source)
        .map(|_| ())
        .map_err(|e| Error::invalid_expression(source, e))
}

fn date_attribute(date: NaiveDate, name: &str) -> std::result::Result<Value, ExpressionError> {
    use chrono::Datelike;
    match name {
        "year" => Ok(Value::from(date.year() as i64)),
        "month" => Ok(Value::from(date.month() as i64)),
        "day" => Ok(Value::from(date.day() as i64)),
        _ => Err(ExpressionError::NameNotFound(format!("date.{}", name))),
    }
}

fn subscript(target: &Value, index: &Value) -> std::result::Result<Value, ExpressionError> {
    match (target, index) {
        (Value::List(items), Value::Number(n)) => {
            let i = resolve_index(*n, items.len())?;
            Ok(items[i].clone())
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(*n, chars.len())?;
            Ok(Value::String(chars[i].to_string()))
        }
        (Value::Map(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| ExpressionError::NameNotFound(key.clone())),
        (t, i) => Err(ExpressionError::type_mismatch("[]", t.type_name(), i.type_name())),
    }
}

fn resolve_index(n: Decimal, len: usize) -> std::result::Result<usize, ExpressionError> {
    use num_traits::ToPrimitive;
    let raw = n
        .trunc()
        .to_i64()
        .ok_or_else(|| ExpressionError::argument("[]", "index out of range"))?;
    let resolved = if raw < 0 { len as i64 + raw } else { raw };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ExpressionError::argument("[]", "index out of range"));
    }
    Ok(resolved as usize)
}

fn unary(op: UnaryOp, value: Value) -> std::result::Result<Value, ExpressionError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Neg, Value::Interval(i)) => Ok(Value::Interval(i.negate())),
        (UnaryOp::Pos, v @ Value::Number(_)) => Ok(v),
        (UnaryOp::Pos, v @ Value::Interval(_)) => Ok(v),
        (UnaryOp::Neg, v) => Err(ExpressionError::type_mismatch("unary -", v.type_name(), "")),
        (UnaryOp::Pos, v) => Err(ExpressionError::type_mismatch("unary +", v.type_name(), "")),
    }
}

pub(crate) fn shift_date(date: NaiveDate, interval: Interval) -> std::result::Result<NaiveDate, ExpressionError> {
    add_months(date, interval.months)
        .and_then(|d| add_days(d, interval.days))
        .ok_or_else(|| ExpressionError::argument("date arithmetic", "date out of range"))
}

fn binary(op: BinaryOp, left: Value, right: Value) -> std::result::Result<Value, ExpressionError> {
    let mismatch = |l: &Value, r: &Value| ExpressionError::type_mismatch(op.symbol(), l.type_name(), r.type_name());

    match op {
        BinaryOp::Add => match (&left, &right) {
            (Value::String(a), Value::String(b)) => {
                if a.len() + b.len() > MAX_EXPRESSION_STRING_LEN {
                    return Err(ExpressionError::LimitExceeded("string too long".to_string()));
                }
                Ok(Value::String(format!("{}{}", a, b)))
            }
            (Value::Date(d), Value::Interval(i)) | (Value::Interval(i), Value::Date(d)) => {
                Ok(Value::Date(shift_date(*d, *i)?))
            }
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval {
                months: a.months + b.months,
                days: a.days + b.days,
            })),
            (Value::List(a), Value::List(b)) => {
                if a.len() + b.len() > MAX_EXPRESSION_LIST_LEN {
                    return Err(ExpressionError::LimitExceeded("list too long".to_string()));
                }
                Ok(Value::List(a.iter().chain(b.iter()).cloned().collect()))
            }
            _ => numeric(&left, &right, op, |a, b| a.checked_add(b)),
        },
        BinaryOp::Sub => match (&left, &right) {
            (Value::Date(a), Value::Date(b)) => Ok(Value::from((*a - *b).num_days())),
            (Value::Date(d), Value::Interval(i)) => Ok(Value::Date(shift_date(*d, i.negate())?)),
            (Value::Interval(a), Value::Interval(b)) => Ok(Value::Interval(Interval {
                months: a.months - b.months,
                days: a.days - b.days,
            })),
            _ => numeric(&left, &right, op, |a, b| a.checked_sub(b)),
        },
        BinaryOp::Mul => match (&left, &right) {
            (Value::Interval(i), Value::Number(n)) | (Value::Number(n), Value::Interval(i)) => {
                use num_traits::ToPrimitive;
                let k = n
                    .trunc()
                    .to_i64()
                    .ok_or_else(|| ExpressionError::argument("*", "factor out of range"))?;
                Ok(Value::Interval(Interval {
                    months: i.months * k,
                    days: i.days * k,
                }))
            }
            _ => numeric(&left, &right, op, |a, b| a.checked_mul(b)),
        },
        BinaryOp::Div => {
            let (a, b) = numbers(&left, &right).ok_or_else(|| mismatch(&left, &right))?;
            if b.is_zero() {
                return Err(ExpressionError::DivisionByZero);
            }
            a.checked_div(b)
                .map(Value::Number)
                .ok_or_else(|| ExpressionError::LimitExceeded("numeric overflow".to_string()))
        }
        BinaryOp::FloorDiv => {
            let (a, b) = numbers(&left, &right).ok_or_else(|| mismatch(&left, &right))?;
            if b.is_zero() {
                return Err(ExpressionError::DivisionByZero);
            }
            a.checked_div(b)
                .map(|q| Value::Number(q.floor()))
                .ok_or_else(|| ExpressionError::LimitExceeded("numeric overflow".to_string()))
        }
        BinaryOp::Mod => {
            let (a, b) = numbers(&left, &right).ok_or_else(|| mismatch(&left, &right))?;
            if b.is_zero() {
                return Err(ExpressionError::DivisionByZero);
            }
            // result takes the sign of the divisor
            let mut r = a % b;
            if !r.is_zero() && (r.is_sign_negative() != b.is_sign_negative()) {
                r += b;
            }
            Ok(Value::Number(r))
        }
        BinaryOp::Pow => {
            let (a, b) = numbers(&left, &right).ok_or_else(|| mismatch(&left, &right))?;
            let limit = Decimal::from(MAX_EXPRESSION_EXPONENT);
            if a.abs() > limit || b.abs() > limit {
                return Err(ExpressionError::LimitExceeded(format!(
                    "max exponent is {}",
                    MAX_EXPRESSION_EXPONENT
                )));
            }
            if a.is_zero() && b.is_sign_negative() && !b.is_zero() {
                return Err(ExpressionError::DivisionByZero);
            }
            let result = if b.fract().is_zero() {
                use num_traits::ToPrimitive;
                b.to_i64().and_then(|exp| a.checked_powi(exp))
            } else {
                a.checked_powd(b)
            };
            result
                .map(Value::Number)
                .ok_or_else(|| ExpressionError::LimitExceeded("numeric overflow".to_string()))
        }
    }
}

fn numbers(left: &Value, right: &Value) -> Option<(Decimal, Decimal)> {
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => None,
        _ => Some((left.as_decimal()?, right.as_decimal()?)),
    }
}

fn numeric(
    left: &Value,
    right: &Value,
    op: BinaryOp,
    f: impl Fn(Decimal, Decimal) -> Option<Decimal>,
) -> std::result::Result<Value, ExpressionError> {
    let (a, b) = numbers(left, right).ok_or_else(|| {
        ExpressionError::type_mismatch(op.symbol(), left.type_name(), right.type_name())
    })?;
    f(a, b)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::LimitExceeded("numeric overflow".to_string()))
}

/// Loose equality: numbers and booleans compare numerically, entities match
/// strings by id or user code.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_) | Value::Bool(_), Value::Number(_) | Value::Bool(_)) => {
            left.as_decimal() == right.as_decimal()
        }
        (Value::Entity(e), Value::String(s)) | (Value::String(s), Value::Entity(e)) => {
            &e.id == s || &e.user_code == s
        }
        (Value::Entity(a), Value::Entity(b)) => a.kind == b.kind && a.id == b.id,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

/// Ordering between comparable values of the same type.
pub fn compare_values(left: &Value, right: &Value) -> std::result::Result<Ordering, ExpressionError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Ok(a.cmp(b)),
        (Value::Entity(a), Value::Entity(b)) => Ok(a.user_code.cmp(&b.user_code)),
        _ => match numbers(left, right) {
            Some((a, b)) => Ok(a.cmp(&b)),
            None => Err(ExpressionError::type_mismatch(
                "<",
                left.type_name(),
                right.type_name(),
            )),
        },
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> std::result::Result<bool, ExpressionError> {
    let result = match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Lt => compare_values(left, right)? == Ordering::Less,
        CompareOp::LtEq => compare_values(left, right)? != Ordering::Greater,
        CompareOp::Gt => compare_values(left, right)? == Ordering::Greater,
        CompareOp::GtEq => compare_values(left, right)? != Ordering::Less,
        CompareOp::In => contains(right, left, op)?,
        CompareOp::NotIn => !contains(right, left, op)?,
    };
    Ok(result)
}

fn contains(container: &Value, item: &Value, op: CompareOp) -> std::result::Result<bool, ExpressionError> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.iter().any(|v| values_equal(v, item))),
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Map(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(ExpressionError::type_mismatch(
            op.symbol(),
            item.type_name(),
            container.type_name(),
        )),
    }
}

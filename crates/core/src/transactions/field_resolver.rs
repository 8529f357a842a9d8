//! Resolution of action-row fields against the running values.

use chrono::NaiveDate;
use log::debug;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::str::FromStr;

use super::process_errors::{add_field_error, invalid_expression_message, FieldErrors};
use super::transaction_type_model::ActionField;
use super::transactions_traits::EntityRepositoryTrait;
use crate::errors::Result;
use crate::expressions::{EvaluationContext, Evaluator, Namespace, Value};
use crate::utils::decimal_utils::to_f64;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a loosely typed value as a decimal (numbers, booleans, numeric strings).
pub(crate) fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        other => other.as_decimal(),
    }
}

/// Parses a loosely typed value as a date (dates or ISO strings).
pub(crate) fn value_to_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok(),
        _ => None,
    }
}

/// Code of a value: entities yield their user code, everything else its text.
pub(crate) fn value_to_code(value: &Value) -> String {
    match value {
        Value::Entity(e) => e.user_code.clone(),
        other => other.to_string(),
    }
}

/// Evaluates action-row fields. Failures are recorded under the field name and
/// the field falls back to the caller's default.
pub struct FieldResolver<'a> {
    values: &'a Namespace,
    context: &'a dyn EvaluationContext,
    entities: &'a dyn EntityRepositoryTrait,
}

impl<'a> FieldResolver<'a> {
    pub fn new(
        values: &'a Namespace,
        context: &'a dyn EvaluationContext,
        entities: &'a dyn EntityRepositoryTrait,
    ) -> Self {
        FieldResolver {
            values,
            context,
            entities,
        }
    }

    /// Evaluates `source` with the instrument helpers available.
    pub fn evaluate(&self, source: &str) -> Result<Value> {
        Evaluator::new(self.values)
            .with_context(self.context)
            .evaluate(source)
    }

    /// Raw value of a field; `None` when unset, blank, null or failing.
    pub fn value(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<Value> {
        let value = match field.as_ref()? {
            ActionField::Literal(value) => value.clone(),
            ActionField::Input(input) => self.values.get(input).cloned().unwrap_or_default(),
            ActionField::Expr(source) if source.trim().is_empty() => return None,
            ActionField::Expr(source) => match self.evaluate(source) {
                Ok(value) => value,
                Err(e) => {
                    debug!("Field '{}' failed: {}", name, e);
                    add_field_error(errors, name, invalid_expression_message(source));
                    return None;
                }
            },
        };
        if value.is_null() {
            None
        } else {
            Some(value)
        }
    }

    pub fn text(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<String> {
        self.value(field, name, errors).map(|v| value_to_code(&v))
    }

    pub fn decimal(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<Decimal> {
        let value = self.value(field, name, errors)?;
        let parsed = value_to_decimal(&value);
        if parsed.is_none() {
            add_field_error(
                errors,
                name,
                format!("Expected a number, got {}.", value.type_name()),
            );
        }
        parsed
    }

    pub fn float(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<f64> {
        self.decimal(field, name, errors).map(to_f64)
    }

    pub fn integer(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<i64> {
        self.decimal(field, name, errors)
            .and_then(|d| d.trunc().to_i64())
    }

    pub fn date(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<NaiveDate> {
        let value = self.value(field, name, errors)?;
        let parsed = value_to_date(&value);
        if parsed.is_none() {
            add_field_error(
                errors,
                name,
                format!("Expected a date, got {}.", value.type_name()),
            );
        }
        parsed
    }

    pub fn boolean(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<bool> {
        self.value(field, name, errors).map(|v| match v {
            Value::String(s) => !matches!(s.as_str(), "" | "False" | "false" | "0"),
            other => other.is_truthy(),
        })
    }

    /// Closed-set codes (periodicity, day-count model, event class...).
    pub fn code<T: DeserializeOwned>(
        &self,
        field: &Option<ActionField>,
        name: &str,
        errors: &mut FieldErrors,
    ) -> Option<T> {
        let code = self.text(field, name, errors)?;
        match serde_json::from_value::<T>(serde_json::Value::String(code.clone())) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                add_field_error(errors, name, format!("Unknown value '{}'.", code));
                None
            }
        }
    }

    /// Entity id of a relation field. Strings are looked up by user code;
    /// unknown codes leave the relation empty.
    pub fn relation(
        &self,
        field: &Option<ActionField>,
        name: &str,
        kind: &str,
        errors: &mut FieldErrors,
    ) -> Result<Option<String>> {
        match self.value(field, name, errors) {
            None => Ok(None),
            Some(Value::Entity(entity)) => Ok(Some(entity.id)),
            Some(other) => {
                let user_code = value_to_code(&other);
                match self.entities.find_entity(kind, &user_code)? {
                    Some(entity) => Ok(Some(entity.id)),
                    None => {
                        debug!("No {} with user code '{}' for field '{}'", kind, user_code, name);
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Condition of an action row; failures count as false.
    pub fn condition(&self, condition: &Option<String>) -> bool {
        match condition.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(source) => match self.evaluate(source) {
                Ok(Value::String(s)) => s != "False",
                Ok(Value::Bool(b)) => b,
                Ok(Value::Number(n)) => !n.is_zero(),
                Ok(_) => true,
                Err(e) => {
                    debug!("Action skipped, condition '{}' failed: {}", source, e);
                    false
                }
            },
        }
    }
}

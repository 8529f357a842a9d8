//! Error outcome of a processor run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages keyed by the field (input or action attribute) they refer to.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const SKIPPED_BOOK_UNIQUE_CODE: &str = "Skipped book. Transaction Unique Code error";
pub const SKIPPED_BOOK_UNIQUE_CODE_ERROR: &str = "Skipped book. Transaction Unique code error";
pub const INVALID_EXPRESSION_VALUE: &str = "Invalid Expression";

/// Reason code attached to a uniqueness skip.
pub const REASON_UNIQUE_CODE_SKIPPED: u16 = 409;
/// Reason code attached to a uniqueness error.
pub const REASON_UNIQUE_CODE_ERROR: u16 = 410;

pub fn invalid_expression_message(expression: &str) -> String {
    format!("Invalid expression \"{}\".", expression)
}

/// Adds `message` under `field` unless already present.
pub fn add_field_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    let message = message.into();
    let messages = errors.entry(field.to_string()).or_default();
    if !messages.contains(&message) {
        messages.push(message);
    }
}

/// Flattens field errors into `field: message` strings.
pub fn flatten_field_errors(errors: &FieldErrors) -> Vec<String> {
    errors
        .iter()
        .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{}: {}", field, m)))
        .collect()
}

/// Errors accumulated by one run. Empty lists mean success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct ProcessErrors {
    pub general_errors: Vec<Vec<String>>,
    pub value_errors: Vec<Vec<FieldErrors>>,
    pub instrument_errors: Vec<Vec<String>>,
    pub complex_transaction_errors: Vec<Vec<String>>,
    pub transaction_errors: Vec<Vec<String>>,
    /// Reason code of the last general error, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<u16>,
}

impl ProcessErrors {
    pub fn has_errors(&self) -> bool {
        let any = |groups: &Vec<Vec<String>>| groups.iter().any(|g| !g.is_empty());
        any(&self.general_errors)
            || self.value_errors.iter().any(|g| g.iter().any(|e| !e.is_empty()))
            || any(&self.instrument_errors)
            || any(&self.complex_transaction_errors)
            || any(&self.transaction_errors)
    }

    pub fn add_general(&mut self, reason: Option<u16>, message: impl Into<String>) {
        self.general_errors.push(vec![message.into()]);
        if reason.is_some() {
            self.reason = reason;
        }
    }

    pub fn add_value_errors(&mut self, errors: FieldErrors) {
        if !errors.is_empty() {
            self.value_errors.push(vec![errors]);
        }
    }

    pub fn add_instrument_errors(&mut self, errors: &FieldErrors) {
        if !errors.is_empty() {
            self.instrument_errors.push(flatten_field_errors(errors));
        }
    }

    pub fn add_complex_transaction_errors(&mut self, errors: &FieldErrors) {
        if !errors.is_empty() {
            self.complex_transaction_errors.push(flatten_field_errors(errors));
        }
    }

    pub fn add_transaction_errors(&mut self, errors: &FieldErrors) {
        if !errors.is_empty() {
            self.transaction_errors.push(flatten_field_errors(errors));
        }
    }
}

/// Outcome of the transaction unique code check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessStatus {
    Create,
    Update,
    Overwrite,
    Skip,
    Error,
    BookedWithoutUniqueCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_errors_mean_success() {
        let mut errors = ProcessErrors::default();
        assert!(!errors.has_errors());

        errors.add_instrument_errors(&FieldErrors::new());
        errors.add_value_errors(FieldErrors::new());
        assert!(!errors.has_errors());
        assert!(errors.instrument_errors.is_empty());
    }

    #[test]
    fn test_field_errors_are_deduplicated_and_flattened() {
        let mut field_errors = FieldErrors::new();
        add_field_error(&mut field_errors, "user_code", invalid_expression_message("a +"));
        add_field_error(&mut field_errors, "user_code", invalid_expression_message("a +"));
        assert_eq!(field_errors["user_code"].len(), 1);

        let mut errors = ProcessErrors::default();
        errors.add_instrument_errors(&field_errors);
        assert!(errors.has_errors());
        assert_eq!(
            errors.instrument_errors,
            vec![vec!["user_code: Invalid expression \"a +\".".to_string()]]
        );
    }

    #[test]
    fn test_outcome_shape_serialization() {
        let mut errors = ProcessErrors::default();
        errors.add_general(Some(REASON_UNIQUE_CODE_SKIPPED), SKIPPED_BOOK_UNIQUE_CODE);

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json["general_errors"][0][0],
            "Skipped book. Transaction Unique Code error"
        );
        assert_eq!(json["reason"], 409);
        assert!(json["value_errors"].as_array().unwrap().is_empty());
    }
}

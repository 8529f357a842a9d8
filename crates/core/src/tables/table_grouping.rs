//! Grouping with per-group subtotals.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use super::table_filters::{cell_text, identifier_key};
use super::tables_model::{
    percent_key, GroupType, Row, TableColumn, TableGroup, ValueType, EXPOSURE_KEY,
    MARKET_VALUE_KEY,
};
use super::MISSING_VALUE;
use crate::constants::NO_DATA;

fn no_data() -> JsonValue {
    JsonValue::String(NO_DATA.to_string())
}

fn number(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

/// Numeric cell; a missing key reads as 0, any non-number as `None`.
fn cell_number(row: &Row, key: &str) -> Option<f64> {
    match row.get(key) {
        None => Some(0.0),
        Some(value) => value.as_f64(),
    }
}

/// Non-zero numeric cell.
fn weight(row: &Row, key: &str) -> Option<f64> {
    cell_number(row, key).filter(|w| *w != 0.0)
}

fn sum(rows: &[&Row], key: &str) -> JsonValue {
    let mut total = 0.0;
    for row in rows {
        match cell_number(row, key) {
            Some(value) => total += value,
            None => return no_data(),
        }
    }
    number(total)
}

fn weighted(rows: &[&Row], key: &str, weight_key: &str) -> JsonValue {
    let total: f64 = rows
        .iter()
        .filter_map(|row| Some(weight(row, weight_key)? * cell_number(row, key)?))
        .sum();
    number(total)
}

fn weighted_average(rows: &[&Row], key: &str, weight_key: &str) -> JsonValue {
    let total: f64 = rows.iter().filter_map(|row| weight(row, weight_key)).sum();
    if total == 0.0 {
        return no_data();
    }
    let mut result = 0.0;
    for row in rows {
        let value = match cell_number(row, key) {
            Some(value) => value,
            None => return no_data(),
        };
        if let Some(w) = cell_number(row, weight_key) {
            result += value * w / total;
        }
    }
    number(result)
}

/// Subtotal of one column over `rows`; `None` without a formula.
pub fn subtotal(rows: &[&Row], column: &TableColumn) -> Option<JsonValue> {
    let formula = column.subtotal_formula?;
    Some(match formula.weight_key() {
        None => sum(rows, &column.key),
        Some(weight_key) if formula.is_average() => weighted_average(rows, &column.key, &weight_key),
        Some(weight_key) => weighted(rows, &column.key, &weight_key),
    })
}

/// Subtotals of every numeric column with a formula. When the market value
/// or exposure subtotal is non-zero its percent column is summed too.
pub fn subtotals(rows: &[&Row], columns: &[TableColumn]) -> Map<String, JsonValue> {
    let mut result = Map::new();
    for column in columns.iter().filter(|c| c.value_type == ValueType::Number) {
        if let Some(value) = subtotal(rows, column) {
            result.insert(column.key.clone(), value);
        }
    }
    for key in [MARKET_VALUE_KEY, EXPOSURE_KEY] {
        let is_nonzero = result
            .get(key)
            .and_then(JsonValue::as_f64)
            .map_or(false, |v| v != 0.0);
        if is_nonzero {
            let percent = percent_key(key);
            let value = match rows
                .iter()
                .map(|row| row.get(&percent).and_then(JsonValue::as_f64))
                .sum::<Option<f64>>()
            {
                Some(total) if total != 0.0 => number(total),
                Some(_) => JsonValue::Null,
                None => no_data(),
            };
            result.insert(percent, value);
        }
    }
    result
}

/// Writes `<data_key>Percent` on every row as its share of the total of its
/// group (all rows when `group_key` is `None`). A zero or non-numeric group
/// total writes `null`.
pub fn add_value_percent(rows: &mut [Row], group_key: Option<&str>, data_key: &str) {
    let group_of = |row: &Row| -> String {
        group_key
            .and_then(|key| row.get(key))
            .map(cell_text)
            .unwrap_or_default()
    };

    let mut totals: HashMap<String, Option<f64>> = HashMap::new();
    for row in rows.iter() {
        let entry = totals.entry(group_of(row)).or_insert(Some(0.0));
        let value = row.get(data_key).and_then(JsonValue::as_f64);
        *entry = match (*entry, value) {
            (Some(total), Some(value)) => Some(total + value),
            _ => None,
        };
    }

    let percent = percent_key(data_key);
    for row in rows.iter_mut() {
        let total = totals.get(&group_of(row)).copied().flatten();
        let share = match (total, row.get(data_key).and_then(JsonValue::as_f64)) {
            (Some(total), Some(value)) if total != 0.0 => number(value / total),
            _ => JsonValue::Null,
        };
        row.insert(percent.clone(), share);
    }
}

/// Identifier and display name of the group `row` falls in.
fn group_identity(row: &Row, group_type: &GroupType) -> (Option<String>, String) {
    let identifier = row
        .get(&identifier_key(&group_type.key))
        .filter(|v| !v.is_null())
        .map(cell_text);
    match identifier {
        Some(id) if id == MISSING_VALUE => (Some(id), MISSING_VALUE.to_string()),
        Some(id) => {
            let name = row
                .get(&group_type.key)
                .filter(|v| !v.is_null())
                .map(cell_text)
                .unwrap_or_else(|| id.clone());
            (Some(id), name)
        }
        None => (None, NO_DATA.to_string()),
    }
}

/// Groups `rows` by `group_type` in first-seen order with subtotals.
pub fn group_rows(rows: &[Row], group_type: &GroupType, columns: &[TableColumn]) -> Vec<TableGroup> {
    let mut order: Vec<(Option<String>, String)> = Vec::new();
    let mut members: HashMap<Option<String>, Vec<&Row>> = HashMap::new();

    for row in rows {
        let (identifier, name) = group_identity(row, group_type);
        let bucket = members.entry(identifier.clone()).or_default();
        if bucket.is_empty() {
            order.push((identifier, name));
        }
        bucket.push(row);
    }

    order
        .into_iter()
        .map(|(identifier, name)| {
            let group_members = members.remove(&identifier).unwrap_or_default();
            TableGroup {
                name,
                identifier,
                type_key: group_type.key.clone(),
                item_count: group_members.len(),
                subtotal: subtotals(&group_members, columns),
            }
        })
        .collect()
}


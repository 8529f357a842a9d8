//! Row filtering: global search, column filters and opened-group filters.

use std::cmp::Ordering;

use log::warn;
use serde_json::Value as JsonValue;

use super::tables_model::{FilterSetting, FilterType, FilterValue, GroupType, Row};
use super::MISSING_VALUE;
use crate::utils::decimal_utils::is_close_f64;

/// Compares two cells. Numbers compare numerically, strings and booleans
/// by value; anything else is incomparable.
pub fn compare_cells(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Cell rendered the way search and text filters see it.
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a cell holds a value. Zero counts; empty strings and containers do not.
fn is_present(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => !s.is_empty(),
        Some(JsonValue::Array(a)) => !a.is_empty(),
        Some(JsonValue::Object(o)) => !o.is_empty(),
        Some(_) => true,
    }
}

fn cells_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => is_close_f64(a, b),
        _ => left == right,
    }
}

fn contains_all_words(haystack: &str, needle: &str) -> bool {
    needle.split(' ').all(|word| haystack.contains(word))
}

fn quoted(needle: &str) -> Option<&str> {
    if needle.contains('"') {
        Some(needle.trim_matches('"'))
    } else {
        None
    }
}

/// Rows containing any whitespace-separated word of `query` in any cell.
pub fn filter_by_global_search(rows: Vec<Row>, query: Option<&str>) -> Vec<Row> {
    let words: Vec<String> = match query {
        Some(q) if !q.trim().is_empty() => q.split_whitespace().map(str::to_lowercase).collect(),
        _ => return rows,
    };
    rows.into_iter()
        .filter(|row| {
            row.values()
                .filter(|v| !v.is_null())
                .map(|v| cell_text(v).to_lowercase())
                .any(|text| words.iter().any(|w| text.contains(w.as_str())))
        })
        .collect()
}

/// Applies one column filter to one cell.
fn apply_filter(cell: &JsonValue, setting: &FilterSetting) -> bool {
    let filter_type = setting.filter_type;
    let value = &setting.value;

    if setting.value_type.is_text() && filter_type != FilterType::Multiselector {
        let text = cell_text(cell).to_lowercase();
        let needle = value.first().map(cell_text).unwrap_or_default().to_lowercase();
        return match filter_type {
            FilterType::Contains => match quoted(&needle) {
                Some(exact) => text.contains(exact),
                None => contains_all_words(&text, &needle),
            },
            FilterType::ContainsHasSubstring => text.contains(quoted(&needle).unwrap_or(needle.as_str())),
            FilterType::DoesNotContains => !text.contains(needle.as_str()),
            FilterType::Selector | FilterType::Equal => text == needle,
            FilterType::NotEqual => text != needle,
            _ => compare_text(&text, &needle, filter_type),
        };
    }

    match (filter_type, value) {
        (FilterType::FromTo, FilterValue::Range { min_value, max_value }) => {
            let (min, max) = match (min_value, max_value) {
                (Some(min), Some(max)) => (min, max),
                _ => return false,
            };
            matches!(compare_cells(min, cell), Some(Ordering::Less | Ordering::Equal))
                && matches!(compare_cells(cell, max), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterType::OutOfRange, FilterValue::Range { min_value, max_value }) => {
            let (min, max) = match (min_value, max_value) {
                (Some(min), Some(max)) => (min, max),
                _ => return false,
            };
            matches!(compare_cells(cell, min), Some(Ordering::Less | Ordering::Equal))
                || matches!(compare_cells(cell, max), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterType::Multiselector, _) => value.values().iter().any(|v| cells_equal(cell, v)),
        (FilterType::DateTree, _) => {
            let text = cell_text(cell);
            value.values().iter().any(|v| cell_text(v) == text)
        }
        (_, _) => {
            let argument = match value.first() {
                Some(argument) => argument,
                None => return false,
            };
            match filter_type {
                FilterType::Equal | FilterType::Selector => cells_equal(cell, argument),
                FilterType::NotEqual => !cells_equal(cell, argument),
                FilterType::Greater => compare_cells(cell, argument) == Some(Ordering::Greater),
                FilterType::GreaterEqual => matches!(
                    compare_cells(cell, argument),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                FilterType::Less => compare_cells(cell, argument) == Some(Ordering::Less),
                FilterType::LessEqual => matches!(
                    compare_cells(cell, argument),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                FilterType::Contains | FilterType::ContainsHasSubstring => {
                    cell_text(cell).contains(&cell_text(argument))
                }
                FilterType::DoesNotContains => !cell_text(cell).contains(&cell_text(argument)),
                _ => false,
            }
        }
    }
}

fn compare_text(text: &str, needle: &str, filter_type: FilterType) -> bool {
    let ordering = text.cmp(needle);
    match filter_type {
        FilterType::Greater => ordering == Ordering::Greater,
        FilterType::GreaterEqual => ordering != Ordering::Less,
        FilterType::Less => ordering == Ordering::Less,
        FilterType::LessEqual => ordering != Ordering::Greater,
        _ => false,
    }
}

/// Whether `row` passes every column filter.
///
/// `empty` keeps rows without a value. A row without a value fails any other
/// set filter unless the filter values include `"-"`.
pub fn row_matches(row: &Row, settings: &[FilterSetting]) -> bool {
    settings.iter().all(|setting| {
        if setting.key == "ordering" {
            return true;
        }
        let cell = row.get(&setting.key);
        let is_set = setting.value.is_set(setting.filter_type);

        if is_present(cell) {
            if setting.filter_type == FilterType::Empty {
                return false;
            }
            match cell {
                Some(cell) if is_set => apply_filter(cell, setting),
                _ => true,
            }
        } else if setting.filter_type != FilterType::Empty && is_set {
            setting.value.includes_dash()
        } else {
            true
        }
    })
}

pub fn filter_rows(rows: Vec<Row>, settings: &[FilterSetting]) -> Vec<Row> {
    if settings.is_empty() {
        return rows;
    }
    rows.into_iter().filter(|row| row_matches(row, settings)).collect()
}

/// Maps a name-like column (`portfolio.name`) to its identifying user code.
pub fn identifier_key(key: &str) -> String {
    match key.rsplit_once('.') {
        Some((prefix, last)) if matches!(last, "name" | "shortName" | "publicName") => {
            format!("{}.userCode", prefix)
        }
        _ => key.to_string(),
    }
}

/// Case-insensitive match of a cell against an opened group value; a
/// missing cell matches `"-"` and `null`.
pub fn group_value_matches(row: &Row, key: &str, value: &JsonValue) -> bool {
    match row.get(key) {
        None | Some(JsonValue::Null) => {
            matches!(value, JsonValue::Null) || value.as_str() == Some(MISSING_VALUE)
        }
        Some(cell) => match value {
            JsonValue::String(s) => cell_text(cell).to_lowercase() == s.to_lowercase(),
            other => cell_text(cell).to_lowercase() == cell_text(other).to_lowercase(),
        },
    }
}

/// Keeps the rows inside every opened group. Extra values or types beyond
/// the shorter list are ignored.
pub fn filter_by_groups(rows: Vec<Row>, types: &[GroupType], values: &[JsonValue]) -> Vec<Row> {
    if types.is_empty() || values.is_empty() {
        return rows;
    }
    if types.len() < values.len() {
        warn!(
            "{} group values for {} group types, extra values ignored",
            values.len(),
            types.len()
        );
    }
    let keys: Vec<String> = types.iter().map(|t| identifier_key(&t.key)).collect();
    rows.into_iter()
        .filter(|row| {
            keys.iter()
                .zip(values)
                .all(|(key, value)| group_value_matches(row, key, value))
        })
        .collect()
}

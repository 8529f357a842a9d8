use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::table_filters::compare_cells;
use super::tables_model::{Row, SortOrder, TableGroup};

/// Orders two optional cells with missing values last in either direction.
fn compare_optional(left: Option<&JsonValue>, right: Option<&JsonValue>, order: SortOrder) -> Ordering {
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => {
            let ordering = compare_cells(a, b).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

/// Stable sort of `rows` by `key`. A leading `-` on the key flips `order`.
pub fn sort_rows(rows: &mut [Row], key: &str, order: SortOrder) {
    let (key, order) = match key.strip_prefix('-') {
        Some(stripped) => (
            stripped,
            match order {
                SortOrder::Asc => SortOrder::Desc,
                SortOrder::Desc => SortOrder::Asc,
            },
        ),
        None => (key, order),
    };
    rows.sort_by(|a, b| compare_optional(a.get(key), b.get(key), order));
}

/// Sorts groups by name; "No Data" groups are ordered like any other name.
pub fn sort_groups(groups: &mut [TableGroup], order: SortOrder) {
    groups.sort_by(|a, b| {
        let ordering = a.name.cmp(&b.name);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// One-based page of `items`; page 0 reads as page 1.
pub fn paginate<T>(items: Vec<T>, page: usize, page_size: usize) -> Vec<T> {
    let start = page.max(1).saturating_sub(1).saturating_mul(page_size);
    items.into_iter().skip(start).take(page_size).collect()
}

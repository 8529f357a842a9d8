use log::debug;
use serde_json::Value as JsonValue;

use super::table_filters::{filter_by_global_search, filter_by_groups, filter_rows, identifier_key};
use super::table_grouping::{add_value_percent, group_rows};
use super::table_ordering::{paginate, sort_groups, sort_rows};
use super::tables_model::{
    Row, TableGroup, TableOptions, TablePage, EXPOSURE_KEY, MARKET_VALUE_KEY,
};
use crate::errors::{Error, Result, ValidationError};
use crate::reports::Report;
use crate::settings::{CoreSettings, DEFAULT_PAGE_SIZE};

/// Flattens nested objects into dotted keys. Arrays and scalars are kept.
pub fn flatten_row(value: &JsonValue) -> Row {
    fn walk(prefix: &str, value: &JsonValue, row: &mut Row) {
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, row);
                }
            }
            other => {
                row.insert(prefix.to_string(), other.clone());
            }
        }
    }

    let mut row = Row::new();
    walk("", value, &mut row);
    row
}

/// Report items as flat table rows.
pub fn rows_from_report(report: &Report) -> Result<Vec<Row>> {
    report
        .items
        .iter()
        .map(|item| Ok(flatten_row(&serde_json::to_value(item)?)))
        .collect()
}

/// Filters, groups, orders and pages flat report rows.
pub trait TableServiceTrait: Send + Sync {
    /// Global search, column filters and opened-group filters.
    fn filter(&self, rows: Vec<Row>, options: &TableOptions) -> Vec<Row>;

    fn list_rows(&self, rows: Vec<Row>, options: &TableOptions) -> TablePage<Row>;

    /// Groups of the first group type not yet opened by `groups_values`.
    fn list_groups(&self, rows: Vec<Row>, options: &TableOptions) -> Result<TablePage<TableGroup>>;
}

pub struct TableService {
    default_page_size: usize,
}

impl Default for TableService {
    fn default() -> Self {
        Self::new()
    }
}

impl TableService {
    pub fn new() -> Self {
        TableService {
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_settings(mut self, settings: &CoreSettings) -> Self {
        self.default_page_size = settings.default_page_size;
        self
    }

    fn page_of(&self, options: &TableOptions) -> (usize, usize) {
        let page_size = options
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size);
        (options.page.unwrap_or(1).max(1), page_size)
    }
}

impl TableServiceTrait for TableService {
    fn filter(&self, rows: Vec<Row>, options: &TableOptions) -> Vec<Row> {
        let before = rows.len();
        let rows = filter_by_global_search(rows, options.global_table_search.as_deref());
        let rows = filter_rows(rows, &options.filter_settings);
        let rows = filter_by_groups(rows, &options.groups_types, &options.groups_values);
        debug!("Table filter kept {} of {} rows", rows.len(), before);
        rows
    }

    fn list_rows(&self, rows: Vec<Row>, options: &TableOptions) -> TablePage<Row> {
        let mut rows = self.filter(rows, options);
        add_value_percent(&mut rows, None, MARKET_VALUE_KEY);
        add_value_percent(&mut rows, None, EXPOSURE_KEY);

        if let Some(ordering) = options.ordering.as_deref() {
            sort_rows(&mut rows, ordering, options.items_order.unwrap_or_default());
        }

        let count = rows.len();
        let (page, page_size) = self.page_of(options);
        TablePage {
            results: paginate(rows, page, page_size),
            count,
            page,
            page_size,
        }
    }

    fn list_groups(&self, rows: Vec<Row>, options: &TableOptions) -> Result<TablePage<TableGroup>> {
        let level = options.groups_values.len();
        let group_type = options.groups_types.get(level).ok_or_else(|| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "no group type for level {}",
                level
            )))
        })?;

        let mut rows = self.filter(rows, options);
        let group_key = identifier_key(&group_type.key);
        add_value_percent(&mut rows, Some(&group_key), MARKET_VALUE_KEY);
        add_value_percent(&mut rows, Some(&group_key), EXPOSURE_KEY);

        let mut groups = group_rows(&rows, group_type, &options.columns);
        if let Some(order) = options.groups_order {
            sort_groups(&mut groups, order);
        }

        let count = groups.len();
        let (page, page_size) = self.page_of(options);
        Ok(TablePage {
            results: paginate(groups, page, page_size),
            count,
            page,
            page_size,
        })
    }
}

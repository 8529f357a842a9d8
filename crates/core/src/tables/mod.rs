//! Tables module - filtering, grouping, sorting and paging of report rows.

mod table_filters;
mod table_grouping;
mod table_ordering;
mod table_service;
mod tables_model;


/// Placeholder a filter or group value uses for a missing cell.
pub const MISSING_VALUE: &str = "-";

pub use table_filters::{
    compare_cells, filter_by_global_search, filter_by_groups, filter_rows, row_matches,
};
pub use table_grouping::{add_value_percent, group_rows, subtotal, subtotals};
pub use table_ordering::{paginate, sort_groups, sort_rows};
pub use table_service::{flatten_row, rows_from_report, TableService, TableServiceTrait};
pub use tables_model::{
    percent_key, FilterSetting, FilterType, FilterValue, GroupType, Row, SortOrder,
    SubtotalFormula, TableColumn, TableGroup, TableOptions, TablePage, ValueType,
    EXPOSURE_KEY, MARKET_VALUE_KEY,
};

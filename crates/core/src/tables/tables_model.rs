//! Table shaping models: filter settings, grouping, ordering and pages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::errors::{Error, ValidationError};

/// One flattened table row; nested objects use dotted keys (`pl.full.all.total`).
pub type Row = Map<String, JsonValue>;

pub const MARKET_VALUE_KEY: &str = "marketValue";
pub const EXPOSURE_KEY: &str = "exposure";

/// Key of the per-group share of `data_key`.
pub fn percent_key(data_key: &str) -> String {
    format!("{}Percent", data_key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ValueType {
    String,
    Number,
    Classifier,
    Date,
}

impl TryFrom<u8> for ValueType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(ValueType::String),
            20 => Ok(ValueType::Number),
            30 => Ok(ValueType::Classifier),
            40 => Ok(ValueType::Date),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "unknown value type {}",
                other
            )))),
        }
    }
}

impl From<ValueType> for u8 {
    fn from(value: ValueType) -> u8 {
        match value {
            ValueType::String => 10,
            ValueType::Number => 20,
            ValueType::Classifier => 30,
            ValueType::Date => 40,
        }
    }
}

impl ValueType {
    pub fn is_text(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Classifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Contains,
    ContainsHasSubstring,
    DoesNotContains,
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    FromTo,
    OutOfRange,
    Selector,
    Multiselector,
    DateTree,
    Empty,
}

impl FilterType {
    pub fn is_range(&self) -> bool {
        matches!(self, FilterType::FromTo | FilterType::OutOfRange)
    }
}

/// Argument of a filter: a min/max pair for range filters, a list otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<JsonValue>),
    #[serde(rename_all = "camelCase")]
    Range {
        min_value: Option<JsonValue>,
        max_value: Option<JsonValue>,
    },
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::List(Vec::new())
    }
}

impl FilterValue {
    /// Whether the filter constrains anything. A leading `0` counts as a value.
    pub fn is_set(&self, filter_type: FilterType) -> bool {
        match self {
            FilterValue::Range {
                min_value,
                max_value,
            } => filter_type.is_range() && is_some_value(min_value) && is_some_value(max_value),
            FilterValue::List(values) => match values.first() {
                Some(JsonValue::Null) | None => false,
                Some(JsonValue::String(s)) => !s.is_empty(),
                Some(JsonValue::Bool(b)) => *b,
                Some(_) => true,
            },
        }
    }

    pub fn first(&self) -> Option<&JsonValue> {
        match self {
            FilterValue::List(values) => values.first(),
            FilterValue::Range { .. } => None,
        }
    }

    pub fn values(&self) -> &[JsonValue] {
        match self {
            FilterValue::List(values) => values,
            FilterValue::Range { .. } => &[],
        }
    }

    pub fn includes_dash(&self) -> bool {
        self.values()
            .iter()
            .any(|v| v.as_str() == Some(super::MISSING_VALUE))
    }
}

fn is_some_value(value: &Option<JsonValue>) -> bool {
    !matches!(value, None | Some(JsonValue::Null))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSetting {
    pub key: String,
    #[serde(default)]
    pub value: FilterValue,
    pub value_type: ValueType,
    pub filter_type: FilterType,
}

impl FilterSetting {
    pub fn new(key: impl Into<String>, value_type: ValueType, filter_type: FilterType, value: FilterValue) -> Self {
        FilterSetting {
            key: key.into(),
            value,
            value_type,
            filter_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Subtotal formula of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubtotalFormula {
    Sum,
    WeightedByMarketValue,
    WeightedByMarketValuePercent,
    WeightedByExposure,
    WeightedByExposurePercent,
    WeightedAverageByMarketValue,
    WeightedAverageByMarketValuePercent,
    WeightedAverageByExposure,
    WeightedAverageByExposurePercent,
}

impl TryFrom<u8> for SubtotalFormula {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use SubtotalFormula::*;
        Ok(match value {
            1 => Sum,
            2 => WeightedByMarketValue,
            3 => WeightedByMarketValuePercent,
            4 => WeightedByExposure,
            5 => WeightedByExposurePercent,
            6 => WeightedAverageByMarketValue,
            7 => WeightedAverageByMarketValuePercent,
            8 => WeightedAverageByExposure,
            9 => WeightedAverageByExposurePercent,
            other => {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "unknown subtotal formula {}",
                    other
                ))))
            }
        })
    }
}

impl From<SubtotalFormula> for u8 {
    fn from(value: SubtotalFormula) -> u8 {
        use SubtotalFormula::*;
        match value {
            Sum => 1,
            WeightedByMarketValue => 2,
            WeightedByMarketValuePercent => 3,
            WeightedByExposure => 4,
            WeightedByExposurePercent => 5,
            WeightedAverageByMarketValue => 6,
            WeightedAverageByMarketValuePercent => 7,
            WeightedAverageByExposure => 8,
            WeightedAverageByExposurePercent => 9,
        }
    }
}

impl SubtotalFormula {
    /// Row key the formula weights by, `None` for a plain sum.
    pub fn weight_key(&self) -> Option<String> {
        use SubtotalFormula::*;
        match self {
            Sum => None,
            WeightedByMarketValue | WeightedAverageByMarketValue => Some(MARKET_VALUE_KEY.to_string()),
            WeightedByMarketValuePercent | WeightedAverageByMarketValuePercent => {
                Some(percent_key(MARKET_VALUE_KEY))
            }
            WeightedByExposure | WeightedAverageByExposure => Some(EXPOSURE_KEY.to_string()),
            WeightedByExposurePercent | WeightedAverageByExposurePercent => {
                Some(percent_key(EXPOSURE_KEY))
            }
        }
    }

    pub fn is_average(&self) -> bool {
        u8::from(*self) >= 6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub key: String,
    pub value_type: ValueType,
    #[serde(default)]
    pub subtotal_formula: Option<SubtotalFormula>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupType {
    pub key: String,
}

/// Filtering, grouping, ordering and paging of one table request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TableOptions {
    pub filter_settings: Vec<FilterSetting>,
    /// Case-insensitive search over every column.
    #[serde(alias = "search")]
    pub global_table_search: Option<String>,
    pub groups_types: Vec<GroupType>,
    /// Values of the groups already opened, one per leading group type.
    pub groups_values: Vec<JsonValue>,
    pub groups_order: Option<SortOrder>,
    pub ordering: Option<String>,
    pub items_order: Option<SortOrder>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub columns: Vec<TableColumn>,
}

/// One group of rows with the subtotals of its numeric columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableGroup {
    pub name: String,
    pub identifier: Option<String>,
    pub type_key: String,
    pub item_count: usize,
    pub subtotal: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePage<T> {
    pub results: Vec<T>,
    /// Rows before paging.
    pub count: usize,
    pub page: usize,
    pub page_size: usize,
}

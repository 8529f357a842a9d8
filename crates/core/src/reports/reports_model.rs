//! Report domain models: the report spec, P&L breakdowns and report items.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Mul, Neg};

use crate::expressions::Value;
use crate::transactions::TransactionClass;

/// Cost matching strategy for BUY/SELL rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostMethod {
    #[default]
    Avco,
    Fifo,
}

/// Date a transaction is selected and ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportDateField {
    #[default]
    TransactionDate,
    AccountingDate,
    CashDate,
}

/// Extra column evaluated per item with the item bound as `item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomColumn {
    pub name: String,
    pub expr: String,
}

fn default_pl_real_unreal_end_multiplier() -> Decimal {
    dec!(0.5)
}

/// Parameters of one balance/P&L report build.
///
/// Empty filter sets select everything. Slicing flags decide which
/// dimensions key the cost matching and the report items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSpec {
    pub report_date: NaiveDate,
    pub report_currency: String,
    pub pricing_policy: String,
    #[serde(default)]
    pub cost_method: CostMethod,
    #[serde(default)]
    pub date_field: ReportDateField,

    #[serde(default)]
    pub slice_by_portfolio: bool,
    #[serde(default)]
    pub slice_by_account: bool,
    #[serde(default)]
    pub slice_by_strategy1: bool,
    #[serde(default)]
    pub slice_by_strategy2: bool,
    #[serde(default)]
    pub slice_by_strategy3: bool,
    /// Keeps one item per source transaction instead of aggregating.
    #[serde(default)]
    pub show_transaction_details: bool,

    #[serde(default)]
    pub portfolios: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub strategies1: Vec<String>,
    #[serde(default)]
    pub strategies2: Vec<String>,
    #[serde(default)]
    pub strategies3: Vec<String>,
    #[serde(default)]
    pub transaction_classes: Vec<TransactionClass>,

    /// Share of a closure's realized P&L credited to the closing row.
    #[serde(default = "default_pl_real_unreal_end_multiplier")]
    pub pl_real_unreal_end_multiplier: Decimal,
    /// Overrides the tenant's approach multiplier when set.
    #[serde(default)]
    pub approach_multiplier: Option<Decimal>,

    #[serde(default)]
    pub custom_columns: Vec<CustomColumn>,
}

impl ReportSpec {
    pub fn new(
        report_date: NaiveDate,
        report_currency: impl Into<String>,
        pricing_policy: impl Into<String>,
    ) -> Self {
        ReportSpec {
            report_date,
            report_currency: report_currency.into(),
            pricing_policy: pricing_policy.into(),
            cost_method: CostMethod::default(),
            date_field: ReportDateField::default(),
            slice_by_portfolio: false,
            slice_by_account: false,
            slice_by_strategy1: false,
            slice_by_strategy2: false,
            slice_by_strategy3: false,
            show_transaction_details: false,
            portfolios: Vec::new(),
            accounts: Vec::new(),
            strategies1: Vec::new(),
            strategies2: Vec::new(),
            strategies3: Vec::new(),
            transaction_classes: Vec::new(),
            pl_real_unreal_end_multiplier: default_pl_real_unreal_end_multiplier(),
            approach_multiplier: None,
            custom_columns: Vec::new(),
        }
    }

    pub fn with_cost_method(mut self, cost_method: CostMethod) -> Self {
        self.cost_method = cost_method;
        self
    }

    pub fn with_date_field(mut self, date_field: ReportDateField) -> Self {
        self.date_field = date_field;
        self
    }

    pub fn with_custom_column(mut self, name: impl Into<String>, expr: impl Into<String>) -> Self {
        self.custom_columns.push(CustomColumn {
            name: name.into(),
            expr: expr.into(),
        });
        self
    }
}

/// Principal, carry and overheads with their total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlComponents {
    pub principal: Decimal,
    pub carry: Decimal,
    pub overheads: Decimal,
    pub total: Decimal,
}

impl PlComponents {
    pub fn new(principal: Decimal, carry: Decimal, overheads: Decimal) -> Self {
        PlComponents {
            principal,
            carry,
            overheads,
            total: principal + carry + overheads,
        }
    }
}

impl Add for PlComponents {
    type Output = PlComponents;

    fn add(self, rhs: PlComponents) -> PlComponents {
        PlComponents::new(
            self.principal + rhs.principal,
            self.carry + rhs.carry,
            self.overheads + rhs.overheads,
        )
    }
}

impl AddAssign for PlComponents {
    fn add_assign(&mut self, rhs: PlComponents) {
        *self = *self + rhs;
    }
}

impl Neg for PlComponents {
    type Output = PlComponents;

    fn neg(self) -> PlComponents {
        PlComponents::new(-self.principal, -self.carry, -self.overheads)
    }
}

impl Mul<Decimal> for PlComponents {
    type Output = PlComponents;

    fn mul(self, rhs: Decimal) -> PlComponents {
        PlComponents::new(self.principal * rhs, self.carry * rhs, self.overheads * rhs)
    }
}

/// A P&L figure with its closed (realized) and opened (unrealized) parts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlBreakdown {
    pub all: PlComponents,
    pub closed: PlComponents,
    pub opened: PlComponents,
}

impl PlBreakdown {
    /// Splits `all` by the closed share `multiplier`.
    pub fn split(all: PlComponents, multiplier: Decimal) -> Self {
        PlBreakdown {
            all,
            closed: all * multiplier,
            opened: all * (Decimal::ONE - multiplier),
        }
    }

    /// Entirely closed.
    pub fn closed(all: PlComponents) -> Self {
        PlBreakdown {
            all,
            closed: all,
            opened: PlComponents::default(),
        }
    }

    /// Entirely open.
    pub fn opened(all: PlComponents) -> Self {
        PlBreakdown {
            all,
            closed: PlComponents::default(),
            opened: all,
        }
    }
}

impl AddAssign for PlBreakdown {
    fn add_assign(&mut self, rhs: PlBreakdown) {
        self.all += rhs.all;
        self.closed += rhs.closed;
        self.opened += rhs.opened;
    }
}

impl Neg for PlBreakdown {
    type Output = PlBreakdown;

    fn neg(self) -> PlBreakdown {
        PlBreakdown {
            all: -self.all,
            closed: -self.closed,
            opened: -self.opened,
        }
    }
}

/// Full P&L split into its fx and fixed (local price) components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfitAndLoss {
    pub full: PlBreakdown,
    pub fx: PlBreakdown,
    pub fixed: PlBreakdown,
}

impl AddAssign for ProfitAndLoss {
    fn add_assign(&mut self, rhs: ProfitAndLoss) {
        self.full += rhs.full;
        self.fx += rhs.fx;
        self.fixed += rhs.fixed;
    }
}

impl Neg for ProfitAndLoss {
    type Output = ProfitAndLoss;

    fn neg(self) -> ProfitAndLoss {
        ProfitAndLoss {
            full: -self.full,
            fx: -self.fx,
            fixed: -self.fixed,
        }
    }
}

impl ProfitAndLoss {
    /// Scales every component by `factor`.
    pub fn scaled(&self, factor: Decimal) -> ProfitAndLoss {
        let scale = |b: &PlBreakdown| PlBreakdown {
            all: b.all * factor,
            closed: b.closed * factor,
            opened: b.opened * factor,
        };
        ProfitAndLoss {
            full: scale(&self.full),
            fx: scale(&self.fx),
            fixed: scale(&self.fixed),
        }
    }

    /// Same totals, entirely closed.
    pub fn as_closed(&self) -> ProfitAndLoss {
        ProfitAndLoss {
            full: PlBreakdown::closed(self.full.all),
            fx: PlBreakdown::closed(self.fx.all),
            fixed: PlBreakdown::closed(self.fixed.all),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportItemKind {
    #[default]
    Unknown,
    Instrument,
    Currency,
    TransactionPl,
    FxTrade,
    /// Invested capital from cash inflows and outflows.
    CashInOut,
    /// Cash that does not match the booked P&L of a linked instrument.
    Mismatch,
}

impl ReportItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportItemKind::Unknown => "UNKNOWN",
            ReportItemKind::Instrument => "INSTRUMENT",
            ReportItemKind::Currency => "CURRENCY",
            ReportItemKind::TransactionPl => "TRANSACTION_PL",
            ReportItemKind::FxTrade => "FX_TRADE",
            ReportItemKind::CashInOut => "CASH_IN_OUT",
            ReportItemKind::Mismatch => "MISMATCH",
        }
    }
}

/// One aggregated line of a report. Amounts are in the report currency
/// unless suffixed `_system` (tenant system currency) or `_loc` (pricing
/// currency of the item).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportItem {
    pub id: String,
    pub kind: ReportItemKind,
    pub name: String,

    pub instrument: Option<String>,
    pub currency: Option<String>,
    pub pricing_currency: Option<String>,
    pub portfolio: Option<String>,
    pub account: Option<String>,
    pub strategy1: Option<String>,
    pub strategy2: Option<String>,
    pub strategy3: Option<String>,
    pub notes: Option<String>,
    /// Source transaction when details are shown.
    pub transaction_id: Option<String>,

    pub position_size: Decimal,
    pub principal_price: Decimal,
    pub accrued_price: Decimal,
    /// Rate of the pricing currency to the report currency.
    pub fx_rate: Decimal,

    pub market_value: Decimal,
    pub market_value_system: Decimal,
    pub market_value_loc: Decimal,
    pub exposure: Decimal,
    pub exposure_loc: Decimal,
    pub cost: Decimal,

    pub pl: ProfitAndLoss,
    pub total_real: Decimal,
    pub total_unreal: Decimal,

    pub gross_cost_price: Decimal,
    pub net_cost_price: Decimal,
    pub principal_invested: Decimal,
    pub amount_invested: Decimal,
    pub pos_return: Decimal,
    pub net_pos_return: Decimal,

    pub ytm: f64,
    pub modified_duration: f64,
    pub ytm_at_cost: f64,
    pub time_invested_days: f64,
    pub time_invested: f64,

    pub mismatch: Decimal,
    pub mismatch_portfolio: Option<String>,
    pub mismatch_account: Option<String>,

    pub is_empty: bool,
    /// Custom column results, flattened to JSON.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl ReportItem {
    /// The item as an expression value with its camelCase field names.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self)
            .map(|json| Value::from_json(&json))
            .unwrap_or_default()
    }
}

/// Portfolio-wide totals of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub market_value: Decimal,
    pub market_value_system: Decimal,
    pub exposure: Decimal,
    pub exposure_system: Decimal,
    pub total: Decimal,
    pub total_system: Decimal,
    pub total_closed: Decimal,
    pub total_opened: Decimal,
    pub total_fx: Decimal,
    pub total_fixed: Decimal,
    pub total_real: Decimal,
    pub total_unreal: Decimal,
    pub item_count: usize,
}

/// Output of one report build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub spec: ReportSpec,
    pub items: Vec<ReportItem>,
    pub mismatch_items: Vec<ReportItem>,
    pub summary: ReportSummary,
}

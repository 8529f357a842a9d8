//! Reports module - balance and P&L reports over the stored ledger.
//!
//! Stored transactions are copied into report-local virtual rows, matched
//! AVCO or FIFO per position key, valued in the report currency and
//! aggregated into report items.

mod multipliers;
mod report_builder;
mod report_pricing;
mod reports_model;
mod virtual_transactions;

#[cfg(test)]
mod reports_tests;

pub use multipliers::{annotate_multipliers, Closure, CostMatcher, PositionKey};
pub use report_builder::{ReportBuilder, ReportBuilderTrait};
pub use report_pricing::ReportPricing;
pub use reports_model::{
    CostMethod, CustomColumn, PlBreakdown, PlComponents, ProfitAndLoss, Report, ReportDateField,
    ReportItem, ReportItemKind, ReportSpec, ReportSummary,
};
pub use virtual_transactions::{TransactionCase, VirtualOrigin, VirtualTransaction};

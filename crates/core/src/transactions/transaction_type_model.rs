//! Transaction type templates: inputs and action rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::transactions_model::TransactionClass;
use crate::expressions::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputValueType {
    #[default]
    String,
    Number,
    Date,
    Selector,
    Relation,
}

fn default_iterations() -> u32 {
    1
}

/// A typed input of a transaction type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTypeInput {
    pub name: String,
    pub value_type: InputValueType,
    /// Entity kind for RELATION inputs (`portfolio`, `account`, `currency`...).
    #[serde(default)]
    pub entity_kind: Option<String>,
    #[serde(default)]
    pub selector_values: Vec<String>,
    /// Default expression.
    #[serde(default)]
    pub value_expr: Option<String>,
    #[serde(default)]
    pub recalc_expr: Option<String>,
    #[serde(default)]
    pub can_recalculate: bool,
    #[serde(default)]
    pub is_fill_from_context: bool,
    /// Number of recalculation passes this input takes part in.
    #[serde(default = "default_iterations")]
    pub expression_iterations_count: u32,
}

/// Source of an action-row field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionField {
    Literal(Value),
    /// Value of the named input.
    Input(String),
    Expr(String),
}

impl ActionField {
    pub fn expr(source: impl Into<String>) -> Self {
        ActionField::Expr(source.into())
    }

    pub fn input(name: impl Into<String>) -> Self {
        ActionField::Input(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        ActionField::Literal(value.into())
    }

    /// Text shown in error messages.
    pub fn source(&self) -> String {
        match self {
            ActionField::Literal(v) => v.to_string(),
            ActionField::Input(name) => name.clone(),
            ActionField::Expr(source) => source.clone(),
        }
    }
}

/// What a row does when its complex transaction is rebooked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebookReaction {
    Create,
    Overwrite,
    CreateIfNotExist,
    ClearAndWrite,
    Skip,
    Clear,
    ClearAndWriteOrSkip,
}

/// Effect of a rebook reaction on a schedule collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulePolicy {
    pub clear: bool,
    pub write: bool,
    /// Replace a row with the same natural key instead of appending.
    pub upsert: bool,
}

impl RebookReaction {
    /// Schedule-row policy for a reaction in book or rebook mode.
    pub fn schedule_policy(reaction: Option<RebookReaction>, is_rebook: bool) -> SchedulePolicy {
        let (clear, write, upsert) = match (reaction, is_rebook) {
            (None, false) => (false, true, false),
            (None, true) => (false, false, false),
            (Some(RebookReaction::Create), _) => (false, true, false),
            (Some(RebookReaction::Overwrite), _) => (false, true, true),
            (Some(RebookReaction::CreateIfNotExist), false) => (false, true, false),
            (Some(RebookReaction::CreateIfNotExist), true) => (false, false, false),
            (Some(RebookReaction::ClearAndWrite), _) => (true, true, false),
            (Some(RebookReaction::ClearAndWriteOrSkip), false) => (true, true, false),
            (Some(RebookReaction::ClearAndWriteOrSkip), true) => (false, false, false),
            (Some(RebookReaction::Clear), _) => (true, false, false),
            (Some(RebookReaction::Skip), _) => (false, false, false),
        };
        SchedulePolicy {
            clear,
            write,
            upsert,
        }
    }
}

/// What to do when the computed transaction unique code is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UniquenessReaction {
    #[default]
    Skip,
    Overwrite,
    TreatAsError,
    BookWithoutUniqueCode,
}

/// Instrument action. `user_code` identifies the instrument within the tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentAction {
    pub user_code: Option<ActionField>,
    pub name: Option<ActionField>,
    pub short_name: Option<ActionField>,
    pub public_name: Option<ActionField>,
    pub notes: Option<ActionField>,
    pub instrument_type: Option<ActionField>,
    pub pricing_currency: Option<ActionField>,
    pub price_multiplier: Option<ActionField>,
    pub accrued_currency: Option<ActionField>,
    pub accrued_multiplier: Option<ActionField>,
    pub payment_size_detail: Option<ActionField>,
    pub default_price: Option<ActionField>,
    pub default_accrued: Option<ActionField>,
    pub user_text_1: Option<ActionField>,
    pub user_text_2: Option<ActionField>,
    pub user_text_3: Option<ActionField>,
    pub maturity_date: Option<ActionField>,
    pub maturity_price: Option<ActionField>,
}

/// Target instrument of a schedule row: a phantom row index wins over the
/// relation field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentTarget {
    pub instrument: Option<ActionField>,
    pub instrument_phantom: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FactorScheduleAction {
    #[serde(flatten)]
    pub target: InstrumentTarget,
    pub effective_date: Option<ActionField>,
    pub factor_value: Option<ActionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualPricingFormulaAction {
    #[serde(flatten)]
    pub target: InstrumentTarget,
    pub pricing_policy: Option<ActionField>,
    pub expr: Option<ActionField>,
    pub notes: Option<ActionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AccrualScheduleAction {
    #[serde(flatten)]
    pub target: InstrumentTarget,
    pub accrual_start_date: Option<ActionField>,
    pub first_payment_date: Option<ActionField>,
    pub accrual_size: Option<ActionField>,
    pub accrual_calculation_model: Option<ActionField>,
    pub periodicity: Option<ActionField>,
    pub periodicity_n: Option<ActionField>,
    pub eom: Option<ActionField>,
    pub notes: Option<ActionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventScheduleRow {
    #[serde(flatten)]
    pub target: InstrumentTarget,
    pub name: Option<ActionField>,
    pub description: Option<ActionField>,
    pub event_class: Option<ActionField>,
    pub notification_class: Option<ActionField>,
    pub notify_in_n_days: Option<ActionField>,
    pub periodicity: Option<ActionField>,
    pub periodicity_n: Option<ActionField>,
    pub effective_date: Option<ActionField>,
    pub final_date: Option<ActionField>,
}

/// Action attached to an event schedule created by an earlier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EventActionRow {
    /// Order of the event schedule row this action belongs to.
    pub event_schedule_phantom: usize,
    pub transaction_type: Option<ActionField>,
    pub text: Option<ActionField>,
    pub is_sent_to_pending: Option<ActionField>,
    pub is_book_automatic: Option<ActionField>,
    pub button_position: Option<ActionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionAction {
    pub transaction_class: TransactionClass,
    pub instrument: Option<ActionField>,
    pub instrument_phantom: Option<usize>,
    pub transaction_currency: Option<ActionField>,
    pub position_size_with_sign: Option<ActionField>,
    pub settlement_currency: Option<ActionField>,
    pub cash_consideration: Option<ActionField>,
    pub principal_with_sign: Option<ActionField>,
    pub carry_with_sign: Option<ActionField>,
    pub overheads_with_sign: Option<ActionField>,
    pub accounting_date: Option<ActionField>,
    pub cash_date: Option<ActionField>,
    pub portfolio: Option<ActionField>,
    pub account_position: Option<ActionField>,
    pub account_cash: Option<ActionField>,
    pub account_interim: Option<ActionField>,
    pub strategy1_position: Option<ActionField>,
    pub strategy1_cash: Option<ActionField>,
    pub strategy2_position: Option<ActionField>,
    pub strategy2_cash: Option<ActionField>,
    pub strategy3_position: Option<ActionField>,
    pub strategy3_cash: Option<ActionField>,
    pub counterparty: Option<ActionField>,
    pub responsible: Option<ActionField>,
    pub linked_instrument: Option<ActionField>,
    pub linked_instrument_phantom: Option<usize>,
    pub allocation_balance: Option<ActionField>,
    pub allocation_balance_phantom: Option<usize>,
    pub allocation_pl: Option<ActionField>,
    pub allocation_pl_phantom: Option<usize>,
    pub reference_fx_rate: Option<ActionField>,
    pub factor: Option<ActionField>,
    pub trade_price: Option<ActionField>,
    pub is_canceled: Option<ActionField>,
    pub notes: Option<ActionField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionRow {
    Instrument(InstrumentAction),
    FactorSchedule(FactorScheduleAction),
    ManualPricingFormula(ManualPricingFormulaAction),
    AccrualSchedule(AccrualScheduleAction),
    EventSchedule(EventScheduleRow),
    EventScheduleAction(EventActionRow),
    Transaction(TransactionAction),
}

/// One declared action. `order` is the phantom id other rows refer to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTypeAction {
    pub order: usize,
    /// Empty means always; a falsy or failing condition skips the row.
    #[serde(default)]
    pub condition_expr: Option<String>,
    #[serde(default)]
    pub rebook_reaction: Option<RebookReaction>,
    pub row: ActionRow,
}

/// A transaction type template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TransactionType {
    pub id: String,
    pub user_code: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<TransactionTypeInput>,
    #[serde(default)]
    pub actions: Vec<TransactionTypeAction>,
    #[serde(default)]
    pub transaction_unique_code_expr: Option<String>,
    /// Complex transaction date; defaults to the processing date.
    #[serde(default)]
    pub date_expr: Option<String>,
    /// Human-visible text of the complex transaction.
    #[serde(default)]
    pub display_expr: Option<String>,
    /// User field expressions keyed by slot number.
    #[serde(default)]
    pub user_text_exprs: BTreeMap<u8, String>,
    #[serde(default)]
    pub user_number_exprs: BTreeMap<u8, String>,
    #[serde(default)]
    pub user_date_exprs: BTreeMap<u8, String>,
}

impl TransactionType {
    pub fn input(&self, name: &str) -> Option<&TransactionTypeInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    /// Actions sorted by declared order.
    pub fn ordered_actions(&self) -> Vec<&TransactionTypeAction> {
        let mut actions: Vec<&TransactionTypeAction> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.order);
        actions
    }
}

//! Ledger domain models: transactions and complex transactions.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, ValidationError};
use crate::expressions::Value;

/// Closed set of ledger row classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionClass {
    #[default]
    Buy,
    Sell,
    FxTrade,
    InstrumentPl,
    TransactionPl,
    Transfer,
    FxTransfer,
    CashInflow,
    CashOutflow,
}

impl TransactionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionClass::Buy => "BUY",
            TransactionClass::Sell => "SELL",
            TransactionClass::FxTrade => "FX_TRADE",
            TransactionClass::InstrumentPl => "INSTRUMENT_PL",
            TransactionClass::TransactionPl => "TRANSACTION_PL",
            TransactionClass::Transfer => "TRANSFER",
            TransactionClass::FxTransfer => "FX_TRANSFER",
            TransactionClass::CashInflow => "CASH_INFLOW",
            TransactionClass::CashOutflow => "CASH_OUTFLOW",
        }
    }

    /// BUY and SELL rows take part in cost matching.
    pub fn is_trade(&self) -> bool {
        matches!(self, TransactionClass::Buy | TransactionClass::Sell)
    }

    pub fn is_cash_flow(&self) -> bool {
        matches!(self, TransactionClass::CashInflow | TransactionClass::CashOutflow)
    }
}

impl fmt::Display for TransactionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "BUY" => Ok(TransactionClass::Buy),
            "SELL" => Ok(TransactionClass::Sell),
            "FX_TRADE" => Ok(TransactionClass::FxTrade),
            "INSTRUMENT_PL" => Ok(TransactionClass::InstrumentPl),
            "TRANSACTION_PL" => Ok(TransactionClass::TransactionPl),
            "TRANSFER" => Ok(TransactionClass::Transfer),
            "FX_TRANSFER" => Ok(TransactionClass::FxTransfer),
            "CASH_INFLOW" => Ok(TransactionClass::CashInflow),
            "CASH_OUTFLOW" => Ok(TransactionClass::CashOutflow),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown transaction class '{}'",
                other
            )))),
        }
    }
}

/// A single ledger row. Relations hold entity ids; currencies hold codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub transaction_code: i64,
    pub complex_transaction_id: Option<String>,
    pub complex_transaction_order: i32,
    pub transaction_class: TransactionClass,

    pub instrument: Option<String>,
    pub transaction_currency: Option<String>,
    pub position_size_with_sign: Decimal,
    pub settlement_currency: Option<String>,
    pub cash_consideration: Decimal,
    pub principal_with_sign: Decimal,
    pub carry_with_sign: Decimal,
    pub overheads_with_sign: Decimal,

    /// Earliest of the accounting and cash dates.
    pub transaction_date: NaiveDate,
    pub accounting_date: NaiveDate,
    pub cash_date: NaiveDate,

    pub portfolio: Option<String>,
    pub account_position: Option<String>,
    pub account_cash: Option<String>,
    pub account_interim: Option<String>,
    pub strategy1_position: Option<String>,
    pub strategy1_cash: Option<String>,
    pub strategy2_position: Option<String>,
    pub strategy2_cash: Option<String>,
    pub strategy3_position: Option<String>,
    pub strategy3_cash: Option<String>,
    pub counterparty: Option<String>,
    pub responsible: Option<String>,

    pub reference_fx_rate: Decimal,
    pub factor: Decimal,
    pub trade_price: Decimal,
    pub linked_instrument: Option<String>,
    pub allocation_balance: Option<String>,
    pub allocation_pl: Option<String>,

    #[serde(default)]
    pub is_canceled: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Transaction {
    /// Recomputes `transaction_date` from the accounting and cash dates.
    pub fn sync_transaction_date(&mut self) {
        self.transaction_date = self.accounting_date.min(self.cash_date);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplexTransactionStatus {
    #[default]
    Production,
    Pending,
    Ignored,
}

impl ComplexTransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexTransactionStatus::Production => "PRODUCTION",
            ComplexTransactionStatus::Pending => "PENDING",
            ComplexTransactionStatus::Ignored => "IGNORED",
        }
    }
}

/// A group of ledger rows produced by one processor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComplexTransaction {
    pub id: String,
    pub code: i64,
    /// User code of the transaction type that produced it.
    pub transaction_type: String,
    pub status: ComplexTransactionStatus,
    pub transaction_unique_code: Option<String>,
    pub text: Option<String>,
    pub date: NaiveDate,
    /// Input values stored at the last successful booking.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,

    /// User slots keyed by their 1-based number.
    #[serde(default)]
    pub user_text: BTreeMap<u8, String>,
    #[serde(default)]
    pub user_number: BTreeMap<u8, Decimal>,
    #[serde(default)]
    pub user_date: BTreeMap<u8, NaiveDate>,

    #[serde(default)]
    pub is_canceled: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_user_code: Option<String>,
    #[serde(default)]
    pub deleted_transaction_unique_code: Option<String>,
    pub owner: Option<String>,
}

impl ComplexTransaction {
    /// True when it has been stored before (rebook and recalculate).
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }

    /// Soft delete: frees the unique code and keeps the previous codes for audit.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.deleted_user_code = Some(self.code.to_string());
        if self.transaction_unique_code.is_some() {
            self.deleted_transaction_unique_code = self.transaction_unique_code.take();
        }
    }
}

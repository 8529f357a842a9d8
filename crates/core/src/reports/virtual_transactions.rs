//! Report-local copies of ledger rows.
//!
//! Every stored transaction becomes one [`VirtualTransaction`]. Transfers
//! and FX transfers are replaced by two legs, FX trades are split into their
//! two cash legs and every cost-matching closure adds a pair of approach rows
//! that move P&L between the opener and the closer. All of them keep
//! `source_id` pointing at the stored row.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::report_pricing::ReportPricing;
use super::reports_model::{PlBreakdown, PlComponents, ProfitAndLoss, ReportDateField};
use crate::instruments::InstrumentAnalytics;
use crate::transactions::{Transaction, TransactionClass};
use crate::utils::decimal_utils::{safe_div, to_f64};

/// Settlement state of a row on the report date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCase {
    /// Both dates on or before the report date, or both after it.
    #[default]
    Normal,
    /// Accounted but cash not settled; cash sits on the interim account.
    CashPending,
    /// Cash settled but not yet accounted.
    AccountingPending,
}

impl TransactionCase {
    pub fn classify(accounting_date: NaiveDate, cash_date: NaiveDate, report_date: NaiveDate) -> Self {
        if accounting_date <= report_date && report_date < cash_date {
            TransactionCase::CashPending
        } else if cash_date <= report_date && report_date < accounting_date {
            TransactionCase::AccountingPending
        } else {
            TransactionCase::Normal
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TransactionCase::Normal => 0,
            TransactionCase::CashPending => 1,
            TransactionCase::AccountingPending => 2,
        }
    }

    /// Cases whose accounting side is visible on the report date.
    pub fn is_accounted(&self) -> bool {
        !matches!(self, TransactionCase::AccountingPending)
    }
}

/// How a virtual row was derived from its stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VirtualOrigin {
    #[default]
    Stored,
    TransferLeg,
    FxTransferLeg,
    FxTradeLeg,
    Approach,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VirtualTransaction {
    pub id: String,
    pub source_id: String,
    pub transaction_code: i64,
    pub class: TransactionClass,
    pub origin: VirtualOrigin,
    pub case: TransactionCase,

    pub instrument: Option<String>,
    pub transaction_currency: Option<String>,
    pub settlement_currency: Option<String>,
    pub position_size: Decimal,
    pub cash: Decimal,
    pub principal: Decimal,
    pub carry: Decimal,
    pub overheads: Decimal,
    pub reference_fx_rate: Decimal,
    pub trade_price: Decimal,

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
    pub linked_instrument: Option<String>,
    pub allocation: Option<String>,
    pub notes: Option<String>,

    /// Closed share of the position.
    pub multiplier: Decimal,
    /// Later rows that closed part of this one: (row index, multiplier delta).
    pub closed_by: Vec<(usize, Decimal)>,
    pub rolling_position: Decimal,
    pub remaining_position: Decimal,
    /// Remaining position of the whole matching key.
    pub balance_position: Decimal,

    /// Report-currency P&L of the row.
    pub pl: ProfitAndLoss,
    /// Realized P&L attributed by cost matching.
    pub total_real: Decimal,
    pub mismatch: Decimal,

    pub gross_cost: Decimal,
    pub net_cost: Decimal,
    pub principal_invested: Decimal,
    pub amount_invested: Decimal,
    pub ytm: f64,
    pub time_invested_days: f64,
    pub weighted_ytm: f64,
    pub weighted_time_invested_days: f64,
}

impl VirtualTransaction {
    pub fn from_transaction(transaction: &Transaction, report_date: NaiveDate) -> Self {
        let t = transaction;
        VirtualTransaction {
            id: t.id.clone(),
            source_id: t.id.clone(),
            transaction_code: t.transaction_code,
            class: t.transaction_class,
            origin: VirtualOrigin::Stored,
            case: TransactionCase::classify(t.accounting_date, t.cash_date, report_date),
            instrument: t.instrument.clone(),
            transaction_currency: t.transaction_currency.clone(),
            settlement_currency: t.settlement_currency.clone(),
            position_size: t.position_size_with_sign,
            cash: t.cash_consideration,
            principal: t.principal_with_sign,
            carry: t.carry_with_sign,
            overheads: t.overheads_with_sign,
            reference_fx_rate: t.reference_fx_rate,
            trade_price: t.trade_price,
            transaction_date: t.transaction_date,
            accounting_date: t.accounting_date,
            cash_date: t.cash_date,
            portfolio: t.portfolio.clone(),
            account_position: t.account_position.clone(),
            account_cash: t.account_cash.clone(),
            account_interim: t.account_interim.clone(),
            strategy1_position: t.strategy1_position.clone(),
            strategy1_cash: t.strategy1_cash.clone(),
            strategy2_position: t.strategy2_position.clone(),
            strategy2_cash: t.strategy2_cash.clone(),
            strategy3_position: t.strategy3_position.clone(),
            strategy3_cash: t.strategy3_cash.clone(),
            linked_instrument: t.linked_instrument.clone(),
            allocation: t.allocation_balance.clone(),
            notes: t.notes.clone(),
            ..Default::default()
        }
    }

    /// Date used for selection and ordering.
    pub fn date_by(&self, field: ReportDateField) -> NaiveDate {
        match field {
            ReportDateField::TransactionDate => self.transaction_date,
            ReportDateField::AccountingDate => self.accounting_date,
            ReportDateField::CashDate => self.cash_date,
        }
    }

    pub fn is_cloned(&self) -> bool {
        self.origin != VirtualOrigin::Stored
    }

    fn derived(&self, suffix: &str, origin: VirtualOrigin) -> Self {
        VirtualTransaction {
            id: format!("{}:{}", self.id, suffix),
            origin,
            closed_by: Vec::new(),
            ..self.clone()
        }
    }

    /// Replaces a TRANSFER by a SELL/BUY pair. The first leg stays on the
    /// position account and strategies, the second moves to the cash side.
    pub fn split_transfer(&self) -> (Self, Self) {
        let (first_class, second_class, pos_sign, cash_sign) =
            if self.position_size >= Decimal::ZERO {
                (TransactionClass::Sell, TransactionClass::Buy, Decimal::ONE, Decimal::NEGATIVE_ONE)
            } else {
                (TransactionClass::Buy, TransactionClass::Sell, Decimal::NEGATIVE_ONE, Decimal::ONE)
            };

        let mut first = self.derived("t1", VirtualOrigin::TransferLeg);
        first.class = first_class;
        first.account_cash = self.account_position.clone();
        first.strategy1_cash = self.strategy1_position.clone();
        first.strategy2_cash = self.strategy2_position.clone();
        first.strategy3_cash = self.strategy3_position.clone();
        first.position_size = self.position_size.abs() * pos_sign;
        first.cash = self.cash.abs() * cash_sign;
        first.principal = self.principal.abs() * cash_sign;
        first.carry = self.carry.abs() * cash_sign;
        first.overheads = self.overheads.abs() * cash_sign;

        let mut second = self.derived("t2", VirtualOrigin::TransferLeg);
        second.class = second_class;
        second.account_position = self.account_cash.clone();
        second.strategy1_position = self.strategy1_cash.clone();
        second.strategy2_position = self.strategy2_cash.clone();
        second.strategy3_position = self.strategy3_cash.clone();
        second.position_size = -first.position_size;
        second.cash = -first.cash;
        second.principal = -first.principal;
        second.carry = -first.carry;
        second.overheads = -first.overheads;

        (first, second)
    }

    /// Replaces an FX-TRANSFER by two single-currency FX-TRADE legs moving
    /// `position_size` of the transaction currency between the position and
    /// cash accounts.
    pub fn split_fx_transfer(&self) -> (Self, Self) {
        let leg = |suffix: &str, amount: Decimal, account: &Option<String>, strategies: [&Option<String>; 3]| {
            let mut t = self.derived(suffix, VirtualOrigin::FxTransferLeg);
            t.class = TransactionClass::FxTrade;
            t.settlement_currency = self.transaction_currency.clone();
            t.position_size = amount;
            t.cash = amount;
            t.principal = amount;
            t.carry = Decimal::ZERO;
            t.overheads = Decimal::ZERO;
            t.reference_fx_rate = Decimal::ONE;
            t.account_position = account.clone();
            t.account_cash = account.clone();
            t.strategy1_position = strategies[0].clone();
            t.strategy1_cash = strategies[0].clone();
            t.strategy2_position = strategies[1].clone();
            t.strategy2_cash = strategies[1].clone();
            t.strategy3_position = strategies[2].clone();
            t.strategy3_cash = strategies[2].clone();
            t
        };

        let first = leg(
            "t1",
            self.position_size,
            &self.account_position,
            [&self.strategy1_position, &self.strategy2_position, &self.strategy3_position],
        );
        let second = leg(
            "t2",
            -self.position_size,
            &self.account_cash,
            [&self.strategy1_cash, &self.strategy2_cash, &self.strategy3_cash],
        );
        (first, second)
    }

    /// Splits an FX-TRADE into its bought and sold cash legs. The bought leg
    /// settles in the transaction currency on the position account.
    pub fn split_fx_trade(&self) -> (Self, Self) {
        let mut bought = self.derived("t1", VirtualOrigin::FxTradeLeg);
        bought.settlement_currency = self.transaction_currency.clone();
        bought.cash = self.position_size;
        bought.principal = self.position_size;
        bought.carry = Decimal::ZERO;
        bought.overheads = Decimal::ZERO;
        bought.reference_fx_rate = Decimal::ONE;
        bought.account_cash = self.account_position.clone();
        bought.strategy1_cash = self.strategy1_position.clone();
        bought.strategy2_cash = self.strategy2_position.clone();
        bought.strategy3_cash = self.strategy3_position.clone();

        let mut sold = self.derived("t2", VirtualOrigin::FxTradeLeg);
        sold.position_size = self.principal;
        sold.reference_fx_rate = safe_div(self.position_size, self.principal).abs();

        (bought, sold)
    }

    /// P&L transfer between a closed row and the row that closed it.
    ///
    /// The first row sits on the closed row's dimensions with the closer's
    /// class, the second mirrors it on the closer. Both are fully closed and
    /// carry no cash or position.
    pub fn approach_pair(
        closed: &VirtualTransaction,
        closer: &VirtualTransaction,
        delta: Decimal,
        begin_multiplier: Decimal,
        end_multiplier: Decimal,
    ) -> (Self, Self) {
        let matched = (closed.position_size * delta).abs();
        let abm = begin_multiplier * safe_div(matched, closed.position_size).abs();
        let aem = end_multiplier * safe_div(matched, closer.position_size).abs();

        let mut transfer = closed.pl.scaled(abm);
        transfer += closer.pl.scaled(aem);
        let transfer = (-transfer).as_closed();

        let approach = |base: &VirtualTransaction, suffix: &str, class, position, pl| {
            let mut t = base.derived(suffix, VirtualOrigin::Approach);
            t.id = format!("{}:{}:{}", suffix, closed.id, closer.id);
            t.class = class;
            t.position_size = position;
            t.multiplier = Decimal::ONE;
            t.cash = Decimal::ZERO;
            t.principal = Decimal::ZERO;
            t.carry = Decimal::ZERO;
            t.overheads = Decimal::ZERO;
            t.mismatch = Decimal::ZERO;
            t.total_real = Decimal::ZERO;
            t.gross_cost = Decimal::ZERO;
            t.net_cost = Decimal::ZERO;
            t.principal_invested = Decimal::ZERO;
            t.amount_invested = Decimal::ZERO;
            t.ytm = 0.0;
            t.time_invested_days = 0.0;
            t.weighted_ytm = 0.0;
            t.weighted_time_invested_days = 0.0;
            t.pl = pl;
            t
        };

        let first = approach(closed, "a1", closer.class, -matched, transfer);
        let second = approach(closer, "a2", closed.class, matched, -transfer);
        (first, second)
    }

    /// Computes report-currency P&L, cost analytics and the mismatch.
    pub fn calc(&mut self, pricing: &ReportPricing, analytics: &InstrumentAnalytics) {
        let settlement_fx = pricing.fx(self.settlement_currency.as_deref());
        let trade_fx = pricing.fx_on(self.transaction_currency.as_deref(), self.accounting_date);
        let pl_fx_mul = settlement_fx - self.reference_fx_rate * trade_fx;
        let pl_fixed_mul = self.reference_fx_rate * trade_fx;
        let raw = PlComponents::new(self.principal, self.carry, self.overheads);

        match self.class {
            TransactionClass::Buy
            | TransactionClass::Sell
            | TransactionClass::TransactionPl
            | TransactionClass::InstrumentPl
            | TransactionClass::FxTrade => {
                let m = self.multiplier;
                self.pl = ProfitAndLoss {
                    full: PlBreakdown::split(raw * settlement_fx, m),
                    fx: PlBreakdown::split(raw * pl_fx_mul, m),
                    fixed: if self.class == TransactionClass::FxTrade {
                        PlBreakdown::default()
                    } else {
                        PlBreakdown::split(raw * pl_fixed_mul, m)
                    },
                };
                if !self.is_cloned() {
                    self.calc_cost(pricing, analytics);
                }
            }
            TransactionClass::CashInflow | TransactionClass::CashOutflow => {
                let fx_result = PlComponents::new(self.cash * pl_fx_mul, Decimal::ZERO, Decimal::ZERO);
                self.pl = ProfitAndLoss {
                    full: PlBreakdown::closed(fx_result),
                    fx: PlBreakdown::closed(fx_result),
                    fixed: PlBreakdown::default(),
                };
            }
            TransactionClass::Transfer | TransactionClass::FxTransfer => {}
        }

        self.mismatch = if self.class.is_cash_flow() {
            Decimal::ZERO
        } else {
            self.cash - raw.total
        };
    }

    fn calc_cost(&mut self, pricing: &ReportPricing, analytics: &InstrumentAnalytics) {
        let instrument = match self.instrument.as_deref().and_then(|id| pricing.instrument(id)) {
            Some(instrument) => instrument,
            None => return,
        };
        let pricing_fx = pricing.fx(Some(&instrument.pricing_currency));
        let trade_fx = pricing.fx(self.transaction_currency.as_deref());
        let open_share = Decimal::ONE - self.multiplier;
        let to_cost = self.reference_fx_rate * safe_div(trade_fx, pricing_fx) * open_share;
        let full = self.pl.full.all;
        let units = self.position_size * instrument.price_multiplier;

        self.gross_cost = safe_div(full.principal * to_cost, units);
        self.net_cost = safe_div((full.principal + full.overheads) * to_cost, units);
        self.principal_invested = full.principal * to_cost;
        self.amount_invested = full.total * to_cost;

        if self.class.is_trade() {
            if !instrument.accrual_calculation_schedules.is_empty() {
                self.ytm = analytics.ytm(instrument, self.accounting_date, to_f64(self.trade_price));
            }
            self.time_invested_days = (pricing.report_date() - self.accounting_date).num_days() as f64;
        }
    }

    /// Weights the cost analytics by this row's share of the key's balance.
    pub fn weigh(&mut self) {
        let share = to_f64(safe_div(self.remaining_position, self.balance_position));
        self.weighted_ytm = self.ytm * share;
        self.weighted_time_invested_days = self.time_invested_days * share;
    }

    /// Adds `amount` of realized P&L (report currency).
    pub fn add_realized(&mut self, amount: Decimal) {
        self.total_real += amount;
    }
}

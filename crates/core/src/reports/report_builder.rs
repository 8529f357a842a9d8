use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use rust_decimal::Decimal;

use super::multipliers::{annotate_multipliers, Closure};
use super::report_pricing::ReportPricing;
use super::reports_model::{
    CustomColumn, PlComponents, Report, ReportDateField, ReportItem, ReportItemKind, ReportSpec,
    ReportSummary,
};
use super::virtual_transactions::{TransactionCase, VirtualOrigin, VirtualTransaction};
use crate::errors::Result;
use crate::expressions::{evaluate, Namespace};
use crate::instruments::{
    InstrumentAnalytics, InstrumentClass, InstrumentRepositoryTrait, SolverConfig,
};
use crate::pricing::{CurrencyHistory, PriceIndex, PricingRepositoryTrait};
use crate::settings::CoreSettings;
use crate::transactions::{
    Transaction, TransactionClass, TransactionRepositoryTrait, INVALID_EXPRESSION_VALUE,
};
use crate::utils::decimal_utils::{from_f64, is_zero, safe_div, to_f64};
use crate::utils::CancellationToken;

/// Builds balance and P&L reports from the stored ledger.
pub trait ReportBuilderTrait: Send + Sync {
    fn build_report(&self, spec: &ReportSpec, cancel: &CancellationToken) -> Result<Report>;
}

pub struct ReportBuilder {
    transaction_repository: Arc<dyn TransactionRepositoryTrait>,
    instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
    pricing_repository: Arc<dyn PricingRepositoryTrait>,
    analytics: InstrumentAnalytics,
    system_currency: String,
    approach_multiplier: Decimal,
}

impl ReportBuilder {
    pub fn new(
        transaction_repository: Arc<dyn TransactionRepositoryTrait>,
        instrument_repository: Arc<dyn InstrumentRepositoryTrait>,
        pricing_repository: Arc<dyn PricingRepositoryTrait>,
    ) -> Self {
        ReportBuilder {
            transaction_repository,
            instrument_repository,
            pricing_repository,
            analytics: InstrumentAnalytics::default(),
            system_currency: String::new(),
            approach_multiplier: Decimal::ZERO,
        }
        .with_settings(&CoreSettings::default())
    }

    /// Applies the tenant's system currency, approach multiplier and yield
    /// solver settings.
    pub fn with_settings(mut self, settings: &CoreSettings) -> Self {
        self.system_currency = settings.system_currency.clone();
        self.approach_multiplier = from_f64(settings.approach_multiplier);
        self.analytics = InstrumentAnalytics::with_solver(SolverConfig {
            tolerance: settings.ytm_tolerance,
            max_iterations: settings.ytm_max_iterations as usize,
        });
        self
    }

    pub fn with_analytics(mut self, analytics: InstrumentAnalytics) -> Self {
        self.analytics = analytics;
        self
    }

    /// Selected stored rows, sorted by (date, code, id), with transfers
    /// replaced by their legs.
    fn load_rows(&self, spec: &ReportSpec, cancel: &CancellationToken) -> Result<Vec<VirtualTransaction>> {
        let mut selected: Vec<VirtualTransaction> = Vec::new();
        for transaction in self.transaction_repository.list_transactions()? {
            cancel.check()?;
            if !is_selected(&transaction, spec) {
                continue;
            }
            selected.push(VirtualTransaction::from_transaction(&transaction, spec.report_date));
        }

        selected.sort_by(|a, b| {
            a.date_by(spec.date_field)
                .cmp(&b.date_by(spec.date_field))
                .then(a.transaction_code.cmp(&b.transaction_code))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut rows = Vec::with_capacity(selected.len());
        for row in selected {
            match row.class {
                TransactionClass::Transfer => {
                    let (first, second) = row.split_transfer();
                    rows.push(first);
                    rows.push(second);
                }
                TransactionClass::FxTransfer => {
                    let (first, second) = row.split_fx_transfer();
                    rows.push(first);
                    rows.push(second);
                }
                _ => rows.push(row),
            }
        }
        Ok(rows)
    }

    fn load_pricing(&self, spec: &ReportSpec) -> Result<ReportPricing> {
        let instruments = self.instrument_repository.list_instruments()?;
        let prices = self
            .pricing_repository
            .get_price_histories(&spec.pricing_policy, spec.report_date)?;
        let currencies = self
            .pricing_repository
            .get_currency_histories(&spec.pricing_policy, spec.report_date)?;

        Ok(ReportPricing::new(
            spec.report_date,
            spec.report_currency.clone(),
            spec.pricing_policy.clone(),
            CurrencyHistory::new(self.system_currency.clone(), currencies),
            PriceIndex::new(prices),
            instruments,
        ))
    }

    /// Ids of contract-for-difference instruments among `rows`.
    fn cfd_instruments(&self, rows: &[VirtualTransaction], pricing: &ReportPricing) -> HashSet<String> {
        let mut class_by_type: HashMap<String, InstrumentClass> = HashMap::new();
        let mut cfds = HashSet::new();
        for id in rows.iter().filter_map(|r| r.instrument.as_deref()) {
            let instrument = match pricing.instrument(id) {
                Some(instrument) => instrument,
                None => continue,
            };
            let class = match class_by_type.get(&instrument.instrument_type) {
                Some(class) => *class,
                None => {
                    let class = match self
                        .instrument_repository
                        .get_instrument_type(&instrument.instrument_type)
                    {
                        Ok(instrument_type) => instrument_type.instrument_class,
                        Err(e) => {
                            debug!(
                                "Instrument type {} not found: {}",
                                instrument.instrument_type, e
                            );
                            InstrumentClass::General
                        }
                    };
                    class_by_type.insert(instrument.instrument_type.clone(), class);
                    class
                }
            };
            if class == InstrumentClass::ContractForDifference {
                cfds.insert(id.to_string());
            }
        }
        cfds
    }
}

impl ReportBuilderTrait for ReportBuilder {
    fn build_report(&self, spec: &ReportSpec, cancel: &CancellationToken) -> Result<Report> {
        debug!(
            "Building report on {} in {} ({})",
            spec.report_date, spec.report_currency, spec.pricing_policy
        );
        let mut rows = self.load_rows(spec, cancel)?;
        let pricing = self.load_pricing(spec)?;

        let cfds = self.cfd_instruments(&rows, &pricing);
        let closures = annotate_multipliers(&mut rows, spec, |id| cfds.contains(id));

        for row in rows.iter_mut() {
            cancel.check()?;
            row.calc(&pricing, &self.analytics);
        }

        attribute_realized(&mut rows, &closures, spec.pl_real_unreal_end_multiplier);
        for row in rows.iter_mut().filter(|r| r.class.is_trade()) {
            row.weigh();
        }

        let begin = spec.approach_multiplier.unwrap_or(self.approach_multiplier);
        let expanded = self.expand(&rows, &pricing, begin, Decimal::ONE - begin);

        let mut book = ItemBook::new(spec);
        for row in &expanded {
            cancel.check()?;
            book.add_row(row);
        }
        for row in rows.iter().filter(|r| r.origin == VirtualOrigin::Stored) {
            book.add_mismatch(row);
        }

        let (mut items, mismatch_items) = book.into_items();
        for item in items.iter_mut() {
            self.finalize(item, &pricing);
        }
        apply_custom_columns(&mut items, &spec.custom_columns);

        let summary = summarize(&items, &pricing);
        info!(
            "Report on {}: {} rows, {} items, {} mismatches",
            spec.report_date,
            expanded.len(),
            items.len(),
            mismatch_items.len()
        );

        Ok(Report {
            spec: spec.clone(),
            items,
            mismatch_items,
            summary,
        })
    }
}

impl ReportBuilder {
    /// Replaces stored FX trades by their legs and adds the approach pair of
    /// every closed trade after it.
    fn expand(
        &self,
        rows: &[VirtualTransaction],
        pricing: &ReportPricing,
        begin: Decimal,
        end: Decimal,
    ) -> Vec<VirtualTransaction> {
        let mut expanded = Vec::with_capacity(rows.len());
        for row in rows {
            if row.class == TransactionClass::FxTrade && row.origin == VirtualOrigin::Stored {
                let (mut bought, mut sold) = row.split_fx_trade();
                bought.calc(pricing, &self.analytics);
                sold.calc(pricing, &self.analytics);
                expanded.push(bought);
                expanded.push(sold);
                continue;
            }

            expanded.push(row.clone());
            if row.class.is_trade() {
                for &(closer, delta) in &row.closed_by {
                    let (first, second) =
                        VirtualTransaction::approach_pair(row, &rows[closer], delta, begin, end);
                    expanded.push(first);
                    expanded.push(second);
                }
            }
        }
        expanded
    }

    fn finalize(&self, item: &mut ReportItem, pricing: &ReportPricing) {
        match item.kind {
            ReportItemKind::Currency => {
                item.fx_rate = pricing.fx(item.currency.as_deref());
                item.pricing_currency = item.currency.clone();
                item.market_value = item.position_size * item.fx_rate;
            }
            ReportItemKind::Instrument => self.value_instrument(item, pricing),
            _ => {}
        }

        let to_loc = safe_div(Decimal::ONE, item.fx_rate);
        item.market_value_loc = item.market_value * to_loc;
        item.exposure_loc = item.exposure * to_loc;
        item.gross_cost_price = -item.gross_cost_price * to_loc;
        item.net_cost_price = -item.net_cost_price * to_loc;
        item.market_value_system = pricing.to_system(item.market_value);
        item.time_invested = item.time_invested_days / 365.0;
        item.is_empty = is_zero(item.position_size)
            && is_zero(item.market_value)
            && is_zero(item.pl.full.all.total);
    }

    fn value_instrument(&self, item: &mut ReportItem, pricing: &ReportPricing) {
        let instrument = match item.instrument.as_deref().and_then(|id| pricing.instrument(id)) {
            Some(instrument) => instrument,
            None => {
                warn!("Report item {} has no known instrument", item.id);
                return;
            }
        };

        let (principal_price, accrued_price) = pricing.price(instrument);
        let pricing_fx = pricing.fx(Some(&instrument.pricing_currency));
        let accrued_currency = if instrument.accrued_currency.is_empty() {
            &instrument.pricing_currency
        } else {
            &instrument.accrued_currency
        };
        let accrued_fx = pricing.fx(Some(accrued_currency));

        let position = item.position_size;
        let principal_value = position * instrument.price_multiplier * principal_price * pricing_fx;
        let accrued_value = position * instrument.accrued_multiplier * accrued_price * accrued_fx;

        item.name = instrument.user_code.clone();
        item.pricing_currency = Some(instrument.pricing_currency.clone());
        item.principal_price = principal_price;
        item.accrued_price = accrued_price;
        item.fx_rate = pricing_fx;
        item.market_value = principal_value + accrued_value;
        item.exposure = item.market_value;

        let valuation = PlComponents::new(principal_value, accrued_value, Decimal::ZERO);
        item.pl.full.all += valuation;
        item.pl.full.opened += valuation;
        item.pl.fixed.all += valuation;
        item.pl.fixed.opened += valuation;
        item.total_unreal = item.market_value + item.cost;

        let opened = item.pl.full.opened;
        item.pos_return = safe_div(
            safe_div(opened.principal + opened.carry, item.principal_invested),
            pricing_fx,
        );
        item.net_pos_return = safe_div(opened.total, item.principal_invested);

        if !instrument.accrual_calculation_schedules.is_empty() && !is_zero(position) {
            let date = pricing.report_date();
            item.ytm = self.analytics.ytm(instrument, date, to_f64(principal_price));
            item.modified_duration = self.analytics.modified_duration(instrument, date, item.ytm);
        }
    }
}

fn matches_any(filter: &[String], values: &[&Option<String>]) -> bool {
    filter.is_empty()
        || values
            .iter()
            .any(|v| v.as_ref().map_or(false, |v| filter.contains(v)))
}

fn is_selected(t: &Transaction, spec: &ReportSpec) -> bool {
    if t.is_canceled {
        return false;
    }
    let date = match spec.date_field {
        ReportDateField::TransactionDate => t.transaction_date,
        ReportDateField::AccountingDate => t.accounting_date,
        ReportDateField::CashDate => t.cash_date,
    };
    date <= spec.report_date
        && matches_any(&spec.portfolios, &[&t.portfolio])
        && matches_any(
            &spec.accounts,
            &[&t.account_position, &t.account_cash, &t.account_interim],
        )
        && matches_any(&spec.strategies1, &[&t.strategy1_position, &t.strategy1_cash])
        && matches_any(&spec.strategies2, &[&t.strategy2_position, &t.strategy2_cash])
        && matches_any(&spec.strategies3, &[&t.strategy3_position, &t.strategy3_cash])
        && (spec.transaction_classes.is_empty()
            || spec.transaction_classes.contains(&t.transaction_class))
}

/// Splits the realized P&L of every closure between its rows: the closer
/// gets `end_multiplier` of the matched total, the closed rows the rest in
/// proportion to the position they gave up.
fn attribute_realized(rows: &mut [VirtualTransaction], closures: &[Closure], end_multiplier: Decimal) {
    let begin_multiplier = Decimal::ONE - end_multiplier;
    for closure in closures {
        let closer_delta = match closure.deltas.last() {
            Some(&(_, delta)) => delta,
            None => continue,
        };
        let closer_units = rows[closure.closer].position_size * closer_delta;
        let sum_total: Decimal = closure
            .deltas
            .iter()
            .map(|(i, d)| *d * rows[*i].pl.full.all.total)
            .sum();

        for &(i, delta) in &closure.deltas {
            let share = if i == closure.closer {
                end_multiplier
            } else {
                begin_multiplier
            };
            let matched = safe_div(rows[i].position_size * delta, closer_units).abs();
            rows[i].add_realized(sum_total * matched * share);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ItemKey {
    kind: ReportItemKind,
    portfolio: Option<String>,
    account: Option<String>,
    strategy1: Option<String>,
    strategy2: Option<String>,
    strategy3: Option<String>,
    instrument: Option<String>,
    currency: Option<String>,
    notes: Option<String>,
    transaction_id: Option<String>,
}

impl ItemKey {
    fn id(&self) -> String {
        let parts = [
            &self.portfolio,
            &self.account,
            &self.strategy1,
            &self.strategy2,
            &self.strategy3,
            &self.instrument,
            &self.currency,
            &self.notes,
            &self.transaction_id,
        ];
        let parts: Vec<&str> = parts.iter().map(|p| p.as_deref().unwrap_or("-")).collect();
        format!("{}:{}", self.kind.as_str(), parts.join("|"))
    }
}

/// Side of a row an item is booked on.
#[derive(Clone, Copy)]
enum Side {
    Position,
    Cash,
    Interim,
}

struct ItemBook<'a> {
    spec: &'a ReportSpec,
    entries: BTreeMap<ItemKey, ReportItem>,
    mismatch_entries: BTreeMap<ItemKey, ReportItem>,
}

impl<'a> ItemBook<'a> {
    fn new(spec: &'a ReportSpec) -> Self {
        ItemBook {
            spec,
            entries: BTreeMap::new(),
            mismatch_entries: BTreeMap::new(),
        }
    }

    fn key(&self, kind: ReportItemKind, row: &VirtualTransaction, side: Side) -> ItemKey {
        let spec = self.spec;
        let pick = |active: bool, value: &Option<String>| if active { value.clone() } else { None };
        let (account, s1, s2, s3) = match side {
            Side::Position => (
                &row.account_position,
                &row.strategy1_position,
                &row.strategy2_position,
                &row.strategy3_position,
            ),
            Side::Cash => (
                &row.account_cash,
                &row.strategy1_cash,
                &row.strategy2_cash,
                &row.strategy3_cash,
            ),
            Side::Interim => (
                &row.account_interim,
                &row.strategy1_cash,
                &row.strategy2_cash,
                &row.strategy3_cash,
            ),
        };
        let with_notes = matches!(
            kind,
            ReportItemKind::TransactionPl | ReportItemKind::FxTrade | ReportItemKind::CashInOut
        );
        ItemKey {
            kind,
            portfolio: pick(spec.slice_by_portfolio, &row.portfolio),
            account: pick(spec.slice_by_account, account),
            strategy1: pick(spec.slice_by_strategy1, s1),
            strategy2: pick(spec.slice_by_strategy2, s2),
            strategy3: pick(spec.slice_by_strategy3, s3),
            instrument: match kind {
                ReportItemKind::Instrument => row.instrument.clone(),
                _ => None,
            },
            currency: match kind {
                ReportItemKind::Currency => row.settlement_currency.clone(),
                _ => None,
            },
            notes: if with_notes { row.notes.clone() } else { None },
            transaction_id: if spec.show_transaction_details {
                Some(row.source_id.clone())
            } else {
                None
            },
        }
    }

    fn entry(&mut self, key: ItemKey) -> &mut ReportItem {
        self.entries.entry(key.clone()).or_insert_with(|| item_for(&key))
    }

    fn add_row(&mut self, row: &VirtualTransaction) {
        let accounted = row.case.is_accounted();
        match row.class {
            TransactionClass::Buy | TransactionClass::Sell => {
                if accounted {
                    self.add_instrument(row, row.position_size * (Decimal::ONE - row.multiplier));
                }
                self.add_cash(row, row.cash);
            }
            TransactionClass::InstrumentPl => {
                if accounted {
                    self.add_instrument(row, Decimal::ZERO);
                }
                self.add_cash(row, row.cash);
            }
            TransactionClass::TransactionPl => {
                if accounted {
                    self.add_pl(ReportItemKind::TransactionPl, row);
                }
                self.add_cash(row, row.cash);
            }
            TransactionClass::FxTrade => {
                if accounted {
                    self.add_pl(ReportItemKind::FxTrade, row);
                }
                self.add_cash(row, row.principal);
            }
            TransactionClass::CashInflow | TransactionClass::CashOutflow => {
                if accounted {
                    self.add_pl(ReportItemKind::CashInOut, row);
                }
                self.add_cash(row, row.cash);
            }
            TransactionClass::Transfer | TransactionClass::FxTransfer => {}
        }
    }

    fn add_instrument(&mut self, row: &VirtualTransaction, position: Decimal) {
        let key = self.key(ReportItemKind::Instrument, row, Side::Position);
        let item = self.entry(key);
        item.position_size += position;
        item.pl += row.pl;
        item.total_real += row.total_real;
        item.cost += row.pl.full.all.principal * (Decimal::ONE - row.multiplier);
        item.gross_cost_price += row.gross_cost;
        item.net_cost_price += row.net_cost;
        item.principal_invested += row.principal_invested;
        item.amount_invested += row.amount_invested;
        if !row.is_cloned() && row.class.is_trade() {
            item.ytm_at_cost += row.weighted_ytm;
            item.time_invested_days += row.weighted_time_invested_days;
            if row.notes.is_some() {
                item.notes = row.notes.clone();
            }
        }
    }

    fn add_pl(&mut self, kind: ReportItemKind, row: &VirtualTransaction) {
        let key = self.key(kind, row, Side::Position);
        let item = self.entry(key);
        item.pl += row.pl;
        item.total_real += row.pl.full.closed.total;
    }

    /// Books `amount` of the settlement currency by settlement case.
    fn add_cash(&mut self, row: &VirtualTransaction, amount: Decimal) {
        if row.settlement_currency.is_none() || is_zero(amount) {
            return;
        }
        match row.case {
            TransactionCase::Normal => self.add_currency(row, Side::Cash, amount),
            TransactionCase::CashPending => self.add_currency(row, Side::Interim, amount),
            TransactionCase::AccountingPending => {
                self.add_currency(row, Side::Cash, amount);
                self.add_currency(row, Side::Interim, -amount);
            }
        }
    }

    fn add_currency(&mut self, row: &VirtualTransaction, side: Side, amount: Decimal) {
        let key = self.key(ReportItemKind::Currency, row, side);
        self.entry(key).position_size += amount;
    }

    fn add_mismatch(&mut self, row: &VirtualTransaction) {
        if row.linked_instrument.is_none() || is_zero(row.mismatch) {
            return;
        }
        let key = ItemKey {
            kind: ReportItemKind::Mismatch,
            portfolio: row.portfolio.clone(),
            account: row.account_cash.clone(),
            strategy1: None,
            strategy2: None,
            strategy3: None,
            instrument: row.linked_instrument.clone(),
            currency: row.settlement_currency.clone(),
            notes: None,
            transaction_id: None,
        };
        let item = self
            .mismatch_entries
            .entry(key.clone())
            .or_insert_with(|| item_for(&key));
        item.mismatch_portfolio = row.portfolio.clone();
        item.mismatch_account = row.account_cash.clone();
        item.mismatch += row.mismatch;
    }
}

impl<'a> ItemBook<'a> {
    fn into_items(self) -> (Vec<ReportItem>, Vec<ReportItem>) {
        (
            self.entries.into_values().collect(),
            self.mismatch_entries.into_values().collect(),
        )
    }
}

fn item_for(key: &ItemKey) -> ReportItem {
    ReportItem {
        id: key.id(),
        kind: key.kind,
        name: key
            .instrument
            .clone()
            .or_else(|| key.currency.clone())
            .or_else(|| key.notes.clone())
            .unwrap_or_else(|| key.kind.as_str().to_string()),
        instrument: key.instrument.clone(),
        currency: key.currency.clone(),
        portfolio: key.portfolio.clone(),
        account: key.account.clone(),
        strategy1: key.strategy1.clone(),
        strategy2: key.strategy2.clone(),
        strategy3: key.strategy3.clone(),
        notes: key.notes.clone(),
        transaction_id: key.transaction_id.clone(),
        ..Default::default()
    }
}

/// Evaluates every custom column with the item bound as `item`. A failing
/// expression stores the invalid-expression marker.
fn apply_custom_columns(items: &mut [ReportItem], columns: &[CustomColumn]) {
    if columns.is_empty() {
        return;
    }
    for item in items.iter_mut() {
        let mut names = Namespace::new();
        names.insert("item".to_string(), item.to_value());
        for column in columns {
            let value = match evaluate(&column.expr, &names) {
                Ok(value) => value.to_json(),
                Err(e) => {
                    debug!("Custom column {} on {}: {}", column.name, item.id, e);
                    serde_json::Value::String(INVALID_EXPRESSION_VALUE.to_string())
                }
            };
            item.custom_fields.insert(column.name.clone(), value);
        }
    }
}

fn summarize(items: &[ReportItem], pricing: &ReportPricing) -> ReportSummary {
    let mut summary = ReportSummary {
        item_count: items.len(),
        ..Default::default()
    };
    for item in items {
        summary.market_value += item.market_value;
        summary.exposure += item.exposure;
        summary.total += item.pl.full.all.total;
        summary.total_closed += item.pl.full.closed.total;
        summary.total_opened += item.pl.full.opened.total;
        summary.total_fx += item.pl.fx.all.total;
        summary.total_fixed += item.pl.fixed.all.total;
        summary.total_real += item.total_real;
        summary.total_unreal += item.total_unreal;
    }
    summary.market_value_system = pricing.to_system(summary.market_value);
    summary.exposure_system = pricing.to_system(summary.exposure);
    summary.total_system = pricing.to_system(summary.total);
    summary
}

//! AVCO and FIFO cost matching over a sorted stream of virtual rows.

use log::debug;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::reports_model::{CostMethod, ReportSpec};
use super::virtual_transactions::VirtualTransaction;
use crate::transactions::TransactionClass;
use crate::utils::decimal_utils::{is_close, is_zero, safe_div};

/// Dimensions a running position is kept per. Inactive slicing
/// dimensions are left empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PositionKey {
    pub portfolio: Option<String>,
    pub account: Option<String>,
    pub strategy1: Option<String>,
    pub strategy2: Option<String>,
    pub strategy3: Option<String>,
    pub allocation: Option<String>,
    pub instrument: Option<String>,
}

impl PositionKey {
    pub fn for_row(row: &VirtualTransaction, spec: &ReportSpec, with_allocation: bool) -> Self {
        let pick = |active: bool, value: &Option<String>| if active { value.clone() } else { None };
        PositionKey {
            portfolio: pick(spec.slice_by_portfolio, &row.portfolio),
            account: pick(spec.slice_by_account, &row.account_position),
            strategy1: pick(spec.slice_by_strategy1, &row.strategy1_position),
            strategy2: pick(spec.slice_by_strategy2, &row.strategy2_position),
            strategy3: pick(spec.slice_by_strategy3, &row.strategy3_position),
            allocation: pick(with_allocation, &row.allocation),
            instrument: row.instrument.clone(),
        }
    }
}

/// One closing event: every row whose multiplier moved, with the closer last.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub closer: usize,
    pub deltas: Vec<(usize, Decimal)>,
}

#[derive(Default)]
struct KeyState {
    rolling: Decimal,
    /// Open rows in insertion order.
    inventory: Vec<usize>,
}

/// Running AVCO/FIFO state per [`PositionKey`].
pub struct CostMatcher {
    states: HashMap<PositionKey, KeyState>,
}

impl Default for CostMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CostMatcher {
    pub fn new() -> Self {
        CostMatcher {
            states: HashMap::new(),
        }
    }

    pub fn rolling_position(&self, key: &PositionKey) -> Decimal {
        self.states
            .get(key)
            .map(|s| s.rolling)
            .unwrap_or(Decimal::ZERO)
    }

    /// Matches row `index` against the open inventory of `key`.
    ///
    /// Returns the closure it caused, if any.
    pub fn apply(
        &mut self,
        rows: &mut [VirtualTransaction],
        index: usize,
        key: PositionKey,
        method: CostMethod,
    ) -> Option<Closure> {
        let state = self.states.entry(key).or_default();
        let position = rows[index].position_size;
        rows[index].multiplier = Decimal::ZERO;
        rows[index].closed_by.clear();

        let k = if is_zero(state.rolling) {
            Decimal::NEGATIVE_ONE
        } else {
            -safe_div(position, state.rolling)
        };
        let mut deltas = Vec::new();

        if is_close(k, Decimal::ONE) {
            for open in state.inventory.drain(..) {
                close_by(rows, open, index, Decimal::ONE, &mut deltas);
            }
            set_multiplier(rows, index, Decimal::ONE, &mut deltas);
            state.rolling = Decimal::ZERO;
        } else if k > Decimal::ONE {
            for open in state.inventory.drain(..) {
                close_by(rows, open, index, Decimal::ONE, &mut deltas);
            }
            state.inventory.push(index);
            set_multiplier(rows, index, safe_div(state.rolling, -position), &mut deltas);
            state.rolling = position * (Decimal::ONE - rows[index].multiplier);
        } else if k > Decimal::ZERO {
            match method {
                CostMethod::Avco => {
                    for &open in &state.inventory {
                        let current = rows[open].multiplier;
                        let target = current + k * (Decimal::ONE - current);
                        close_by(rows, open, index, target, &mut deltas);
                    }
                    set_multiplier(rows, index, Decimal::ONE, &mut deltas);
                    state.rolling += position;
                }
                CostMethod::Fifo => {
                    let mut left = position;
                    for &open in &state.inventory {
                        let current = rows[open].multiplier;
                        let remaining = rows[open].position_size * (Decimal::ONE - current);
                        let k0 = -safe_div(left, remaining);
                        if is_close(k0, Decimal::ONE) || k0 > Decimal::ONE {
                            close_by(rows, open, index, Decimal::ONE, &mut deltas);
                            left += remaining;
                        } else if k0 > Decimal::ZERO {
                            close_by(rows, open, index, current + k0 * (Decimal::ONE - current), &mut deltas);
                            left += remaining * k0;
                        }
                        if is_zero(left) {
                            break;
                        }
                    }
                    state
                        .inventory
                        .retain(|&open| !is_close(rows[open].multiplier, Decimal::ONE));
                    let closed_share = safe_div(position - left, position).abs();
                    set_multiplier(rows, index, closed_share, &mut deltas);
                    state.rolling += position * rows[index].multiplier;
                }
            }
        } else {
            state.inventory.push(index);
            state.rolling += position;
        }

        rows[index].rolling_position = state.rolling;

        if deltas.is_empty() {
            None
        } else {
            Some(Closure {
                closer: index,
                deltas,
            })
        }
    }
}

fn set_multiplier(
    rows: &mut [VirtualTransaction],
    index: usize,
    multiplier: Decimal,
    deltas: &mut Vec<(usize, Decimal)>,
) -> Decimal {
    let delta = multiplier - rows[index].multiplier;
    rows[index].multiplier = multiplier;
    deltas.push((index, delta));
    delta
}

fn close_by(
    rows: &mut [VirtualTransaction],
    open: usize,
    closer: usize,
    multiplier: Decimal,
    deltas: &mut Vec<(usize, Decimal)>,
) {
    let delta = set_multiplier(rows, open, multiplier, deltas);
    rows[open].closed_by.push((closer, delta));
}

/// Annotates multipliers, rolling, remaining and balance positions on
/// `rows` (already sorted). Rows of instruments for which `force_fifo`
/// holds are matched FIFO regardless of the report's cost method.
///
/// TRANSACTION_PL and FX_TRADE rows are fully closed. An INSTRUMENT_PL row
/// is closed by the share of its key's balance not yet reached when it
/// occurs.
pub fn annotate_multipliers(
    rows: &mut [VirtualTransaction],
    spec: &ReportSpec,
    force_fifo: impl Fn(&str) -> bool,
) -> Vec<Closure> {
    let mut matcher = CostMatcher::new();
    let mut closures = Vec::new();

    for index in 0..rows.len() {
        let key = PositionKey::for_row(&rows[index], spec, false);
        match rows[index].class {
            TransactionClass::Buy | TransactionClass::Sell => {
                let method = match rows[index].instrument.as_deref() {
                    Some(instrument) if force_fifo(instrument) => CostMethod::Fifo,
                    _ => spec.cost_method,
                };
                if let Some(closure) = matcher.apply(rows, index, key, method) {
                    closures.push(closure);
                }
            }
            TransactionClass::InstrumentPl => {
                rows[index].rolling_position = matcher.rolling_position(&key);
            }
            TransactionClass::TransactionPl | TransactionClass::FxTrade => {
                rows[index].multiplier = Decimal::ONE;
            }
            _ => {}
        }
    }

    let mut balances: HashMap<PositionKey, Decimal> = HashMap::new();
    for row in rows.iter_mut().filter(|r| r.class.is_trade()) {
        row.remaining_position = row.position_size * (Decimal::ONE - row.multiplier);
        *balances
            .entry(PositionKey::for_row(row, spec, true))
            .or_default() += row.remaining_position;
    }

    let mut reached: HashMap<PositionKey, Decimal> = HashMap::new();
    for row in rows.iter_mut() {
        let key = PositionKey::for_row(row, spec, true);
        let balance = balances.get(&key).copied().unwrap_or(Decimal::ZERO);
        match row.class {
            TransactionClass::Buy | TransactionClass::Sell => {
                row.balance_position = balance;
                *reached.entry(key).or_default() += row.remaining_position;
            }
            TransactionClass::InstrumentPl => {
                row.balance_position = balance;
                let sum_remaining = reached.get(&key).copied().unwrap_or(Decimal::ZERO);
                row.multiplier = if balance.is_zero() {
                    Decimal::ZERO
                } else {
                    Decimal::ONE - safe_div(sum_remaining, balance).abs()
                };
            }
            _ => {}
        }
    }

    debug!(
        "Cost matching: {} rows, {} closures",
        rows.len(),
        closures.len()
    );
    closures
}

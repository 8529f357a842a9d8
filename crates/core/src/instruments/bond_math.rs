//! Bond math contract and the in-house cash-flow implementation.
//!
//! The rest of the core only sees [`BondMathTrait`]; [`CashFlowBondMath`]
//! discounts projected cash flows at a compounded yield.

use chrono::NaiveDate;
use log::debug;

use super::day_count::{year_fraction, AccrualCalculationModel};
use super::instruments_errors::InstrumentError;
use super::instruments_model::Instrument;
use crate::constants::FACE_VALUE;

/// One dated cash flow on a face of 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondCashFlow {
    pub date: NaiveDate,
    pub amount: f64,
}

/// Which bond model an instrument was projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondKind {
    Amortizing,
    FixedRate,
    ZeroCoupon,
}

/// Projected bond: cash flows after settlement plus the conventions used to
/// discount them.
#[derive(Debug, Clone, PartialEq)]
pub struct BondCashFlows {
    pub kind: BondKind,
    pub settlement: NaiveDate,
    pub maturity: NaiveDate,
    /// Compounding frequency; 1 for zero-coupon and calendar-driven schedules.
    pub frequency: u32,
    pub day_count: AccrualCalculationModel,
    /// Outstanding notional at settlement (face 100 times the factor).
    pub notional: f64,
    pub cash_flows: Vec<BondCashFlow>,
}

impl BondCashFlows {
    /// Projects an instrument onto an amortizing, fixed-rate or zero-coupon bond.
    pub fn from_instrument(
        instrument: &Instrument,
        settlement: NaiveDate,
        bond_math: &dyn BondMathTrait,
    ) -> Result<Self, InstrumentError> {
        if instrument.is_perpetual() {
            return Err(InstrumentError::NoMaturity(instrument.user_code.clone()));
        }
        let maturity = instrument
            .maturity_date
            .ok_or_else(|| InstrumentError::NoMaturity(instrument.user_code.clone()))?;
        if settlement >= maturity {
            return Err(InstrumentError::InvalidData(format!(
                "settlement {} is not before maturity {}",
                settlement, maturity
            )));
        }

        let active_row = instrument
            .find_active(settlement)
            .map(|p| p.schedule.clone());
        let has_factors = !instrument.factor_schedules.is_empty();

        if !has_factors && active_row.is_none() {
            return Ok(BondCashFlows {
                kind: BondKind::ZeroCoupon,
                settlement,
                maturity,
                frequency: 1,
                day_count: AccrualCalculationModel::Act365,
                notional: FACE_VALUE,
                cash_flows: vec![BondCashFlow {
                    date: maturity,
                    amount: FACE_VALUE,
                }],
            });
        }

        let coupons: Vec<(NaiveDate, f64)> = instrument
            .future_payments(settlement, false, false)
            .filter(|(date, _)| *date > settlement && *date <= maturity)
            .collect();
        let dates: Vec<NaiveDate> = coupons.iter().map(|(d, _)| *d).collect();
        let (frequency, day_count) = active_row
            .as_ref()
            .map(|row| {
                (
                    row.periodicity.frequency().clamp(1, 12),
                    row.accrual_calculation_model,
                )
            })
            .unwrap_or((1, AccrualCalculationModel::Act365));

        let (kind, notionals, start_notional) = if has_factors {
            let mut schedule = vec![settlement];
            schedule.extend(dates.iter().copied());
            let all = bond_math.schedule_to_notionals(instrument, &schedule);
            let start = all.first().copied().unwrap_or(FACE_VALUE);
            (BondKind::Amortizing, all.into_iter().skip(1).collect(), start)
        } else {
            (BondKind::FixedRate, vec![FACE_VALUE; dates.len()], FACE_VALUE)
        };

        let mut cash_flows = Vec::with_capacity(coupons.len() + 1);
        let mut outstanding = start_notional;
        for ((date, coupon), notional) in coupons.iter().zip(notionals.iter()) {
            // coupon is quoted on 100, scaled by the notional outstanding over the period
            let mut amount = coupon * outstanding / FACE_VALUE;
            let redemption = outstanding - notional;
            if redemption.abs() > f64::EPSILON {
                amount += redemption;
            }
            outstanding = *notional;
            cash_flows.push(BondCashFlow {
                date: *date,
                amount,
            });
        }

        // redeem what is left at maturity
        match cash_flows.last_mut() {
            Some(last) if last.date == maturity => last.amount += outstanding,
            _ => cash_flows.push(BondCashFlow {
                date: maturity,
                amount: outstanding,
            }),
        }

        debug!(
            "Projected {} as {:?} bond with {} cash flows",
            instrument.user_code,
            kind,
            cash_flows.len()
        );

        Ok(BondCashFlows {
            kind,
            settlement,
            maturity,
            frequency,
            day_count,
            notional: start_notional,
            cash_flows,
        })
    }

    /// Time in years from settlement using the bond's day counter.
    pub fn time_to(&self, date: NaiveDate) -> f64 {
        let model = match self.day_count {
            AccrualCalculationModel::None | AccrualCalculationModel::Simple => {
                AccrualCalculationModel::Act365
            }
            other => other,
        };
        year_fraction(model, self.settlement, date, Some(self.maturity))
    }

    /// Dirty value at a compounded yield.
    pub fn present_value(&self, ytm: f64) -> f64 {
        let f = self.frequency as f64;
        self.cash_flows
            .iter()
            .map(|cf| cf.amount * (1.0 + ytm / f).powf(-f * self.time_to(cf.date)))
            .sum()
    }

    fn present_value_derivative(&self, ytm: f64) -> f64 {
        let f = self.frequency as f64;
        self.cash_flows
            .iter()
            .map(|cf| {
                let t = self.time_to(cf.date);
                -t * cf.amount * (1.0 + ytm / f).powf(-f * t - 1.0)
            })
            .sum()
    }
}

/// Solver settings for yield searches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            tolerance: 1e-6,
            max_iterations: 100,
        }
    }
}

/// Bond math contract consumed by instrument analytics and price history.
pub trait BondMathTrait: Send + Sync {
    /// Yield that discounts the bond's cash flows to `clean_price + accrued`
    /// (both per 100 of outstanding notional).
    fn price_to_yield(
        &self,
        bond: &BondCashFlows,
        clean_price: f64,
        accrued: f64,
    ) -> Result<f64, InstrumentError>;

    /// Clean price per 100 of outstanding notional at the given yield.
    fn yield_to_price(&self, bond: &BondCashFlows, ytm: f64, accrued: f64) -> Result<f64, InstrumentError>;

    /// Macaulay duration in years at the given yield.
    fn macaulay_duration(&self, bond: &BondCashFlows, ytm: f64) -> Result<f64, InstrumentError>;

    /// Modified duration at the given yield.
    fn yield_to_duration(&self, bond: &BondCashFlows, ytm: f64) -> Result<f64, InstrumentError> {
        let base = 1.0 + ytm / bond.frequency as f64;
        Ok(self.macaulay_duration(bond, ytm)? / base)
    }

    /// Notional outstanding at each schedule date (face times active factor).
    fn schedule_to_notionals(&self, instrument: &Instrument, schedule: &[NaiveDate]) -> Vec<f64>;
}

/// Newton-Raphson yield search with a bisection fallback.
#[derive(Debug, Clone, Default)]
pub struct CashFlowBondMath {
    config: SolverConfig,
}

impl CashFlowBondMath {
    pub fn new(config: SolverConfig) -> Self {
        CashFlowBondMath { config }
    }

    fn newton(&self, bond: &BondCashFlows, target: f64, lower: f64) -> Option<f64> {
        let mut rate = 0.05;
        for _ in 0..self.config.max_iterations {
            let value = bond.present_value(rate) - target;
            let derivative = bond.present_value_derivative(rate);
            if !value.is_finite() || !derivative.is_finite() || derivative.abs() < 1e-12 {
                return None;
            }
            let next = rate - value / derivative;
            if !next.is_finite() || next <= lower {
                return None;
            }
            if (next - rate).abs() < self.config.tolerance {
                return Some(next);
            }
            rate = next;
        }
        None
    }

    fn bisection(&self, bond: &BondCashFlows, target: f64, lower: f64) -> Option<f64> {
        let objective = |y: f64| bond.present_value(y) - target;
        let mut lo = lower;
        let mut hi = 10.0;
        let mut f_lo = objective(lo);
        let f_hi = objective(hi);
        if !f_lo.is_finite() || !f_hi.is_finite() || f_lo.signum() == f_hi.signum() {
            return None;
        }
        // bisection halves the bracket, so allow enough steps to reach the tolerance
        for _ in 0..self.config.max_iterations.max(200) {
            let mid = 0.5 * (lo + hi);
            let f_mid = objective(mid);
            if f_mid.abs() < self.config.tolerance * 1e-3 || (hi - lo) < self.config.tolerance {
                return Some(mid);
            }
            if f_mid.signum() == f_lo.signum() {
                lo = mid;
                f_lo = f_mid;
            } else {
                hi = mid;
            }
        }
        None
    }
}

impl BondMathTrait for CashFlowBondMath {
    fn price_to_yield(
        &self,
        bond: &BondCashFlows,
        clean_price: f64,
        accrued: f64,
    ) -> Result<f64, InstrumentError> {
        if bond.cash_flows.is_empty() {
            return Err(InstrumentError::InvalidData("no future cash flows".to_string()));
        }
        let target = (clean_price + accrued) * bond.notional / FACE_VALUE;
        if !target.is_finite() || target <= 0.0 {
            return Err(InstrumentError::InvalidData(format!(
                "price {} is not positive",
                clean_price
            )));
        }
        // the compounded discount factor is undefined at or below -frequency
        let lower = -(bond.frequency as f64) * 0.999;

        self.newton(bond, target, lower)
            .or_else(|| self.bisection(bond, target, lower))
            .ok_or_else(|| {
                InstrumentError::NotConverged(format!(
                    "yield for price {} after {} iterations",
                    clean_price, self.config.max_iterations
                ))
            })
    }

    fn yield_to_price(&self, bond: &BondCashFlows, ytm: f64, accrued: f64) -> Result<f64, InstrumentError> {
        if bond.notional.abs() < f64::EPSILON {
            return Err(InstrumentError::InvalidData("outstanding notional is zero".to_string()));
        }
        let dirty = bond.present_value(ytm) * FACE_VALUE / bond.notional;
        if !dirty.is_finite() {
            return Err(InstrumentError::InvalidData(format!(
                "price at yield {} is not finite",
                ytm
            )));
        }
        Ok(dirty - accrued)
    }

    fn macaulay_duration(&self, bond: &BondCashFlows, ytm: f64) -> Result<f64, InstrumentError> {
        let f = bond.frequency as f64;
        let base = 1.0 + ytm / f;
        if base <= 0.0 {
            return Err(InstrumentError::InvalidData(format!(
                "yield {} is below the compounding floor",
                ytm
            )));
        }
        let mut pv_total = 0.0;
        let mut weighted = 0.0;
        for cf in &bond.cash_flows {
            let t = bond.time_to(cf.date);
            let pv = cf.amount * base.powf(-f * t);
            pv_total += pv;
            weighted += t * pv;
        }
        if pv_total.abs() < f64::EPSILON || !weighted.is_finite() {
            return Err(InstrumentError::InvalidData(
                "present value of cash flows is zero".to_string(),
            ));
        }
        Ok(weighted / pv_total)
    }

    fn schedule_to_notionals(&self, instrument: &Instrument, schedule: &[NaiveDate]) -> Vec<f64> {
        schedule
            .iter()
            .map(|d| instrument.factor_at(*d) * FACE_VALUE)
            .collect()
    }
}

/// Net present value of dated flows discounted on ACT/365 from the first date.
pub fn xnpv(flows: &[(NaiveDate, f64)], rate: f64) -> f64 {
    let start = match flows.first() {
        Some((d, _)) => *d,
        None => return 0.0,
    };
    if (rate + 1.0).abs() < f64::EPSILON {
        return f64::INFINITY;
    }
    flows
        .iter()
        .map(|(d, v)| {
            let years = (*d - start).num_days() as f64 / 365.0;
            v / (1.0 + rate).powf(years)
        })
        .sum()
}

/// Internal rate of return of irregular flows; 0 when it does not converge.
pub fn xirr(flows: &[(NaiveDate, f64)], config: SolverConfig) -> f64 {
    if flows.is_empty() {
        return 0.0;
    }
    let epsilon = 1e-5;
    let mut rate = 0.0;
    for _ in 0..config.max_iterations {
        let npv = xnpv(flows, rate);
        let derivative = (xnpv(flows, rate + epsilon) - npv) / epsilon;
        if !derivative.is_finite() || derivative.abs() < config.tolerance {
            return 0.0;
        }
        let next = rate - npv / derivative;
        if !next.is_finite() {
            return 0.0;
        }
        if (next - rate).abs() < config.tolerance {
            return next;
        }
        rate = next;
    }
    0.0
}

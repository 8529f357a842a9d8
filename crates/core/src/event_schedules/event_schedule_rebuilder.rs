use chrono::NaiveDate;
use log::debug;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::event_schedules_model::{EventClass, EventSchedule, EventScheduleAction, EventScheduleConfig};
use super::event_schedules_traits::EventScheduleRepositoryTrait;
use crate::constants::PERPETUAL_MATURITY;
use crate::errors::{Error, Result};
use crate::instruments::{FactorSchedule, Instrument, InstrumentType};
use crate::utils::decimal_utils::is_close_f64;

/// Outcome of diffing generated events against the stored ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildPlan {
    /// New or changed events to persist.
    pub to_save: Vec<EventSchedule>,
    /// Ids of stored events that were regenerated identically.
    pub kept: Vec<String>,
    /// Ids of stored auto-generated events with no counterpart any more.
    pub to_delete: Vec<String>,
}

impl RebuildPlan {
    pub fn is_noop(&self) -> bool {
        self.to_save.is_empty() && self.to_delete.is_empty()
    }
}

/// Derives the auto-generated event schedules of an instrument.
///
/// One regular event per accrual row for classes with regular events, one
/// one-off event at maturity for classes with one-off events, and one event
/// per adjacent factor pair whose template is set. A candidate equal to the
/// stored event with the same key keeps the stored identity.
pub fn plan_rebuild(
    instrument: &Instrument,
    instrument_type: &InstrumentType,
    existing: &[EventSchedule],
    config: &EventScheduleConfig,
) -> Result<RebuildPlan> {
    let class = instrument_type.instrument_class;
    let maturity = instrument.maturity_date.unwrap_or_else(perpetual_maturity);
    let auto_events: Vec<&EventSchedule> = existing.iter().filter(|e| e.is_auto_generated).collect();

    let mut plan = RebuildPlan::default();
    let mut processed: HashSet<String> = HashSet::new();

    if class.has_regular_event() {
        let template = instrument_type
            .regular_event
            .as_deref()
            .ok_or_else(|| configuration_error("regular_event"))?;

        let periods = instrument.accrual_periods();
        for (i, period) in periods.iter().enumerate() {
            let row = period.schedule;
            let final_date = periods
                .get(i + 1)
                .map(|next| next.start)
                .unwrap_or(maturity);
            let candidate = EventSchedule {
                accrual_calculation_schedule_id: Some(row.id.clone()),
                event_class: EventClass::Regular,
                effective_date: row.first_payment_date,
                final_date,
                periodicity: Some(row.periodicity),
                periodicity_n: row.periodicity_n,
                ..base_event(instrument, config, template)
            };
            let previous = auto_events
                .iter()
                .find(|e| e.accrual_calculation_schedule_id.as_deref() == Some(row.id.as_str()))
                .copied();
            apply_candidate(&mut plan, &mut processed, candidate, previous);
        }
    }

    if class.has_one_off_event() {
        let template = instrument_type
            .one_off_event
            .as_deref()
            .ok_or_else(|| configuration_error("one_off_event"))?;

        let candidate = EventSchedule {
            event_class: EventClass::OneOff,
            effective_date: maturity,
            final_date: maturity,
            ..base_event(instrument, config, template)
        };
        let previous = auto_events
            .iter()
            .find(|e| {
                e.event_class == EventClass::OneOff
                    && e.accrual_calculation_schedule_id.is_none()
                    && e.factor_schedule_id.is_none()
            })
            .copied();
        apply_candidate(&mut plan, &mut processed, candidate, previous);
    }

    let mut factors: Vec<&FactorSchedule> = instrument.factor_schedules.iter().collect();
    factors.sort_by_key(|f| f.effective_date);
    for pair in factors.windows(2) {
        let (previous_row, row) = (pair[0], pair[1]);
        let template = if is_close_f64(row.factor_value, previous_row.factor_value) {
            instrument_type.factor_same.as_deref()
        } else if row.factor_value > previous_row.factor_value {
            instrument_type.factor_up.as_deref()
        } else {
            instrument_type.factor_down.as_deref()
        };
        let template = match template {
            Some(t) => t,
            None => continue,
        };

        let candidate = EventSchedule {
            factor_schedule_id: Some(row.id.clone()),
            event_class: EventClass::OneOff,
            effective_date: row.effective_date,
            final_date: row.effective_date,
            ..base_event(instrument, config, template)
        };
        let previous = auto_events
            .iter()
            .find(|e| e.factor_schedule_id.as_deref() == Some(row.id.as_str()))
            .copied();
        apply_candidate(&mut plan, &mut processed, candidate, previous);
    }

    plan.to_delete = auto_events
        .iter()
        .filter(|e| !processed.contains(&e.id))
        .map(|e| e.id.clone())
        .collect();

    Ok(plan)
}

fn apply_candidate(
    plan: &mut RebuildPlan,
    processed: &mut HashSet<String>,
    mut candidate: EventSchedule,
    previous: Option<&EventSchedule>,
) {
    match previous {
        Some(old) if old.same_content(&candidate) => {
            processed.insert(old.id.clone());
            plan.kept.push(old.id.clone());
        }
        _ => {
            candidate.id = Uuid::new_v4().to_string();
            for action in candidate.actions.iter_mut() {
                action.id = Uuid::new_v4().to_string();
            }
            processed.insert(candidate.id.clone());
            plan.to_save.push(candidate);
        }
    }
}

fn base_event(instrument: &Instrument, config: &EventScheduleConfig, template: &str) -> EventSchedule {
    EventSchedule {
        id: String::new(),
        instrument_id: instrument.id.clone(),
        name: config.name.clone(),
        description: config.description.clone(),
        event_class: EventClass::OneOff,
        notification_class: config.notification_class,
        notify_in_n_days: config.notify_in_n_days,
        periodicity: None,
        periodicity_n: 0,
        effective_date: NaiveDate::MIN,
        final_date: NaiveDate::MIN,
        is_auto_generated: true,
        accrual_calculation_schedule_id: None,
        factor_schedule_id: None,
        actions: vec![EventScheduleAction {
            id: String::new(),
            transaction_type: Some(template.to_string()),
            text: config.action_text.clone(),
            is_sent_to_pending: config.action_is_sent_to_pending,
            is_book_automatic: config.action_is_book_automatic,
            button_position: 1,
        }],
    }
}

fn configuration_error(field: &str) -> Error {
    Error::Configuration {
        field: field.to_string(),
    }
}

fn perpetual_maturity() -> NaiveDate {
    let (y, m, d) = PERPETUAL_MATURITY;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MAX)
}

/// Applies rebuild plans through the event schedule repository.
pub struct EventScheduleRebuilder {
    repository: Arc<dyn EventScheduleRepositoryTrait>,
    config: EventScheduleConfig,
}

impl EventScheduleRebuilder {
    pub fn new(repository: Arc<dyn EventScheduleRepositoryTrait>, config: EventScheduleConfig) -> Self {
        EventScheduleRebuilder { repository, config }
    }

    /// Rebuilds and persists the auto-generated events of `instrument`.
    pub async fn rebuild(
        &self,
        instrument: &Instrument,
        instrument_type: &InstrumentType,
    ) -> Result<RebuildPlan> {
        let existing = self.repository.get_event_schedules(&instrument.id)?;
        let plan = plan_rebuild(instrument, instrument_type, &existing, &self.config)?;

        for event in &plan.to_save {
            self.repository.save_event_schedule(event.clone()).await?;
        }
        for event_id in &plan.to_delete {
            self.repository.delete_event_schedule(event_id).await?;
        }

        debug!(
            "Rebuilt event schedules for {}: {} saved, {} kept, {} deleted",
            instrument.user_code,
            plan.to_save.len(),
            plan.kept.len(),
            plan.to_delete.len()
        );
        Ok(plan)
    }
}

//! Event schedule domain models.

use chrono::{Duration, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::constants::MAX_PERIOD_STEPS;
use crate::instruments::Periodicity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventClass {
    #[default]
    OneOff,
    Regular,
}

/// When and how the user is told about an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationClass {
    #[default]
    DontReact,
    ApplyDefOnEdate,
    ApplyDefOnNdate,
    InformOnNdateWithReact,
    InformOnNdateApplyDef,
    InformOnNdateDontReact,
    InformOnEdateWithReact,
    InformOnEdateApplyDef,
    InformOnEdateDontReact,
    InformOnNdateAndEdateWithReactOnEdate,
    InformOnNdateAndEdateWithReactOnNdate,
    InformOnNdateAndEdateApplyDefOnEdate,
    InformOnNdateAndEdateApplyDefOnNdate,
    InformOnNdateAndEdateDontReact,
}

/// Transaction type offered (or booked) when an event fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventScheduleAction {
    pub id: String,
    pub transaction_type: Option<String>,
    pub text: String,
    pub is_sent_to_pending: bool,
    pub is_book_automatic: bool,
    pub button_position: i32,
}

impl EventScheduleAction {
    fn same_content(&self, other: &EventScheduleAction) -> bool {
        self.transaction_type == other.transaction_type
            && self.text == other.text
            && self.is_sent_to_pending == other.is_sent_to_pending
            && self.is_book_automatic == other.is_book_automatic
            && self.button_position == other.button_position
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventSchedule {
    pub id: String,
    pub instrument_id: String,
    pub name: String,
    pub description: String,
    pub event_class: EventClass,
    pub notification_class: NotificationClass,
    pub notify_in_n_days: i64,
    pub periodicity: Option<Periodicity>,
    pub periodicity_n: i32,
    pub effective_date: NaiveDate,
    pub final_date: NaiveDate,
    pub is_auto_generated: bool,
    pub accrual_calculation_schedule_id: Option<String>,
    pub factor_schedule_id: Option<String>,
    #[serde(default)]
    pub actions: Vec<EventScheduleAction>,
}

impl EventSchedule {
    /// Field-by-field comparison ignoring identifiers, actions included.
    pub fn same_content(&self, other: &EventSchedule) -> bool {
        self.instrument_id == other.instrument_id
            && self.name == other.name
            && self.description == other.description
            && self.event_class == other.event_class
            && self.notification_class == other.notification_class
            && self.notify_in_n_days == other.notify_in_n_days
            && self.periodicity == other.periodicity
            && self.periodicity_n == other.periodicity_n
            && self.effective_date == other.effective_date
            && self.final_date == other.final_date
            && self.is_auto_generated == other.is_auto_generated
            && self.accrual_calculation_schedule_id == other.accrual_calculation_schedule_id
            && self.factor_schedule_id == other.factor_schedule_id
            && self.actions.len() == other.actions.len()
            && self
                .actions
                .iter()
                .zip(other.actions.iter())
                .all(|(a, b)| a.same_content(b))
    }

    /// `(effective_date, notification_date)` pairs of every occurrence.
    ///
    /// Regular events step from `effective_date` until `final_date`; events
    /// linked to an accrual row clamp their last step to the day before
    /// `final_date`.
    pub fn all_dates(&self) -> Vec<(NaiveDate, NaiveDate)> {
        let notify = Duration::days(self.notify_in_n_days);
        let pair = |d: NaiveDate| (d, d.checked_sub_signed(notify).unwrap_or(d));

        match self.event_class {
            EventClass::OneOff => vec![pair(self.effective_date)],
            EventClass::Regular => {
                let periodicity = match self.periodicity {
                    Some(p) => p,
                    None => return vec![pair(self.effective_date)],
                };
                let mut dates = Vec::new();
                for index in 0..MAX_PERIOD_STEPS as i64 {
                    let mut date = match periodicity.advance(
                        self.periodicity_n,
                        self.effective_date,
                        index,
                        self.effective_date,
                    ) {
                        Ok(d) => d,
                        Err(e) => {
                            warn!("all_dates for event schedule {}: {}", self.id, e);
                            break;
                        }
                    };
                    let mut stop = false;
                    if self.accrual_calculation_schedule_id.is_some() && date >= self.final_date {
                        date = self.final_date.pred_opt().unwrap_or(self.final_date);
                        stop = true;
                    }
                    dates.push(pair(date));
                    if stop || date >= self.final_date {
                        break;
                    }
                }
                dates
            }
        }
    }

    /// Occurrence whose effective or notification date is `now`.
    pub fn check_date(&self, now: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.all_dates()
            .into_iter()
            .find(|(edate, ndate)| *edate == now || *ndate == now)
    }

    pub fn check_effective_date(&self, now: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.all_dates().into_iter().find(|(edate, _)| *edate == now)
    }

    pub fn check_notification_date(&self, now: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        self.all_dates().into_iter().find(|(_, ndate)| *ndate == now)
    }
}

/// Tenant defaults stamped onto generated events and their actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EventScheduleConfig {
    pub name: String,
    pub description: String,
    pub notification_class: NotificationClass,
    pub notify_in_n_days: i64,
    pub action_text: String,
    pub action_is_sent_to_pending: bool,
    pub action_is_book_automatic: bool,
}

impl Default for EventScheduleConfig {
    fn default() -> Self {
        EventScheduleConfig {
            name: String::new(),
            description: String::new(),
            notification_class: NotificationClass::DontReact,
            notify_in_n_days: 0,
            action_text: String::new(),
            action_is_sent_to_pending: false,
            action_is_book_automatic: true,
        }
    }
}

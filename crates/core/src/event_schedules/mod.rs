//! Event schedules module - generated instrument events and their rebuild.

mod event_schedule_rebuilder;
mod event_schedules_model;
mod event_schedules_traits;

#[cfg(test)]
mod event_schedules_tests;

pub use event_schedule_rebuilder::{plan_rebuild, EventScheduleRebuilder, RebuildPlan};
pub use event_schedules_model::{
    EventClass, EventSchedule, EventScheduleAction, EventScheduleConfig, NotificationClass,
};
pub use event_schedules_traits::EventScheduleRepositoryTrait;

//! Repository traits for event schedules.

use async_trait::async_trait;

use super::event_schedules_model::EventSchedule;
use crate::errors::Result;

#[async_trait]
pub trait EventScheduleRepositoryTrait: Send + Sync {
    /// Event schedules of one instrument ordered by effective date.
    fn get_event_schedules(&self, instrument_id: &str) -> Result<Vec<EventSchedule>>;

    /// Inserts or updates by id, replacing the attached actions.
    async fn save_event_schedule(&self, event_schedule: EventSchedule) -> Result<EventSchedule>;

    async fn delete_event_schedule(&self, event_schedule_id: &str) -> Result<()>;
}

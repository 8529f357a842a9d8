//! Tenant configuration consumed by the processor and the report builder.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_PERIOD_STEPS;
use crate::event_schedules::EventScheduleConfig;

pub const DEFAULT_PAGE_SIZE: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreSettings {
    pub system_currency: String,
    /// Begin share of a closed P&L transferred between opener and closer.
    pub approach_multiplier: f64,
    pub pl_real_unreal_end_multiplier: f64,
    pub default_page_size: usize,
    pub ytm_tolerance: f64,
    pub ytm_max_iterations: u32,
    pub max_period_steps: usize,
    pub recalculate_iterations: u32,
    pub event_schedule_config: EventScheduleConfig,
}

impl Default for CoreSettings {
    fn default() -> Self {
        CoreSettings {
            system_currency: "USD".to_string(),
            approach_multiplier: 0.5,
            pl_real_unreal_end_multiplier: 0.5,
            default_page_size: DEFAULT_PAGE_SIZE,
            ytm_tolerance: 1e-6,
            ytm_max_iterations: 100,
            max_period_steps: MAX_PERIOD_STEPS,
            recalculate_iterations: 5,
            event_schedule_config: EventScheduleConfig::default(),
        }
    }
}

impl CoreSettings {
    /// End share of a closed P&L transfer.
    pub fn approach_end_multiplier(&self) -> f64 {
        1.0 - self.approach_multiplier
    }
}

/// Partial update; `None` leaves a setting untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoreSettingsUpdate {
    pub system_currency: Option<String>,
    pub approach_multiplier: Option<f64>,
    pub pl_real_unreal_end_multiplier: Option<f64>,
    pub default_page_size: Option<usize>,
    pub recalculate_iterations: Option<u32>,
    pub event_schedule_config: Option<EventScheduleConfig>,
}

impl CoreSettingsUpdate {
    pub fn apply(&self, settings: &mut CoreSettings) {
        if let Some(v) = &self.system_currency {
            settings.system_currency = v.clone();
        }
        if let Some(v) = self.approach_multiplier {
            settings.approach_multiplier = v;
        }
        if let Some(v) = self.pl_real_unreal_end_multiplier {
            settings.pl_real_unreal_end_multiplier = v;
        }
        if let Some(v) = self.default_page_size {
            settings.default_page_size = v;
        }
        if let Some(v) = self.recalculate_iterations {
            settings.recalculate_iterations = v;
        }
        if let Some(v) = &self.event_schedule_config {
            settings.event_schedule_config = v.clone();
        }
    }
}

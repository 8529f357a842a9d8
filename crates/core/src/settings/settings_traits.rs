//! Repository traits for settings.

use async_trait::async_trait;

use crate::errors::Result;
use crate::settings::{CoreSettings, CoreSettingsUpdate};

/// Repository trait for the tenant's core settings.
#[async_trait]
pub trait SettingsRepositoryTrait: Send + Sync {
    /// Get all settings. `DatabaseError::NotFound` when none were stored.
    fn get_settings(&self) -> Result<CoreSettings>;

    /// Update multiple settings at once.
    async fn update_settings(&self, update: &CoreSettingsUpdate) -> Result<()>;

    /// Get a single raw setting value by key.
    fn get_setting(&self, setting_key: &str) -> Result<String>;
}

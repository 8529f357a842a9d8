use super::SettingsRepositoryTrait;
use crate::errors::{DatabaseError, Error, Result, ValidationError};
use crate::settings::{CoreSettings, CoreSettingsUpdate};
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

#[async_trait]
pub trait SettingsServiceTrait: Send + Sync {
    /// Stored settings, or the defaults when nothing was stored.
    fn get_settings(&self) -> Result<CoreSettings>;

    async fn update_settings(&self, update: &CoreSettingsUpdate) -> Result<()>;

    fn get_system_currency(&self) -> Result<String>;

    /// Get a single setting value by key. Returns None if not found.
    fn get_setting_value(&self, key: &str) -> Result<Option<String>>;
}

pub struct SettingsService {
    settings_repository: Arc<dyn SettingsRepositoryTrait>,
}

#[async_trait]
impl SettingsServiceTrait for SettingsService {
    fn get_settings(&self) -> Result<CoreSettings> {
        match self.settings_repository.get_settings() {
            Ok(settings) => Ok(settings),
            Err(Error::Database(DatabaseError::NotFound(_))) => {
                debug!("No stored settings, using defaults");
                Ok(CoreSettings::default())
            }
            Err(e) => Err(e),
        }
    }

    async fn update_settings(&self, update: &CoreSettingsUpdate) -> Result<()> {
        if let Some(multiplier) = update.approach_multiplier {
            if !(0.0..=1.0).contains(&multiplier) {
                return Err(Error::Validation(ValidationError::InvalidInput(format!(
                    "approach_multiplier must be within [0, 1], got {}",
                    multiplier
                ))));
            }
        }
        if update.default_page_size == Some(0) {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "default_page_size must be positive".to_string(),
            )));
        }
        self.settings_repository.update_settings(update).await
    }

    fn get_system_currency(&self) -> Result<String> {
        match self.settings_repository.get_setting("system_currency") {
            Ok(value) if !value.is_empty() => Ok(value),
            Ok(_) => {
                warn!("Empty system currency stored, using default");
                Ok(CoreSettings::default().system_currency)
            }
            Err(Error::Database(DatabaseError::NotFound(_))) => {
                Ok(CoreSettings::default().system_currency)
            }
            Err(e) => Err(e),
        }
    }

    fn get_setting_value(&self, key: &str) -> Result<Option<String>> {
        match self.settings_repository.get_setting(key) {
            Ok(value) => Ok(Some(value)),
            Err(Error::Database(DatabaseError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl SettingsService {
    pub fn new(settings_repository: Arc<dyn SettingsRepositoryTrait>) -> Self {
        SettingsService {
            settings_repository,
        }
    }
}

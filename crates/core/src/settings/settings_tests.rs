#[cfg(test)]
mod tests {
    use crate::errors::{DatabaseError, Error, Result};
    use crate::settings::{
        CoreSettings, CoreSettingsUpdate, SettingsRepositoryTrait, SettingsService,
        SettingsServiceTrait,
    };
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MockSettingsRepository {
        settings: Arc<Mutex<Option<CoreSettings>>>,
    }

    #[async_trait]
    impl SettingsRepositoryTrait for MockSettingsRepository {
        fn get_settings(&self) -> Result<CoreSettings> {
            self.settings
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::Database(DatabaseError::NotFound("settings".to_string())))
        }

        async fn update_settings(&self, update: &CoreSettingsUpdate) -> Result<()> {
            let mut guard = self.settings.lock().unwrap();
            let mut settings = guard.clone().unwrap_or_default();
            update.apply(&mut settings);
            *guard = Some(settings);
            Ok(())
        }

        fn get_setting(&self, setting_key: &str) -> Result<String> {
            let guard = self.settings.lock().unwrap();
            match (guard.as_ref(), setting_key) {
                (Some(s), "system_currency") => Ok(s.system_currency.clone()),
                _ => Err(Error::Database(DatabaseError::NotFound(
                    setting_key.to_string(),
                ))),
            }
        }
    }

    #[test]
    fn test_defaults_when_nothing_stored() {
        let service = SettingsService::new(Arc::new(MockSettingsRepository::default()));

        let settings = service.get_settings().unwrap();
        assert_eq!(settings.system_currency, "USD");
        assert_eq!(settings.approach_multiplier, 0.5);
        assert_eq!(settings.approach_end_multiplier(), 0.5);
        assert_eq!(settings.default_page_size, 40);
        assert_eq!(settings.recalculate_iterations, 5);
        assert_eq!(service.get_system_currency().unwrap(), "USD");
        assert_eq!(service.get_setting_value("unknown").unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_is_partial() {
        let service = SettingsService::new(Arc::new(MockSettingsRepository::default()));

        service
            .update_settings(&CoreSettingsUpdate {
                system_currency: Some("EUR".to_string()),
                approach_multiplier: Some(0.3),
                ..Default::default()
            })
            .await
            .unwrap();

        let settings = service.get_settings().unwrap();
        assert_eq!(settings.system_currency, "EUR");
        assert!((settings.approach_end_multiplier() - 0.7).abs() < 1e-12);
        assert_eq!(settings.default_page_size, 40);
        assert_eq!(service.get_system_currency().unwrap(), "EUR");
    }

    #[tokio::test]
    async fn test_update_rejects_out_of_range_multiplier() {
        let service = SettingsService::new(Arc::new(MockSettingsRepository::default()));

        let result = service
            .update_settings(&CoreSettingsUpdate {
                approach_multiplier: Some(1.5),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_missing_fields_deserialize_to_defaults() {
        let settings: CoreSettings =
            serde_json::from_str(r#"{"systemCurrency":"CHF","defaultPageSize":10}"#).unwrap();
        assert_eq!(settings.system_currency, "CHF");
        assert_eq!(settings.default_page_size, 10);
        assert_eq!(settings.ytm_max_iterations, 100);
    }
}

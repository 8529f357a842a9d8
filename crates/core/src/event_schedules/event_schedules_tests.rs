#[cfg(test)]
mod tests {
    use crate::errors::{Error, Result};
    use crate::event_schedules::{
        plan_rebuild, EventClass, EventSchedule, EventScheduleConfig, EventScheduleRebuilder,
        EventScheduleRepositoryTrait,
    };
    use crate::instruments::{
        AccrualCalculationModel, AccrualCalculationSchedule, FactorSchedule, Instrument,
        InstrumentClass, InstrumentType, Periodicity,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // --- Mock EventScheduleRepository ---
    #[derive(Default)]
    struct MockEventScheduleRepository {
        events: Arc<Mutex<Vec<EventSchedule>>>,
    }

    #[async_trait]
    impl EventScheduleRepositoryTrait for MockEventScheduleRepository {
        fn get_event_schedules(&self, instrument_id: &str) -> Result<Vec<EventSchedule>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.instrument_id == instrument_id)
                .cloned()
                .collect())
        }

        async fn save_event_schedule(&self, event_schedule: EventSchedule) -> Result<EventSchedule> {
            let mut events = self.events.lock().unwrap();
            events.retain(|e| e.id != event_schedule.id);
            events.push(event_schedule.clone());
            Ok(event_schedule)
        }

        async fn delete_event_schedule(&self, event_schedule_id: &str) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .retain(|e| e.id != event_schedule_id);
            Ok(())
        }
    }

    fn create_instrument_type(class: InstrumentClass) -> InstrumentType {
        InstrumentType {
            id: "type-1".to_string(),
            user_code: "bond".to_string(),
            name: "Bond".to_string(),
            instrument_class: class,
            regular_event: Some("coupon".to_string()),
            one_off_event: Some("redemption".to_string()),
            factor_same: None,
            factor_up: Some("factor_up".to_string()),
            factor_down: Some("factor_down".to_string()),
        }
    }

    fn create_instrument() -> Instrument {
        Instrument {
            id: "bond-1".to_string(),
            user_code: "BOND-2005".to_string(),
            maturity_date: Some(d(2005, 1, 1)),
            maturity_price: dec!(100),
            accrual_calculation_schedules: vec![AccrualCalculationSchedule {
                id: "acc-1".to_string(),
                accrual_start_date: d(2001, 1, 1),
                first_payment_date: d(2001, 7, 1),
                accrual_size: 5.0,
                accrual_calculation_model: AccrualCalculationModel::ActActIcma,
                periodicity: Periodicity::SemiAnnually,
                periodicity_n: 1,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    // ==================== plan_rebuild Tests ====================

    #[test]
    fn test_regular_and_one_off_events_from_single_accrual_row() {
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::RegularEventAtMaturity),
            &[],
            &EventScheduleConfig::default(),
        )
        .unwrap();

        assert_eq!(plan.to_save.len(), 2);
        let regular = &plan.to_save[0];
        assert_eq!(regular.event_class, EventClass::Regular);
        assert_eq!(regular.effective_date, d(2001, 7, 1));
        assert_eq!(regular.final_date, d(2005, 1, 1));
        assert_eq!(regular.accrual_calculation_schedule_id.as_deref(), Some("acc-1"));
        assert_eq!(regular.actions[0].transaction_type.as_deref(), Some("coupon"));

        let one_off = &plan.to_save[1];
        assert_eq!(one_off.event_class, EventClass::OneOff);
        assert_eq!(one_off.effective_date, d(2005, 1, 1));
        assert_eq!(one_off.actions[0].transaction_type.as_deref(), Some("redemption"));
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_perpetual_class_has_no_one_off_event() {
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::PerpetualRegularEvent),
            &[],
            &EventScheduleConfig::default(),
        )
        .unwrap();
        assert_eq!(plan.to_save.len(), 1);
        assert_eq!(plan.to_save[0].event_class, EventClass::Regular);
    }

    #[test]
    fn test_general_class_produces_nothing() {
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::General),
            &[],
            &EventScheduleConfig::default(),
        )
        .unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_missing_template_is_configuration_error() {
        let mut instrument_type = create_instrument_type(InstrumentClass::EventAtMaturity);
        instrument_type.one_off_event = None;

        let result = plan_rebuild(
            &create_instrument(),
            &instrument_type,
            &[],
            &EventScheduleConfig::default(),
        );

        match result {
            Err(Error::Configuration { field }) => assert_eq!(field, "one_off_event"),
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_factor_events_follow_direction() {
        let mut instrument = create_instrument();
        instrument.factor_schedules = vec![
            FactorSchedule {
                id: "f-1".to_string(),
                effective_date: d(2001, 1, 1),
                factor_value: 1.0,
            },
            FactorSchedule {
                id: "f-2".to_string(),
                effective_date: d(2002, 1, 1),
                factor_value: 0.8,
            },
            FactorSchedule {
                id: "f-3".to_string(),
                effective_date: d(2003, 1, 1),
                factor_value: 0.8,
            },
            FactorSchedule {
                id: "f-4".to_string(),
                effective_date: d(2004, 1, 1),
                factor_value: 0.9,
            },
        ];

        let plan = plan_rebuild(
            &instrument,
            &create_instrument_type(InstrumentClass::General),
            &[],
            &EventScheduleConfig::default(),
        )
        .unwrap();

        // the unchanged factor has no factor_same template
        let factor_events: Vec<(&str, &str)> = plan
            .to_save
            .iter()
            .map(|e| {
                (
                    e.factor_schedule_id.as_deref().unwrap(),
                    e.actions[0].transaction_type.as_deref().unwrap(),
                )
            })
            .collect();
        assert_eq!(factor_events, vec![("f-2", "factor_down"), ("f-4", "factor_up")]);
    }

    #[test]
    fn test_identical_rebuild_keeps_identity() {
        let instrument = create_instrument();
        let instrument_type = create_instrument_type(InstrumentClass::RegularEventAtMaturity);
        let config = EventScheduleConfig::default();

        let first = plan_rebuild(&instrument, &instrument_type, &[], &config).unwrap();
        let second = plan_rebuild(&instrument, &instrument_type, &first.to_save, &config).unwrap();

        assert!(second.is_noop());
        let mut kept = second.kept.clone();
        kept.sort();
        let mut original: Vec<String> = first.to_save.iter().map(|e| e.id.clone()).collect();
        original.sort();
        assert_eq!(kept, original);
    }

    #[test]
    fn test_changed_row_replaces_event_and_orphans_are_deleted() {
        let instrument_type = create_instrument_type(InstrumentClass::RegularEventAtMaturity);
        let config = EventScheduleConfig::default();
        let first = plan_rebuild(&create_instrument(), &instrument_type, &[], &config).unwrap();

        let mut changed = create_instrument();
        changed.maturity_date = Some(d(2006, 1, 1));
        let second = plan_rebuild(&changed, &instrument_type, &first.to_save, &config).unwrap();

        assert_eq!(second.to_save.len(), 2);
        assert_eq!(second.to_delete.len(), 2);
        assert!(second.kept.is_empty());
    }

    #[test]
    fn test_manual_events_are_left_alone() {
        let manual = EventSchedule {
            id: "manual-1".to_string(),
            instrument_id: "bond-1".to_string(),
            name: "call".to_string(),
            description: String::new(),
            event_class: EventClass::OneOff,
            notification_class: Default::default(),
            notify_in_n_days: 0,
            periodicity: None,
            periodicity_n: 0,
            effective_date: d(2003, 1, 1),
            final_date: d(2003, 1, 1),
            is_auto_generated: false,
            accrual_calculation_schedule_id: None,
            factor_schedule_id: None,
            actions: Vec::new(),
        };
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::General),
            &[manual],
            &EventScheduleConfig::default(),
        )
        .unwrap();
        assert!(plan.to_delete.is_empty());
    }

    // ==================== EventSchedule date Tests ====================

    #[test]
    fn test_regular_all_dates_clamp_to_final_date() {
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::PerpetualRegularEvent),
            &[],
            &EventScheduleConfig::default(),
        )
        .unwrap();
        let dates: Vec<NaiveDate> = plan.to_save[0].all_dates().into_iter().map(|(e, _)| e).collect();

        assert_eq!(dates.first(), Some(&d(2001, 7, 1)));
        assert_eq!(dates.len(), 8);
        assert_eq!(dates.last(), Some(&d(2004, 12, 31)));
    }

    #[test]
    fn test_check_dates_with_notification_offset() {
        let config = EventScheduleConfig {
            notify_in_n_days: 5,
            ..Default::default()
        };
        let plan = plan_rebuild(
            &create_instrument(),
            &create_instrument_type(InstrumentClass::EventAtMaturity),
            &[],
            &config,
        )
        .unwrap();
        let event = &plan.to_save[0];

        assert_eq!(
            event.check_effective_date(d(2005, 1, 1)),
            Some((d(2005, 1, 1), d(2004, 12, 27)))
        );
        assert!(event.check_notification_date(d(2004, 12, 27)).is_some());
        assert!(event.check_date(d(2004, 12, 27)).is_some());
        assert!(event.check_date(d(2004, 12, 28)).is_none());
    }

    // ==================== EventScheduleRebuilder Tests ====================

    #[tokio::test]
    async fn test_rebuilder_persists_plan() {
        let repository = Arc::new(MockEventScheduleRepository::default());
        let rebuilder = EventScheduleRebuilder::new(repository.clone(), EventScheduleConfig::default());
        let instrument = create_instrument();
        let instrument_type = create_instrument_type(InstrumentClass::RegularEventAtMaturity);

        rebuilder.rebuild(&instrument, &instrument_type).await.unwrap();
        let first_ids: Vec<String> = repository
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(first_ids.len(), 2);

        let plan = rebuilder.rebuild(&instrument, &instrument_type).await.unwrap();
        assert!(plan.is_noop());
        let second_ids: Vec<String> = repository
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.id.clone())
            .collect();
        assert_eq!(first_ids, second_ids);
    }
}

//! Domain event types.

use serde::{Deserialize, Serialize};

/// Domain events emitted by core services after a successful commit.
///
/// Runtime adapters translate them into follow-up work (report cache
/// invalidation, price recalculation, notifications).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A complex transaction was booked or rebooked.
    ComplexTransactionBooked {
        complex_transaction_id: String,
        transaction_type: String,
        transaction_ids: Vec<String>,
        /// Status code of the complex transaction (PRODUCTION, PENDING, IGNORED)
        status: String,
    },

    /// Instruments were created or updated by a processor run.
    InstrumentsChanged { instrument_ids: Vec<String> },

    /// Auto-generated event schedules of an instrument were rebuilt.
    EventSchedulesRebuilt {
        instrument_id: String,
        saved: usize,
        deleted: usize,
    },

    /// Complex transactions were soft-deleted by a uniqueness overwrite.
    ComplexTransactionsDeleted { complex_transaction_ids: Vec<String> },
}

impl DomainEvent {
    pub fn complex_transaction_booked(
        complex_transaction_id: String,
        transaction_type: String,
        transaction_ids: Vec<String>,
        status: String,
    ) -> Self {
        Self::ComplexTransactionBooked {
            complex_transaction_id,
            transaction_type,
            transaction_ids,
            status,
        }
    }

    pub fn instruments_changed(instrument_ids: Vec<String>) -> Self {
        Self::InstrumentsChanged { instrument_ids }
    }

    pub fn event_schedules_rebuilt(instrument_id: String, saved: usize, deleted: usize) -> Self {
        Self::EventSchedulesRebuilt {
            instrument_id,
            saved,
            deleted,
        }
    }

    pub fn complex_transactions_deleted(complex_transaction_ids: Vec<String>) -> Self {
        Self::ComplexTransactionsDeleted {
            complex_transaction_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_event_serialization() {
        let event = DomainEvent::complex_transaction_booked(
            "ct-1".to_string(),
            "buy_bond".to_string(),
            vec!["trn-1".to_string(), "trn-2".to_string()],
            "PRODUCTION".to_string(),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("complex_transaction_booked"));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        match deserialized {
            DomainEvent::ComplexTransactionBooked {
                complex_transaction_id,
                transaction_ids,
                status,
                ..
            } => {
                assert_eq!(complex_transaction_id, "ct-1");
                assert_eq!(transaction_ids.len(), 2);
                assert_eq!(status, "PRODUCTION");
            }
            _ => panic!("Expected ComplexTransactionBooked"),
        }
    }

    #[test]
    fn test_event_schedules_rebuilt_serialization() {
        let event = DomainEvent::event_schedules_rebuilt("bond-1".to_string(), 2, 1);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"event_schedules_rebuilt\""));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}

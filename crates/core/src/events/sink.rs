//! Where committed-change events go.

use std::sync::{Arc, Mutex};

use log::debug;

use super::DomainEvent;

/// Receives the events of a committed complex transaction.
///
/// Publishing happens after the savepoint is released, so a sink can never
/// roll back a booking. Implementations should hand the events off quickly.
pub trait DomainEventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);

    /// Events of one commit, in the order they were produced.
    fn emit_batch(&self, events: Vec<DomainEvent>) {
        events.into_iter().for_each(|event| self.emit(event));
    }
}

/// Drops every event. Used when the host does not subscribe.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpDomainEventSink;

impl DomainEventSink for NoOpDomainEventSink {
    fn emit(&self, event: DomainEvent) {
        debug!("Dropping domain event {:?}", event);
    }
}

/// Keeps emitted events in memory so callers can inspect them.
#[derive(Clone, Debug, Default)]
pub struct MockDomainEventSink {
    received: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MockDomainEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_received<R>(&self, f: impl FnOnce(&mut Vec<DomainEvent>) -> R) -> R {
        let mut received = self
            .received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut received)
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.with_received(|received| received.clone())
    }

    pub fn clear(&self) {
        self.with_received(|received| received.clear());
    }

    pub fn len(&self) -> usize {
        self.with_received(|received| received.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DomainEventSink for MockDomainEventSink {
    fn emit(&self, event: DomainEvent) {
        self.with_received(|received| received.push(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_keeps_commit_order() {
        let sink = MockDomainEventSink::new();
        sink.emit(DomainEvent::instruments_changed(vec!["bond-1".to_string()]));
        sink.emit_batch(vec![
            DomainEvent::event_schedules_rebuilt("bond-1".to_string(), 2, 1),
            DomainEvent::complex_transactions_deleted(vec!["ct-1".to_string()]),
        ]);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[2],
            DomainEvent::complex_transactions_deleted(vec!["ct-1".to_string()])
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_shared_clones_see_the_same_events() {
        let sink = MockDomainEventSink::new();
        let handle: Arc<dyn DomainEventSink> = Arc::new(sink.clone());

        handle.emit(DomainEvent::instruments_changed(vec!["bond-2".to_string()]));
        NoOpDomainEventSink.emit(DomainEvent::instruments_changed(vec!["bond-3".to_string()]));

        assert_eq!(sink.len(), 1);
    }
}

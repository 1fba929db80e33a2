use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use travelos_booking::{Booking, BookingLifecycleStatus, LifecycleEvent, Metadata, NewLifecycleEvent};
use travelos_core::{BookingId, LifecycleEventId};

use super::{BookingRepository, CommittedTransition, RepositoryError, TransitionRecord};

#[derive(Debug, Default)]
struct State {
    bookings: HashMap<BookingId, Booking>,
    /// Append-only, in insertion order.
    events: Vec<LifecycleEvent>,
}

impl State {
    fn find_by_key(&self, booking_id: BookingId, key: &str) -> Option<&LifecycleEvent> {
        self.events
            .iter()
            .find(|e| e.booking_id == booking_id && e.idempotency_key.as_deref() == Some(key))
    }

    fn update_status(
        &mut self,
        booking_id: BookingId,
        status: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, RepositoryError> {
        let booking = self
            .bookings
            .get_mut(&booking_id)
            .ok_or(RepositoryError::NotFound(booking_id))?;
        booking.apply_transition(status, metadata, cancellation_reason, Utc::now());
        Ok(booking.clone())
    }

    fn append_event(&mut self, event: NewLifecycleEvent) -> Result<LifecycleEvent, RepositoryError> {
        if let Some(key) = event.idempotency_key.as_deref() {
            if self.find_by_key(event.booking_id, key).is_some() {
                return Err(RepositoryError::DuplicateIdempotencyKey {
                    booking_id: event.booking_id,
                    key: key.to_string(),
                });
            }
        }
        let stored = event.into_event(LifecycleEventId::new(), Utc::now());
        self.events.push(stored.clone());
        Ok(stored)
    }
}

/// In-memory booking repository.
///
/// Intended for tests/dev. One lock guards bookings and events together, which
/// makes `record_transition` atomic for concurrent readers.
#[derive(Debug, Default)]
pub struct InMemoryBookingRepository {
    state: RwLock<State>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a booking row (seeding; the booking CRUD lives elsewhere).
    pub fn insert_booking(&self, booking: Booking) -> Result<(), RepositoryError> {
        let mut state = self.write()?;
        state.bookings.insert(booking.id, booking);
        Ok(())
    }

    /// Total number of stored lifecycle events across all bookings.
    pub fn event_count(&self) -> usize {
        self.state.read().map(|s| s.events.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, RepositoryError> {
        self.state
            .read()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, RepositoryError> {
        self.state
            .write()
            .map_err(|_| RepositoryError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn get_booking_by_id(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, RepositoryError> {
        Ok(self.read()?.bookings.get(&booking_id).cloned())
    }

    async fn update_booking_lifecycle_status(
        &self,
        booking_id: BookingId,
        status: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, RepositoryError> {
        self.write()?
            .update_status(booking_id, status, metadata, cancellation_reason)
    }

    async fn find_lifecycle_event_by_idempotency_key(
        &self,
        booking_id: BookingId,
        idempotency_key: &str,
    ) -> Result<Option<LifecycleEvent>, RepositoryError> {
        Ok(self.read()?.find_by_key(booking_id, idempotency_key).cloned())
    }

    async fn create_lifecycle_event(
        &self,
        event: NewLifecycleEvent,
    ) -> Result<LifecycleEvent, RepositoryError> {
        self.write()?.append_event(event)
    }

    async fn list_lifecycle_events(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        Ok(self
            .read()?
            .events
            .iter()
            .filter(|e| e.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn record_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<CommittedTransition, RepositoryError> {
        let mut state = self.write()?;

        let current = state
            .bookings
            .get(&record.booking_id)
            .map(|b| b.lifecycle_status)
            .ok_or(RepositoryError::NotFound(record.booking_id))?;
        if current != record.expected_status {
            return Err(RepositoryError::Conflict(format!(
                "booking {} expected {}, found {}",
                record.booking_id, record.expected_status, current
            )));
        }

        // Check the key before touching the booking so a collision leaves no trace.
        if let Some(key) = record.event.idempotency_key.as_deref() {
            if state.find_by_key(record.booking_id, key).is_some() {
                return Err(RepositoryError::DuplicateIdempotencyKey {
                    booking_id: record.booking_id,
                    key: key.to_string(),
                });
            }
        }

        let booking = state.update_status(
            record.booking_id,
            record.next_status,
            record.metadata,
            record.cancellation_reason,
        )?;
        let event = state.append_event(record.event)?;
        Ok(CommittedTransition { booking, event })
    }
}

//! Booking persistence boundary.
//!
//! The lifecycle engine reads bookings and writes transitions exclusively through
//! [`BookingRepository`]. No business rules live here: adapters store what they
//! are given and report what they find.
//!
//! ## Atomic transitions
//!
//! `record_transition` must make the status update and the lifecycle event row
//! visible together (or not at all). Both shipped adapters override it:
//!
//! - [`InMemoryBookingRepository`]: a single write lock around both mutations
//! - [`PostgresBookingRepository`]: one SQL transaction with a conditional update
//!
//! The default implementation composes the two single-row operations and is only
//! suitable for adapters that cannot offer atomicity.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use travelos_booking::{Booking, BookingLifecycleStatus, LifecycleEvent, Metadata, NewLifecycleEvent};
use travelos_core::BookingId;

pub use in_memory::InMemoryBookingRepository;
pub use postgres::PostgresBookingRepository;

/// Repository operation error.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The booking does not exist (or vanished between read and write).
    #[error("booking not found: {0}")]
    NotFound(BookingId),

    /// The booking's status changed underneath a conditional write.
    #[error("concurrent lifecycle update: {0}")]
    Conflict(String),

    /// A lifecycle event with this idempotency key already exists for the booking.
    #[error("idempotency key '{key}' already recorded for booking {booking_id}")]
    DuplicateIdempotencyKey { booking_id: BookingId, key: String },

    /// The backing store could not be reached or rejected the operation.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Decode(String),
}

/// A validated transition ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub booking_id: BookingId,
    /// Status the engine validated against; the write fails with `Conflict` if it moved.
    pub expected_status: BookingLifecycleStatus,
    pub next_status: BookingLifecycleStatus,
    /// Full metadata map to store on the booking (already merged).
    pub metadata: Metadata,
    /// Written together with the status when `next_status` is cancelled.
    pub cancellation_reason: Option<String>,
    pub event: NewLifecycleEvent,
}

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedTransition {
    pub booking: Booking,
    pub event: LifecycleEvent,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking_by_id(&self, booking_id: BookingId)
    -> Result<Option<Booking>, RepositoryError>;

    /// Unconditionally set the status and metadata; stamps completion/cancellation times
    /// and stores `cancellation_reason` when `status` is cancelled.
    ///
    /// Fails with `NotFound` if the booking vanished.
    async fn update_booking_lifecycle_status(
        &self,
        booking_id: BookingId,
        status: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, RepositoryError>;

    async fn find_lifecycle_event_by_idempotency_key(
        &self,
        booking_id: BookingId,
        idempotency_key: &str,
    ) -> Result<Option<LifecycleEvent>, RepositoryError>;

    /// Append one event. Fails with `DuplicateIdempotencyKey` on a key collision.
    async fn create_lifecycle_event(
        &self,
        event: NewLifecycleEvent,
    ) -> Result<LifecycleEvent, RepositoryError>;

    /// All events of a booking, oldest first.
    async fn list_lifecycle_events(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<LifecycleEvent>, RepositoryError>;

    /// Persist the status change and its event together.
    async fn record_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<CommittedTransition, RepositoryError> {
        let current = self
            .get_booking_by_id(record.booking_id)
            .await?
            .ok_or(RepositoryError::NotFound(record.booking_id))?;
        if current.lifecycle_status != record.expected_status {
            return Err(RepositoryError::Conflict(format!(
                "booking {} expected {}, found {}",
                record.booking_id, record.expected_status, current.lifecycle_status
            )));
        }

        let booking = self
            .update_booking_lifecycle_status(
                record.booking_id,
                record.next_status,
                record.metadata,
                record.cancellation_reason,
            )
            .await?;
        let event = self.create_lifecycle_event(record.event).await?;
        Ok(CommittedTransition { booking, event })
    }
}

#[async_trait]
impl<R> BookingRepository for Arc<R>
where
    R: BookingRepository + ?Sized,
{
    async fn get_booking_by_id(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, RepositoryError> {
        (**self).get_booking_by_id(booking_id).await
    }

    async fn update_booking_lifecycle_status(
        &self,
        booking_id: BookingId,
        status: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, RepositoryError> {
        (**self)
            .update_booking_lifecycle_status(booking_id, status, metadata, cancellation_reason)
            .await
    }

    async fn find_lifecycle_event_by_idempotency_key(
        &self,
        booking_id: BookingId,
        idempotency_key: &str,
    ) -> Result<Option<LifecycleEvent>, RepositoryError> {
        (**self)
            .find_lifecycle_event_by_idempotency_key(booking_id, idempotency_key)
            .await
    }

    async fn create_lifecycle_event(
        &self,
        event: NewLifecycleEvent,
    ) -> Result<LifecycleEvent, RepositoryError> {
        (**self).create_lifecycle_event(event).await
    }

    async fn list_lifecycle_events(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        (**self).list_lifecycle_events(booking_id).await
    }

    async fn record_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<CommittedTransition, RepositoryError> {
        (**self).record_transition(record).await
    }
}

//! Booking lifecycle engine (application-level orchestration).
//!
//! ## Transition flow
//!
//! ```text
//! TransitionRequest
//!   ↓
//! 1. Load booking (NotFound if absent)
//!   ↓
//! 2. Idempotency key already recorded? → return that event, changed = false
//!   ↓
//! 3. Target == current status? → changed = false, nothing written
//!   ↓
//! 4. Validate the edge against the transition graph (InvalidTransition)
//!   ↓
//! 5+6. Conditional status write + event append, atomically (repository)
//!   ↓
//! 7. Publish booking.lifecycle.changed (+ status-specific event)
//!   ↓
//! 8. changed = true
//! ```
//!
//! Steps 1-6 abort and propagate on failure; nothing is written. Step 7 runs after
//! commit: a failing subscriber is logged and never undoes or fails the transition.
//!
//! A conditional-write miss (`Conflict`) or an idempotency-key collision means another
//! caller won a race on the same booking. If the request carried a key and the winner
//! recorded it, the call resolves like step 2; otherwise it fails with `Conflict`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use travelos_booking::{
    ActorType, Booking, BookingEventBus, BookingEventName, BookingLifecycleChanged,
    BookingLifecycleStatus, LifecycleEvent, Metadata, NewLifecycleEvent, merge_metadata,
};
use travelos_core::BookingId;
use travelos_events::EventName;

use crate::repository::{BookingRepository, CommittedTransition, RepositoryError, TransitionRecord};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("booking not found: {0}")]
    NotFound(BookingId),

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: BookingLifecycleStatus,
        to: BookingLifecycleStatus,
    },

    /// Another transition on the same booking committed first.
    #[error("concurrent lifecycle update: {0}")]
    Conflict(String),

    #[error("booking store failure: {0}")]
    Store(#[source] RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => LifecycleError::NotFound(id),
            RepositoryError::Conflict(msg) => LifecycleError::Conflict(msg),
            other => LifecycleError::Store(other),
        }
    }
}

/// Stored on a cancelled booking when the request names no reason.
pub const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by user";

/// A request to move a booking to `to_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRequest {
    pub booking_id: BookingId,
    pub to_status: BookingLifecycleStatus,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub note: Option<String>,
    /// Only meaningful when cancelling; falls back to `note`.
    pub cancellation_reason: Option<String>,
    /// Requests carrying the same key for the same booking take effect once.
    pub idempotency_key: Option<String>,
    /// Shallow-merged over the booking's metadata; recorded verbatim on the event.
    pub metadata: Metadata,
}

impl TransitionRequest {
    pub fn new(
        booking_id: BookingId,
        to_status: BookingLifecycleStatus,
        actor_type: ActorType,
    ) -> Self {
        Self {
            booking_id,
            to_status,
            actor_type,
            actor_id: None,
            note: None,
            cancellation_reason: None,
            idempotency_key: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_actor_id(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_cancellation_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancellation_reason = Some(reason.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Trimmed key; blank keys count as absent.
    fn normalized_key(&self) -> Option<String> {
        self.idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    /// Reason to store with a cancellation: explicit reason, then note, then the default.
    fn resolved_cancellation_reason(&self) -> Option<String> {
        if self.to_status != BookingLifecycleStatus::Cancelled {
            return None;
        }
        let reason = [&self.cancellation_reason, &self.note]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref().map(str::trim))
            .find(|candidate| !candidate.is_empty())
            .unwrap_or(DEFAULT_CANCELLATION_REASON);
        Some(reason.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub booking: Booking,
    /// The recorded event, or the earlier one an idempotent replay matched.
    /// `None` for a self-transition.
    pub event: Option<LifecycleEvent>,
    pub changed: bool,
}

/// Validates, persists and publishes booking status changes.
pub struct LifecycleEngine<R> {
    repository: R,
    bus: Arc<BookingEventBus>,
}

impl<R> LifecycleEngine<R>
where
    R: BookingRepository,
{
    pub fn new(repository: R, bus: Arc<BookingEventBus>) -> Self {
        Self { repository, bus }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn bus(&self) -> &Arc<BookingEventBus> {
        &self.bus
    }

    #[instrument(
        skip(self, request),
        fields(
            booking_id = %request.booking_id,
            to = %request.to_status,
            actor_type = %request.actor_type
        ),
        err
    )]
    pub async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, LifecycleError> {
        let booking_id = request.booking_id;
        let booking = self
            .repository
            .get_booking_by_id(booking_id)
            .await?
            .ok_or(LifecycleError::NotFound(booking_id))?;

        let idempotency_key = request.normalized_key();
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self
                .repository
                .find_lifecycle_event_by_idempotency_key(booking_id, key)
                .await?
            {
                debug!(idempotency_key = key, "idempotent replay; transition already recorded");
                return Ok(TransitionOutcome {
                    booking,
                    event: Some(existing),
                    changed: false,
                });
            }
        }

        let current = booking.lifecycle_status;
        if request.to_status == current {
            debug!(status = %current, "self-transition; nothing to record");
            return Ok(TransitionOutcome {
                booking,
                event: None,
                changed: false,
            });
        }

        if !current.can_transition_to(request.to_status) {
            return Err(LifecycleError::InvalidTransition {
                from: current,
                to: request.to_status,
            });
        }

        let record = TransitionRecord {
            booking_id,
            expected_status: current,
            next_status: request.to_status,
            metadata: merge_metadata(&booking.metadata, &request.metadata),
            cancellation_reason: request.resolved_cancellation_reason(),
            event: NewLifecycleEvent {
                booking_id,
                from_status: Some(current),
                to_status: request.to_status,
                actor_type: request.actor_type,
                actor_id: request.actor_id,
                idempotency_key: idempotency_key.clone(),
                note: request.note,
                metadata: request.metadata,
            },
        };

        let committed = match self.repository.record_transition(record).await {
            Ok(committed) => committed,
            Err(
                err @ (RepositoryError::Conflict(_)
                | RepositoryError::DuplicateIdempotencyKey { .. }),
            ) => {
                return self
                    .resolve_race(booking_id, idempotency_key.as_deref(), err)
                    .await;
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            from = %current,
            to = %committed.booking.lifecycle_status,
            event_id = %committed.event.id,
            "booking lifecycle transition committed"
        );

        self.publish(current, &committed).await;

        Ok(TransitionOutcome {
            booking: committed.booking,
            event: Some(committed.event),
            changed: true,
        })
    }

    /// A concurrent writer got there first. Succeed as a replay if it recorded our key.
    async fn resolve_race(
        &self,
        booking_id: BookingId,
        idempotency_key: Option<&str>,
        cause: RepositoryError,
    ) -> Result<TransitionOutcome, LifecycleError> {
        if let Some(key) = idempotency_key {
            if let Some(existing) = self
                .repository
                .find_lifecycle_event_by_idempotency_key(booking_id, key)
                .await?
            {
                let booking = self
                    .repository
                    .get_booking_by_id(booking_id)
                    .await?
                    .ok_or(LifecycleError::NotFound(booking_id))?;
                debug!(idempotency_key = key, "lost race to an identical request; replaying");
                return Ok(TransitionOutcome {
                    booking,
                    event: Some(existing),
                    changed: false,
                });
            }
        }

        warn!(error = %cause, "lifecycle transition lost a concurrent update");
        Err(LifecycleError::Conflict(cause.to_string()))
    }

    async fn publish(&self, previous: BookingLifecycleStatus, committed: &CommittedTransition) {
        let next = committed.booking.lifecycle_status;
        let payload = BookingLifecycleChanged {
            booking: committed.booking.clone(),
            previous_status: Some(previous),
            next_status: next,
            event: committed.event.clone(),
        };

        let names = std::iter::once(BookingEventName::LifecycleChanged)
            .chain(BookingEventName::for_status(next));
        for name in names {
            if let Err(err) = self.bus.emit(name, payload.clone()).await {
                warn!(
                    event = name.as_str(),
                    booking_id = %committed.booking.id,
                    error = %err,
                    "post-commit event handler failed; transition stays committed"
                );
            }
        }
    }
}

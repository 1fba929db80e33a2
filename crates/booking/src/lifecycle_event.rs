use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use travelos_core::{BookingId, LifecycleEventId};

use crate::booking::Metadata;
use crate::status::{ActorType, BookingLifecycleStatus};

/// Immutable record of one lifecycle transition.
///
/// Append-only: created once per successful transition, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: LifecycleEventId,
    pub booking_id: BookingId,
    /// `None` only for a booking's first recorded event.
    pub from_status: Option<BookingLifecycleStatus>,
    pub to_status: BookingLifecycleStatus,
    /// `booking.<to_status>`.
    pub event_name: String,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    /// Unique per booking when present.
    pub idempotency_key: Option<String>,
    pub note: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// A lifecycle event ready to be appended (no id / timestamp yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLifecycleEvent {
    pub booking_id: BookingId,
    pub from_status: Option<BookingLifecycleStatus>,
    pub to_status: BookingLifecycleStatus,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub note: Option<String>,
    pub metadata: Metadata,
}

impl NewLifecycleEvent {
    pub fn event_name(&self) -> String {
        self.to_status.event_name()
    }

    pub fn into_event(self, id: LifecycleEventId, created_at: DateTime<Utc>) -> LifecycleEvent {
        LifecycleEvent {
            id,
            event_name: self.event_name(),
            booking_id: self.booking_id,
            from_status: self.from_status,
            to_status: self.to_status,
            actor_type: self.actor_type,
            actor_id: self.actor_id,
            idempotency_key: self.idempotency_key,
            note: self.note,
            metadata: self.metadata,
            created_at,
        }
    }
}

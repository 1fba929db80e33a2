//! Names and payloads published on the booking event bus.

use serde::Serialize;

use travelos_events::{EventBus, EventName};

use crate::booking::Booking;
use crate::lifecycle_event::LifecycleEvent;
use crate::status::BookingLifecycleStatus;

/// The closed set of events published by the lifecycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookingEventName {
    /// Every committed transition.
    LifecycleChanged,
    PaymentConfirmed,
    SupplierConfirmed,
    Completed,
}

impl BookingEventName {
    /// Status-specific event published in addition to `LifecycleChanged`, if any.
    pub fn for_status(status: BookingLifecycleStatus) -> Option<Self> {
        match status {
            BookingLifecycleStatus::PaymentConfirmed => Some(Self::PaymentConfirmed),
            BookingLifecycleStatus::SupplierConfirmed => Some(Self::SupplierConfirmed),
            BookingLifecycleStatus::Completed => Some(Self::Completed),
            _ => None,
        }
    }
}

impl EventName for BookingEventName {
    fn as_str(&self) -> &'static str {
        match self {
            BookingEventName::LifecycleChanged => "booking.lifecycle.changed",
            BookingEventName::PaymentConfirmed => "booking.payment_confirmed",
            BookingEventName::SupplierConfirmed => "booking.supplier_confirmed",
            BookingEventName::Completed => "booking.completed",
        }
    }
}

/// Payload of every booking bus event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingLifecycleChanged {
    pub booking: Booking,
    pub previous_status: Option<BookingLifecycleStatus>,
    pub next_status: BookingLifecycleStatus,
    pub event: LifecycleEvent,
}

/// The bus type shared by the lifecycle engine and automation handlers.
pub type BookingEventBus = EventBus<BookingEventName, BookingLifecycleChanged>;

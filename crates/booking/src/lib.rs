//! Booking lifecycle domain module.
//!
//! Business rules for booking state (statuses, the transition graph, timestamp
//! invariants, metadata merging) and the records the lifecycle core exchanges
//! with its collaborators. Deterministic domain logic only (no IO, no HTTP, no storage).

pub mod booking;
pub mod document;
pub mod events;
pub mod lifecycle_event;
pub mod payment;
pub mod status;
pub mod webhook;

pub use booking::{Booking, Metadata, merge_metadata};
pub use document::{Document, DocumentKind, DocumentStatus, GenerateDocument};
pub use events::{BookingEventBus, BookingEventName, BookingLifecycleChanged};
pub use lifecycle_event::{LifecycleEvent, NewLifecycleEvent};
pub use payment::{
    NewPayment, Payment, PaymentEventKind, PaymentPatch, PaymentPayloadError, PaymentProvider,
    PaymentStatus, PaymentWebhook,
};
pub use status::{ActorType, BookingLifecycleStatus};
pub use webhook::{
    NewWebhookEvent, WebhookEventPatch, WebhookEventRecord, WebhookEventStatus, WebhookKey,
    infer_event_type,
};

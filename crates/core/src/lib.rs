//! `travelos-core`: shared primitives for the booking lifecycle core.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{BookingId, CustomerId, DocumentId, LifecycleEventId, PaymentId, WebhookEventId};

//! Infrastructure layer: storage adapters (bookings, webhook ledger, payments,
//! documents), the lifecycle engine, webhook processing, automation wiring, and
//! process configuration.

pub mod automation;
pub mod config;
pub mod documents;
pub mod lifecycle_engine;
pub mod notifications;
pub mod payment_webhook;
pub mod payments;
pub mod pg;
pub mod repository;
pub mod webhook_ledger;
pub mod webhook_lock;

mod integration_tests;

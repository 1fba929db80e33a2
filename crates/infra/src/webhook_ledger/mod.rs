//! Webhook dedup ledger storage.
//!
//! One row per `(provider, event_id)`. The storage adapter exposes an explicit
//! insert-or-detect-conflict primitive ([`LedgerInsert`]) so callers never have to
//! interpret driver error text to recognise a duplicate delivery.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use travelos_booking::{NewWebhookEvent, WebhookEventPatch, WebhookEventRecord, WebhookKey};

pub use in_memory::{InMemoryWebhookLedger, LedgerAvailability};
pub use postgres::PostgresWebhookLedger;

/// Outcome of a ledger insert.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerInsert {
    /// This caller created the row and owns processing of the delivery.
    Inserted(WebhookEventRecord),
    /// A row for this key already exists.
    Conflict,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger table is not provisioned.
    #[error("webhook events table is missing")]
    TableMissing,

    #[error("webhook ledger unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt webhook ledger row: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WebhookLedger: Send + Sync {
    async fn insert(&self, event: NewWebhookEvent) -> Result<LedgerInsert, LedgerError>;

    /// Apply `patch` to the row for `key`. `Ok(None)` if no such row.
    async fn update(
        &self,
        key: &WebhookKey,
        patch: &WebhookEventPatch,
    ) -> Result<Option<WebhookEventRecord>, LedgerError>;

    async fn get(&self, key: &WebhookKey) -> Result<Option<WebhookEventRecord>, LedgerError>;

    /// Remove the row for `key`. Returns whether a row was deleted.
    async fn delete(&self, key: &WebhookKey) -> Result<bool, LedgerError>;
}

#[async_trait]
impl<L> WebhookLedger for Arc<L>
where
    L: WebhookLedger + ?Sized,
{
    async fn insert(&self, event: NewWebhookEvent) -> Result<LedgerInsert, LedgerError> {
        (**self).insert(event).await
    }

    async fn update(
        &self,
        key: &WebhookKey,
        patch: &WebhookEventPatch,
    ) -> Result<Option<WebhookEventRecord>, LedgerError> {
        (**self).update(key, patch).await
    }

    async fn get(&self, key: &WebhookKey) -> Result<Option<WebhookEventRecord>, LedgerError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &WebhookKey) -> Result<bool, LedgerError> {
        (**self).delete(key).await
    }
}

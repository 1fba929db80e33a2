//! Webhook dedup gate keyed by `(provider, event_id)`.
//!
//! `acquire` claims a delivery by inserting its ledger row. Callers must keep the
//! three outcomes apart:
//!
//! | outcome | `ok` | `skipped` | caller action |
//! |---------|------|-----------|---------------|
//! | `Acquired` | true | false | process the delivery |
//! | `Duplicate` | true | true | already handled; acknowledge the sender |
//! | `Failed` | false | false | unknown state; fail so the provider redelivers (or proceed without dedup on `TableMissing`) |

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use travelos_booking::{
    NewWebhookEvent, WebhookEventPatch, WebhookEventRecord, WebhookEventStatus, WebhookKey,
    infer_event_type,
};

use crate::webhook_ledger::{LedgerError, LedgerInsert, WebhookLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    InvalidLockKey,
    DuplicateEvent,
    TableMissing,
    InsertFailed,
}

impl LockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            LockReason::InvalidLockKey => "invalid_lock_key",
            LockReason::DuplicateEvent => "duplicate_event",
            LockReason::TableMissing => "webhook_events_table_missing",
            LockReason::InsertFailed => "lock_insert_failed",
        }
    }
}

impl core::fmt::Display for LockReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LockAcquisition {
    /// This caller owns processing of the delivery; carries the claimed ledger row.
    Acquired(WebhookEventRecord),
    /// Someone else claimed the key first.
    Duplicate(WebhookKey),
    Failed { reason: LockReason, detail: String },
}

impl LockAcquisition {
    pub fn ok(&self) -> bool {
        !matches!(self, LockAcquisition::Failed { .. })
    }

    pub fn skipped(&self) -> bool {
        matches!(self, LockAcquisition::Duplicate(_))
    }

    pub fn reason(&self) -> Option<LockReason> {
        match self {
            LockAcquisition::Acquired(_) => None,
            LockAcquisition::Duplicate(_) => Some(LockReason::DuplicateEvent),
            LockAcquisition::Failed { reason, .. } => Some(*reason),
        }
    }

    fn failed(reason: LockReason, detail: impl Into<String>) -> Self {
        LockAcquisition::Failed {
            reason,
            detail: detail.into(),
        }
    }
}

pub struct WebhookLock<L> {
    ledger: L,
}

impl<L> WebhookLock<L>
where
    L: WebhookLedger,
{
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Claim `(provider, event_id)`. Never errors: every failure is an outcome.
    pub async fn acquire(
        &self,
        provider: &str,
        event_id: &str,
        payload: Option<JsonValue>,
    ) -> LockAcquisition {
        let key = match WebhookKey::new(provider, event_id) {
            Ok(key) => key,
            Err(err) => return LockAcquisition::failed(LockReason::InvalidLockKey, err.to_string()),
        };

        let event = NewWebhookEvent {
            key: key.clone(),
            event_type: payload.as_ref().and_then(infer_event_type),
            status: WebhookEventStatus::Processing,
            payload,
        };

        match self.ledger.insert(event).await {
            Ok(LedgerInsert::Inserted(record)) => {
                debug!(key = %key, ledger_id = %record.id, "webhook lock acquired");
                LockAcquisition::Acquired(record)
            }
            Ok(LedgerInsert::Conflict) => {
                info!(key = %key, "duplicate webhook delivery skipped");
                LockAcquisition::Duplicate(key)
            }
            Err(LedgerError::TableMissing) => {
                warn!(key = %key, "webhook events table missing; dedup unavailable");
                LockAcquisition::failed(
                    LockReason::TableMissing,
                    LedgerError::TableMissing.to_string(),
                )
            }
            Err(err) => {
                warn!(key = %key, error = %err, "webhook lock insert failed");
                LockAcquisition::failed(LockReason::InsertFailed, err.to_string())
            }
        }
    }

    /// Best-effort follow-up update; failures are logged only.
    pub async fn mark(&self, provider: &str, event_id: &str, patch: WebhookEventPatch) {
        if patch.is_empty() {
            return;
        }
        let Ok(key) = WebhookKey::new(provider, event_id) else {
            warn!(provider, event_id, "cannot mark webhook event with an invalid key");
            return;
        };

        match self.ledger.update(&key, &patch).await {
            Ok(Some(_)) => debug!(key = %key, status = ?patch.status, "webhook event marked"),
            Ok(None) => debug!(key = %key, "no webhook ledger row to mark"),
            Err(err) => warn!(key = %key, error = %err, "failed to mark webhook event"),
        }
    }

    /// Drop the claim so a redelivery can be processed. Returns whether a row was removed.
    pub async fn release(&self, provider: &str, event_id: &str) -> bool {
        let Ok(key) = WebhookKey::new(provider, event_id) else {
            return false;
        };

        match self.ledger.delete(&key).await {
            Ok(removed) => {
                debug!(key = %key, removed, "webhook lock released");
                removed
            }
            Err(err) => {
                warn!(key = %key, error = %err, "failed to release webhook lock");
                false
            }
        }
    }
}

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use travelos_booking::{NewWebhookEvent, WebhookEventPatch, WebhookEventRecord, WebhookKey};
use travelos_core::WebhookEventId;

use super::{LedgerError, LedgerInsert, WebhookLedger};

/// Simulated backing-store condition for the in-memory ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerAvailability {
    #[default]
    Available,
    /// Behave as if the table was never provisioned.
    TableMissing,
    /// Behave as if the store cannot be reached.
    Unavailable,
}

#[derive(Debug, Default)]
struct State {
    rows: HashMap<WebhookKey, WebhookEventRecord>,
    availability: LedgerAvailability,
}

/// In-memory webhook ledger.
///
/// Intended for tests/dev. The insert check-and-set happens under one write lock,
/// so concurrent claims of the same key resolve to exactly one `Inserted`.
#[derive(Debug, Default)]
pub struct InMemoryWebhookLedger {
    state: RwLock<State>,
}

impl InMemoryWebhookLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_availability(&self, availability: LedgerAvailability) {
        if let Ok(mut state) = self.state.write() {
            state.availability = availability;
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, LedgerError> {
        let state = self
            .state
            .write()
            .map_err(|_| LedgerError::Unavailable("lock poisoned".to_string()))?;
        check(state.availability)?;
        Ok(state)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, LedgerError> {
        let state = self
            .state
            .read()
            .map_err(|_| LedgerError::Unavailable("lock poisoned".to_string()))?;
        check(state.availability)?;
        Ok(state)
    }
}

fn check(availability: LedgerAvailability) -> Result<(), LedgerError> {
    match availability {
        LedgerAvailability::Available => Ok(()),
        LedgerAvailability::TableMissing => Err(LedgerError::TableMissing),
        LedgerAvailability::Unavailable => {
            Err(LedgerError::Unavailable("simulated outage".to_string()))
        }
    }
}

#[async_trait]
impl WebhookLedger for InMemoryWebhookLedger {
    async fn insert(&self, event: NewWebhookEvent) -> Result<LedgerInsert, LedgerError> {
        let mut state = self.write()?;
        if state.rows.contains_key(&event.key) {
            return Ok(LedgerInsert::Conflict);
        }
        let key = event.key.clone();
        let record = WebhookEventRecord::from_new(WebhookEventId::new(), event, Utc::now());
        state.rows.insert(key, record.clone());
        Ok(LedgerInsert::Inserted(record))
    }

    async fn update(
        &self,
        key: &WebhookKey,
        patch: &WebhookEventPatch,
    ) -> Result<Option<WebhookEventRecord>, LedgerError> {
        let mut state = self.write()?;
        Ok(state.rows.get_mut(key).map(|record| {
            record.apply_patch(patch, Utc::now());
            record.clone()
        }))
    }

    async fn get(&self, key: &WebhookKey) -> Result<Option<WebhookEventRecord>, LedgerError> {
        Ok(self.read()?.rows.get(key).cloned())
    }

    async fn delete(&self, key: &WebhookKey) -> Result<bool, LedgerError> {
        Ok(self.write()?.rows.remove(key).is_some())
    }
}

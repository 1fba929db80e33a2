//! Webhook dedup ledger records.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use travelos_core::{BookingId, DomainError, DomainResult, PaymentId, WebhookEventId};

/// Normalized dedup key: lower-cased provider + trimmed provider-native event id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookKey {
    provider: String,
    event_id: String,
}

impl WebhookKey {
    /// Normalize and validate. Blank provider or event id is rejected.
    pub fn new(provider: &str, event_id: &str) -> DomainResult<Self> {
        let provider = provider.trim().to_lowercase();
        let event_id = event_id.trim().to_string();
        if provider.is_empty() || event_id.is_empty() {
            return Err(DomainError::validation(
                "webhook provider and event id must be non-empty",
            ));
        }
        Ok(Self { provider, event_id })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }
}

impl core::fmt::Display for WebhookKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.provider, self.event_id)
    }
}

/// Processing state of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventStatus {
    /// Claimed by a processor; business logic not finished yet.
    Processing,
    Processed,
    Failed,
    /// Delivery understood but carries nothing to act on.
    Ignored,
}

impl WebhookEventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEventStatus::Processing => "processing",
            WebhookEventStatus::Processed => "processed",
            WebhookEventStatus::Failed => "failed",
            WebhookEventStatus::Ignored => "ignored",
        }
    }
}

impl FromStr for WebhookEventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(WebhookEventStatus::Processing),
            "processed" => Ok(WebhookEventStatus::Processed),
            "failed" => Ok(WebhookEventStatus::Failed),
            "ignored" => Ok(WebhookEventStatus::Ignored),
            other => Err(DomainError::unknown_variant("webhook event status", other)),
        }
    }
}

/// Row inserted when a delivery is first claimed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWebhookEvent {
    pub key: WebhookKey,
    pub event_type: Option<String>,
    pub status: WebhookEventStatus,
    pub payload: Option<JsonValue>,
}

/// Ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub id: WebhookEventId,
    pub provider: String,
    pub event_id: String,
    pub event_type: Option<String>,
    pub status: WebhookEventStatus,
    pub payload: Option<JsonValue>,
    pub booking_id: Option<BookingId>,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    pub fn from_new(id: WebhookEventId, new: NewWebhookEvent, at: DateTime<Utc>) -> Self {
        Self {
            id,
            provider: new.key.provider,
            event_id: new.key.event_id,
            event_type: new.event_type,
            status: new.status,
            payload: new.payload,
            booking_id: None,
            payment_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn apply_patch(&mut self, patch: &WebhookEventPatch, at: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(booking_id) = patch.booking_id {
            self.booking_id = Some(booking_id);
        }
        if let Some(payment_id) = patch.payment_id {
            self.payment_id = Some(payment_id);
        }
        if let Some(payload) = &patch.payload {
            self.payload = Some(payload.clone());
        }
        if let Some(event_type) = &patch.event_type {
            self.event_type = Some(event_type.clone());
        }
        self.updated_at = at;
    }
}

/// Follow-up update after processing. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebhookEventPatch {
    pub status: Option<WebhookEventStatus>,
    pub booking_id: Option<BookingId>,
    pub payment_id: Option<PaymentId>,
    pub payload: Option<JsonValue>,
    pub event_type: Option<String>,
}

impl WebhookEventPatch {
    pub fn status(status: WebhookEventStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_booking(mut self, booking_id: BookingId) -> Self {
        self.booking_id = Some(booking_id);
        self
    }

    pub fn with_payment(mut self, payment_id: PaymentId) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.booking_id.is_none()
            && self.payment_id.is_none()
            && self.payload.is_none()
            && self.event_type.is_none()
    }
}

/// First string among the payload's `eventType`, `event`, `type` keys.
pub fn infer_event_type(payload: &JsonValue) -> Option<String> {
    ["eventType", "event", "type"]
        .into_iter()
        .find_map(|key| payload.get(key).and_then(JsonValue::as_str))
        .map(str::to_string)
}

//! Payment webhook deliveries (provider-agnostic) and the payment rows they leave behind.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use travelos_core::{BookingId, DomainError, PaymentId, WebhookEventId};

use crate::status::BookingLifecycleStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Razorpay,
    Stripe,
    Manual,
    BankTransfer,
}

impl PaymentProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentProvider::Razorpay => "razorpay",
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Manual => "manual",
            PaymentProvider::BankTransfer => "bank_transfer",
        }
    }

    /// Case-insensitive lookup; unknown names yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "razorpay" => Some(PaymentProvider::Razorpay),
            "stripe" => Some(PaymentProvider::Stripe),
            "manual" => Some(PaymentProvider::Manual),
            "bank_transfer" => Some(PaymentProvider::BankTransfer),
            _ => None,
        }
    }
}

impl core::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| DomainError::unknown_variant("payment provider", s))
    }
}

/// What a provider event means for the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    Captured,
    Refunded,
    /// Informational; no lifecycle change.
    Other,
}

impl PaymentEventKind {
    pub fn classify(event_type: &str) -> Self {
        match event_type.trim().to_lowercase().as_str() {
            "payment.captured" | "payment_intent.succeeded" | "charge.succeeded" | "order.paid" => {
                PaymentEventKind::Captured
            }
            "payment.refunded" | "refund.processed" | "charge.refunded" => {
                PaymentEventKind::Refunded
            }
            _ => PaymentEventKind::Other,
        }
    }

    pub fn target_status(self) -> Option<BookingLifecycleStatus> {
        match self {
            PaymentEventKind::Captured => Some(BookingLifecycleStatus::PaymentConfirmed),
            PaymentEventKind::Refunded => Some(BookingLifecycleStatus::Refunded),
            PaymentEventKind::Other => None,
        }
    }
}

pub const DEFAULT_PAYMENT_EVENT_TYPE: &str = "payment.updated";

/// State of a recorded payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Captured,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Informational events leave no payment row.
    pub fn for_kind(kind: PaymentEventKind) -> Option<Self> {
        match kind {
            PaymentEventKind::Captured => Some(PaymentStatus::Captured),
            PaymentEventKind::Refunded => Some(PaymentStatus::Refunded),
            PaymentEventKind::Other => None,
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "captured" => Ok(PaymentStatus::Captured),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::unknown_variant("payment status", other)),
        }
    }
}

/// A payment row to create (or fold into an existing one).
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub booking_id: BookingId,
    pub provider: PaymentProvider,
    pub provider_payment_id: Option<String>,
    /// Ledger row of the delivery that reported this payment, when dedup was available.
    pub webhook_event_id: Option<WebhookEventId>,
    /// `"<provider>:<event_id>"`, unique across payments.
    pub idempotency_key: String,
    pub status: PaymentStatus,
    pub amount: Option<i64>,
    pub currency_code: String,
}

impl NewPayment {
    pub fn into_payment(self, id: PaymentId, at: DateTime<Utc>) -> Payment {
        Payment {
            id,
            booking_id: self.booking_id,
            provider: self.provider,
            provider_payment_id: self.provider_payment_id,
            webhook_event_id: self.webhook_event_id,
            idempotency_key: self.idempotency_key,
            status: self.status,
            amount: self.amount,
            currency_code: self.currency_code,
            created_at: at,
            updated_at: at,
        }
    }

    /// The fields a later delivery may refresh on an existing row.
    pub fn as_patch(&self) -> PaymentPatch {
        PaymentPatch {
            status: Some(self.status),
            provider_payment_id: self.provider_payment_id.clone(),
            webhook_event_id: self.webhook_event_id,
            amount: self.amount,
            currency_code: Some(self.currency_code.clone()),
        }
    }
}

/// Stored payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub provider: PaymentProvider,
    pub provider_payment_id: Option<String>,
    pub webhook_event_id: Option<WebhookEventId>,
    pub idempotency_key: String,
    pub status: PaymentStatus,
    /// Minor units.
    pub amount: Option<i64>,
    pub currency_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn apply_patch(&mut self, patch: &PaymentPatch, at: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(provider_payment_id) = &patch.provider_payment_id {
            self.provider_payment_id = Some(provider_payment_id.clone());
        }
        if let Some(webhook_event_id) = patch.webhook_event_id {
            self.webhook_event_id = Some(webhook_event_id);
        }
        if let Some(amount) = patch.amount {
            self.amount = Some(amount);
        }
        if let Some(currency_code) = &patch.currency_code {
            self.currency_code = currency_code.clone();
        }
        self.updated_at = at;
    }
}

/// Update of an existing payment. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentPatch {
    pub status: Option<PaymentStatus>,
    pub provider_payment_id: Option<String>,
    pub webhook_event_id: Option<WebhookEventId>,
    pub amount: Option<i64>,
    pub currency_code: Option<String>,
}

/// Why a webhook body could not be turned into a [`PaymentWebhook`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentPayloadError {
    #[error("webhook payload carries no event id")]
    MissingEventId,

    #[error("bookingId is required in webhook payload")]
    MissingBookingId,

    #[error(transparent)]
    InvalidBookingId(#[from] DomainError),
}

/// A parsed payment webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentWebhook {
    pub provider: PaymentProvider,
    pub event_id: String,
    pub event_type: String,
    pub booking_id: BookingId,
    pub provider_payment_id: Option<String>,
    /// Minor units, as reported by the provider.
    pub amount: Option<i64>,
    pub currency_code: Option<String>,
    pub raw: JsonValue,
}

impl PaymentWebhook {
    /// Extract the fields the core needs from a provider payload.
    ///
    /// Accepts both a flat shape (`eventId`, `bookingId`, ...) and the nested
    /// Razorpay shape (`payload.payment.entity.{id, notes.bookingId}`). A nested
    /// payload without a top-level id is keyed `<event_type>:<entity id>`, so the
    /// capture and the refund of one payment stay distinct deliveries.
    pub fn from_payload(
        provider: PaymentProvider,
        raw: JsonValue,
    ) -> Result<Self, PaymentPayloadError> {
        let event_type = first_string(&raw, &[&["eventType"], &["event"], &["type"]])
            .unwrap_or_else(|| DEFAULT_PAYMENT_EVENT_TYPE.to_string());

        let event_id = first_string(&raw, &[&["eventId"], &["id"]])
            .or_else(|| {
                nested_str(&raw, ENTITY_ID).map(|entity_id| format!("{event_type}:{entity_id}"))
            })
            .filter(|id| !id.trim().is_empty())
            .ok_or(PaymentPayloadError::MissingEventId)?;

        let booking_id = first_string(
            &raw,
            &[
                &["bookingId"],
                &["payload", "payment", "entity", "notes", "bookingId"],
                &["payload", "payment", "entity", "notes", "booking_id"],
            ],
        )
        .ok_or(PaymentPayloadError::MissingBookingId)?
        .parse::<BookingId>()?;

        let provider_payment_id = first_string(&raw, &[&["providerPaymentId"], ENTITY_ID]);

        let amount = first_i64(&raw, &[&["amount"], &["payload", "payment", "entity", "amount"]]);

        let currency_code = first_string(
            &raw,
            &[&["currency"], &["payload", "payment", "entity", "currency"]],
        )
        .map(|code| code.trim().to_uppercase());

        Ok(Self {
            provider,
            event_id,
            event_type,
            booking_id,
            provider_payment_id,
            amount,
            currency_code,
            raw,
        })
    }

    pub fn kind(&self) -> PaymentEventKind {
        PaymentEventKind::classify(&self.event_type)
    }

    /// Idempotency key used for the lifecycle transition this delivery drives.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.provider, self.event_id.trim())
    }
}

const ENTITY_ID: &[&str] = &["payload", "payment", "entity", "id"];

fn nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn nested_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    nested(value, path).and_then(JsonValue::as_str)
}

fn first_string(value: &JsonValue, paths: &[&[&str]]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| nested_str(value, path))
        .map(str::to_string)
}

fn first_i64(value: &JsonValue, paths: &[&[&str]]) -> Option<i64> {
    paths
        .iter()
        .find_map(|path| nested(value, path).and_then(JsonValue::as_i64))
}

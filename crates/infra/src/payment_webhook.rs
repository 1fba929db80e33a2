//! Payment webhook processing: dedup gate → lifecycle transition → payment row →
//! ledger follow-up.
//!
//! | situation | ledger row | result |
//! |-----------|------------|--------|
//! | duplicate delivery | untouched | `Ok`, `duplicate = true` |
//! | ledger table missing | none | processed without dedup |
//! | ledger unreachable | none | `LedgerUnavailable` (provider should retry) |
//! | non-payment event type | `ignored` | `Ok`, `changed = false` |
//! | booking missing | `failed` | `BookingNotFound` |
//! | edge not in graph | `failed` | `InvalidTransition` |
//! | store failure / race | released | `Processing` (redelivery is safe) |
//! | payment store failure | released | `PaymentStore` (redelivery is safe) |
//! | success or replay | `processed`, linked to the payment | `Ok` |
//!
//! Redelivery after a release cannot double-transition or double-record: the
//! transition and the payment row both carry the idempotency key
//! `"<provider>:<event_id>"`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use thiserror::Error;
use tracing::{info, instrument, warn};

use travelos_booking::{
    ActorType, Booking, BookingLifecycleStatus, Metadata, NewPayment, Payment,
    PaymentPayloadError, PaymentProvider, PaymentStatus, PaymentWebhook, WebhookEventPatch,
    WebhookEventStatus,
};
use travelos_core::{BookingId, PaymentId, WebhookEventId};

use crate::lifecycle_engine::{LifecycleEngine, LifecycleError, TransitionRequest};
use crate::payments::{PaymentStoreError, PaymentsRepository};
use crate::repository::BookingRepository;
use crate::webhook_ledger::WebhookLedger;
use crate::webhook_lock::{LockAcquisition, LockReason, WebhookLock};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Payload(#[from] PaymentPayloadError),

    #[error("webhook ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("booking not found: {0}")]
    BookingNotFound(BookingId),

    #[error("invalid lifecycle transition from {from} to {to}")]
    InvalidTransition {
        from: BookingLifecycleStatus,
        to: BookingLifecycleStatus,
    },

    /// Retryable: the claim was released.
    #[error("webhook processing failed: {0}")]
    Processing(#[source] LifecycleError),

    /// Retryable: the transition committed but the payment row was not written.
    #[error("payment could not be recorded: {0}")]
    PaymentStore(#[source] PaymentStoreError),
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookReceipt {
    pub provider: PaymentProvider,
    pub event_id: String,
    pub event_type: String,
    pub booking_id: BookingId,
    pub duplicate: bool,
    /// `false` when the ledger table is missing and the delivery ran without dedup.
    pub deduplicated: bool,
    pub changed: bool,
    pub lifecycle_status: Option<BookingLifecycleStatus>,
    /// Payment row recorded for a capture or refund.
    pub payment_id: Option<PaymentId>,
}

pub struct PaymentWebhookProcessor<R, L, P> {
    engine: Arc<LifecycleEngine<R>>,
    lock: WebhookLock<L>,
    payments: P,
}

impl<R, L, P> PaymentWebhookProcessor<R, L, P>
where
    R: BookingRepository,
    L: WebhookLedger,
    P: PaymentsRepository,
{
    pub fn new(engine: Arc<LifecycleEngine<R>>, ledger: L, payments: P) -> Self {
        Self {
            engine,
            lock: WebhookLock::new(ledger),
            payments,
        }
    }

    pub fn lock(&self) -> &WebhookLock<L> {
        &self.lock
    }

    pub fn payments(&self) -> &P {
        &self.payments
    }

    #[instrument(skip(self, raw), fields(provider = %provider), err)]
    pub async fn process(
        &self,
        provider: PaymentProvider,
        raw: JsonValue,
    ) -> Result<WebhookReceipt, WebhookError> {
        let hook = PaymentWebhook::from_payload(provider, raw)?;
        let provider_name = provider.as_str();

        let mut receipt = WebhookReceipt {
            provider,
            event_id: hook.event_id.clone(),
            event_type: hook.event_type.clone(),
            booking_id: hook.booking_id,
            duplicate: false,
            deduplicated: true,
            changed: false,
            lifecycle_status: None,
            payment_id: None,
        };

        let ledger_id = match self
            .lock
            .acquire(provider_name, &hook.event_id, Some(hook.raw.clone()))
            .await
        {
            LockAcquisition::Acquired(row) => Some(row.id),
            LockAcquisition::Duplicate(_) => {
                receipt.duplicate = true;
                return Ok(receipt);
            }
            LockAcquisition::Failed {
                reason: LockReason::TableMissing,
                ..
            } => {
                warn!(
                    event_id = %hook.event_id,
                    "processing payment webhook without dedup ledger"
                );
                receipt.deduplicated = false;
                None
            }
            LockAcquisition::Failed { detail, .. } => {
                return Err(WebhookError::LedgerUnavailable(detail));
            }
        };

        let Some(target) = hook.kind().target_status() else {
            info!(
                event_id = %hook.event_id,
                event_type = %hook.event_type,
                "payment webhook carries no lifecycle change"
            );
            self.finish(&receipt, WebhookEventStatus::Ignored).await;
            return Ok(receipt);
        };

        let request = TransitionRequest::new(hook.booking_id, target, ActorType::Webhook)
            .with_idempotency_key(hook.idempotency_key())
            .with_metadata(transition_metadata(&hook));

        match self.engine.transition(request).await {
            Ok(outcome) => {
                receipt.changed = outcome.changed;
                receipt.lifecycle_status = Some(outcome.booking.lifecycle_status);
                match self.record_payment(&hook, ledger_id, &outcome.booking).await {
                    Ok(payment) => receipt.payment_id = payment.map(|p| p.id),
                    Err(err) => {
                        warn!(
                            event_id = %hook.event_id,
                            error = %err,
                            "payment row not recorded; releasing webhook claim"
                        );
                        if receipt.deduplicated {
                            self.lock.release(provider_name, &receipt.event_id).await;
                        }
                        return Err(WebhookError::PaymentStore(err));
                    }
                }
                self.finish(&receipt, WebhookEventStatus::Processed).await;
                Ok(receipt)
            }
            Err(LifecycleError::NotFound(id)) => {
                self.finish(&receipt, WebhookEventStatus::Failed).await;
                Err(WebhookError::BookingNotFound(id))
            }
            Err(LifecycleError::InvalidTransition { from, to }) => {
                self.finish(&receipt, WebhookEventStatus::Failed).await;
                Err(WebhookError::InvalidTransition { from, to })
            }
            Err(err) => {
                if receipt.deduplicated {
                    self.lock.release(provider_name, &receipt.event_id).await;
                }
                Err(WebhookError::Processing(err))
            }
        }
    }

    /// Upsert the payment this delivery reports. `None` for events that move no money.
    async fn record_payment(
        &self,
        hook: &PaymentWebhook,
        ledger_id: Option<WebhookEventId>,
        booking: &Booking,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let Some(status) = PaymentStatus::for_kind(hook.kind()) else {
            return Ok(None);
        };

        let payment = self
            .payments
            .upsert_payment(NewPayment {
                booking_id: hook.booking_id,
                provider: hook.provider,
                provider_payment_id: hook.provider_payment_id.clone(),
                webhook_event_id: ledger_id,
                idempotency_key: hook.idempotency_key(),
                status,
                amount: hook.amount,
                currency_code: hook
                    .currency_code
                    .clone()
                    .unwrap_or_else(|| booking.currency_code.clone()),
            })
            .await?;
        info!(payment_id = %payment.id, status = %payment.status, "payment recorded");
        Ok(Some(payment))
    }

    /// Record the final ledger status (only when this call owns the ledger row).
    async fn finish(&self, receipt: &WebhookReceipt, status: WebhookEventStatus) {
        if !receipt.deduplicated {
            return;
        }
        let mut patch = WebhookEventPatch::status(status).with_booking(receipt.booking_id);
        if let Some(payment_id) = receipt.payment_id {
            patch = patch.with_payment(payment_id);
        }
        self.lock
            .mark(receipt.provider.as_str(), &receipt.event_id, patch)
            .await;
    }
}

fn transition_metadata(hook: &PaymentWebhook) -> Metadata {
    match json!({
        "payment_provider": hook.provider.as_str(),
        "payment_event_id": hook.event_id,
        "payment_event_type": hook.event_type,
    }) {
        JsonValue::Object(map) => map,
        _ => Metadata::new(),
    }
}

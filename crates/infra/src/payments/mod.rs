//! Payment rows recorded from provider webhooks.
//!
//! One row per delivery that moved money, keyed by its idempotency key
//! (`"<provider>:<event_id>"`) and, when the dedup ledger was available, by the
//! ledger row id. [`PaymentsRepository::upsert_payment`] folds a redelivery into
//! the row the first attempt left behind.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use travelos_booking::{NewPayment, Payment, PaymentPatch};
use travelos_core::{BookingId, PaymentId, WebhookEventId};

pub use in_memory::InMemoryPaymentsRepository;
pub use postgres::PostgresPaymentsRepository;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentStoreError {
    /// A payment with this idempotency key already exists.
    #[error("payment already recorded for idempotency key '{0}'")]
    DuplicateIdempotencyKey(String),

    #[error("payment store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt payment row: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentsRepository: Send + Sync {
    /// Fails with `DuplicateIdempotencyKey` if the key is taken.
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError>;

    async fn get_payment_by_webhook_event_id(
        &self,
        webhook_event_id: WebhookEventId,
    ) -> Result<Option<Payment>, PaymentStoreError>;

    async fn get_payment_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, PaymentStoreError>;

    /// Apply `patch` to the payment. `Ok(None)` if no such row.
    async fn update_payment(
        &self,
        payment_id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Option<Payment>, PaymentStoreError>;

    /// Payments of a booking, oldest first.
    async fn list_payments(&self, booking_id: BookingId)
    -> Result<Vec<Payment>, PaymentStoreError>;

    /// Create the payment, or refresh the row an earlier attempt of the same
    /// delivery recorded (matched by ledger row, then idempotency key).
    async fn upsert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        let existing = match payment.webhook_event_id {
            Some(id) => self.get_payment_by_webhook_event_id(id).await?,
            None => None,
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => {
                self.get_payment_by_idempotency_key(&payment.idempotency_key)
                    .await?
            }
        };

        if let Some(found) = existing {
            return refresh(self, found, &payment).await;
        }

        match self.create_payment(payment.clone()).await {
            Ok(created) => Ok(created),
            Err(PaymentStoreError::DuplicateIdempotencyKey(key)) => {
                // Lost a race with a concurrent attempt of the same delivery.
                let found = self
                    .get_payment_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        PaymentStoreError::Unavailable(format!("payment '{key}' vanished"))
                    })?;
                refresh(self, found, &payment).await
            }
            Err(err) => Err(err),
        }
    }
}

async fn refresh<P>(
    store: &P,
    found: Payment,
    payment: &NewPayment,
) -> Result<Payment, PaymentStoreError>
where
    P: PaymentsRepository + ?Sized,
{
    Ok(store
        .update_payment(found.id, &payment.as_patch())
        .await?
        .unwrap_or(found))
}

#[async_trait]
impl<P> PaymentsRepository for Arc<P>
where
    P: PaymentsRepository + ?Sized,
{
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        (**self).create_payment(payment).await
    }

    async fn get_payment_by_webhook_event_id(
        &self,
        webhook_event_id: WebhookEventId,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        (**self).get_payment_by_webhook_event_id(webhook_event_id).await
    }

    async fn get_payment_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        (**self).get_payment_by_idempotency_key(idempotency_key).await
    }

    async fn update_payment(
        &self,
        payment_id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        (**self).update_payment(payment_id, patch).await
    }

    async fn list_payments(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, PaymentStoreError> {
        (**self).list_payments(booking_id).await
    }

    async fn upsert_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        (**self).upsert_payment(payment).await
    }
}

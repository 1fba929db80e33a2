use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use travelos_booking::{NewPayment, Payment, PaymentPatch};
use travelos_core::{BookingId, PaymentId, WebhookEventId};

use super::{PaymentStoreError, PaymentsRepository};

/// In-memory payments store.
///
/// Intended for tests/dev. Rows are kept in insertion order; the idempotency-key
/// check and the insert happen under one write lock.
#[derive(Debug, Default)]
pub struct InMemoryPaymentsRepository {
    payments: RwLock<Vec<Payment>>,
}

impl InMemoryPaymentsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Payment>>, PaymentStoreError> {
        self.payments
            .read()
            .map_err(|_| PaymentStoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Payment>>, PaymentStoreError> {
        self.payments
            .write()
            .map_err(|_| PaymentStoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl PaymentsRepository for InMemoryPaymentsRepository {
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        let mut payments = self.write()?;
        if payments
            .iter()
            .any(|p| p.idempotency_key == payment.idempotency_key)
        {
            return Err(PaymentStoreError::DuplicateIdempotencyKey(
                payment.idempotency_key,
            ));
        }
        let stored = payment.into_payment(PaymentId::new(), Utc::now());
        payments.push(stored.clone());
        Ok(stored)
    }

    async fn get_payment_by_webhook_event_id(
        &self,
        webhook_event_id: WebhookEventId,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        Ok(self
            .read()?
            .iter()
            .find(|p| p.webhook_event_id == Some(webhook_event_id))
            .cloned())
    }

    async fn get_payment_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        Ok(self
            .read()?
            .iter()
            .find(|p| p.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn update_payment(
        &self,
        payment_id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let mut payments = self.write()?;
        Ok(payments.iter_mut().find(|p| p.id == payment_id).map(|p| {
            p.apply_patch(patch, Utc::now());
            p.clone()
        }))
    }

    async fn list_payments(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, PaymentStoreError> {
        Ok(self
            .read()?
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }
}

//! Postgres-backed payments store (`payments`).
//!
//! `idempotency_key` carries a unique constraint; an insert that hits it (`23505`)
//! becomes [`PaymentStoreError::DuplicateIdempotencyKey`] so `upsert_payment` can
//! fall back to updating the winner's row.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use travelos_booking::{NewPayment, Payment, PaymentPatch, PaymentProvider, PaymentStatus};
use travelos_core::{BookingId, PaymentId, WebhookEventId};

use super::{PaymentStoreError, PaymentsRepository};
use crate::pg::{describe, is_unique_violation};

macro_rules! payment_columns {
    () => {
        "id, booking_id, provider, provider_payment_id, webhook_event_id, idempotency_key, \
         status, amount, currency_code, created_at, updated_at"
    };
}

#[derive(Debug, Clone)]
pub struct PostgresPaymentsRepository {
    pool: Arc<PgPool>,
}

impl PostgresPaymentsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl PaymentsRepository for PostgresPaymentsRepository {
    #[instrument(
        skip(self, payment),
        fields(booking_id = %payment.booking_id, key = %payment.idempotency_key),
        err
    )]
    async fn create_payment(&self, payment: NewPayment) -> Result<Payment, PaymentStoreError> {
        let result = sqlx::query(concat!(
            "INSERT INTO payments (",
            "id, booking_id, provider, provider_payment_id, webhook_event_id, idempotency_key, \
             status, amount, currency_code",
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING ",
            payment_columns!()
        ))
        .bind(*PaymentId::new().as_uuid())
        .bind(payment.booking_id.as_uuid())
        .bind(payment.provider.as_str())
        .bind(&payment.provider_payment_id)
        .bind(payment.webhook_event_id.map(|id| *id.as_uuid()))
        .bind(&payment.idempotency_key)
        .bind(payment.status.as_str())
        .bind(payment.amount)
        .bind(&payment.currency_code)
        .fetch_one(&*self.pool)
        .await;

        match result {
            Ok(row) => payment_from_row(&row),
            Err(err) if is_unique_violation(&err) => Err(
                PaymentStoreError::DuplicateIdempotencyKey(payment.idempotency_key),
            ),
            Err(err) => Err(map_sqlx_error("create_payment", err)),
        }
    }

    #[instrument(skip(self), fields(webhook_event_id = %webhook_event_id), err)]
    async fn get_payment_by_webhook_event_id(
        &self,
        webhook_event_id: WebhookEventId,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE webhook_event_id = $1 LIMIT 1"
        ))
        .bind(webhook_event_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_payment_by_webhook_event_id", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_payment_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE idempotency_key = $1"
        ))
        .bind(idempotency_key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_payment_by_idempotency_key", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    #[instrument(skip(self, patch), fields(payment_id = %payment_id), err)]
    async fn update_payment(
        &self,
        payment_id: PaymentId,
        patch: &PaymentPatch,
    ) -> Result<Option<Payment>, PaymentStoreError> {
        let row = sqlx::query(concat!(
            "UPDATE payments SET \
               status = COALESCE($2, status), \
               provider_payment_id = COALESCE($3, provider_payment_id), \
               webhook_event_id = COALESCE($4, webhook_event_id), \
               amount = COALESCE($5, amount), \
               currency_code = COALESCE($6, currency_code), \
               updated_at = NOW() \
             WHERE id = $1 \
             RETURNING ",
            payment_columns!()
        ))
        .bind(payment_id.as_uuid())
        .bind(patch.status.map(PaymentStatus::as_str))
        .bind(&patch.provider_payment_id)
        .bind(patch.webhook_event_id.map(|id| *id.as_uuid()))
        .bind(patch.amount)
        .bind(&patch.currency_code)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_payment", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    #[instrument(skip(self), fields(booking_id = %booking_id), err)]
    async fn list_payments(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<Payment>, PaymentStoreError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            payment_columns!(),
            " FROM payments WHERE booking_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(booking_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_payments", e))?;

        rows.iter().map(payment_from_row).collect()
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PaymentStoreError {
    PaymentStoreError::Unavailable(describe(operation, &err))
}

fn decode<T>(column: &str, result: Result<T, sqlx::Error>) -> Result<T, PaymentStoreError> {
    result.map_err(|e| PaymentStoreError::Decode(format!("failed to read {}: {}", column, e)))
}

fn payment_from_row(row: &PgRow) -> Result<Payment, PaymentStoreError> {
    let id: Uuid = decode("id", row.try_get("id"))?;
    let booking_id: Uuid = decode("booking_id", row.try_get("booking_id"))?;
    let provider: String = decode("provider", row.try_get("provider"))?;
    let webhook_event_id: Option<Uuid> =
        decode("webhook_event_id", row.try_get("webhook_event_id"))?;
    let status: String = decode("status", row.try_get("status"))?;

    Ok(Payment {
        id: PaymentId::from_uuid(id),
        booking_id: BookingId::from_uuid(booking_id),
        provider: provider
            .parse::<PaymentProvider>()
            .map_err(|e| PaymentStoreError::Decode(format!("provider: {}", e)))?,
        provider_payment_id: decode("provider_payment_id", row.try_get("provider_payment_id"))?,
        webhook_event_id: webhook_event_id.map(WebhookEventId::from_uuid),
        idempotency_key: decode("idempotency_key", row.try_get("idempotency_key"))?,
        status: status
            .parse()
            .map_err(|e| PaymentStoreError::Decode(format!("status: {}", e)))?,
        amount: decode("amount", row.try_get("amount"))?,
        currency_code: decode("currency_code", row.try_get("currency_code"))?,
        created_at: decode("created_at", row.try_get("created_at"))?,
        updated_at: decode("updated_at", row.try_get("updated_at"))?,
    })
}

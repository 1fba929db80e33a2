//! Postgres-backed webhook ledger (`webhook_events`).
//!
//! The claim is `INSERT ... ON CONFLICT (provider, event_id) DO NOTHING RETURNING ...`:
//! a returned row means this caller inserted it, no row means the key was already taken.
//! Error code `42P01` (undefined table) maps to [`LedgerError::TableMissing`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use travelos_booking::{
    NewWebhookEvent, WebhookEventPatch, WebhookEventRecord, WebhookEventStatus, WebhookKey,
};
use travelos_core::{BookingId, PaymentId, WebhookEventId};

use super::{LedgerError, LedgerInsert, WebhookLedger};
use crate::pg::{describe, is_undefined_table};

macro_rules! ledger_columns {
    () => {
        "id, provider, event_id, event_type, status, payload, booking_id, payment_id, \
         created_at, updated_at"
    };
}

#[derive(Debug, Clone)]
pub struct PostgresWebhookLedger {
    pool: Arc<PgPool>,
}

impl PostgresWebhookLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl WebhookLedger for PostgresWebhookLedger {
    #[instrument(
        skip(self, event),
        fields(provider = %event.key.provider(), event_id = %event.key.event_id()),
        err
    )]
    async fn insert(&self, event: NewWebhookEvent) -> Result<LedgerInsert, LedgerError> {
        let row = sqlx::query(concat!(
            "INSERT INTO webhook_events (id, provider, event_id, event_type, status, payload) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (provider, event_id) DO NOTHING \
             RETURNING ",
            ledger_columns!()
        ))
        .bind(*WebhookEventId::new().as_uuid())
        .bind(event.key.provider())
        .bind(event.key.event_id())
        .bind(&event.event_type)
        .bind(event.status.as_str())
        .bind(&event.payload)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_webhook_event", e))?;

        match row {
            Some(row) => Ok(LedgerInsert::Inserted(record_from_row(&row)?)),
            None => Ok(LedgerInsert::Conflict),
        }
    }

    #[instrument(skip(self, patch), fields(key = %key), err)]
    async fn update(
        &self,
        key: &WebhookKey,
        patch: &WebhookEventPatch,
    ) -> Result<Option<WebhookEventRecord>, LedgerError> {
        let row = sqlx::query(concat!(
            "UPDATE webhook_events SET \
               status = COALESCE($3, status), \
               booking_id = COALESCE($4, booking_id), \
               payment_id = COALESCE($5, payment_id), \
               payload = COALESCE($6, payload), \
               event_type = COALESCE($7, event_type), \
               updated_at = NOW() \
             WHERE provider = $1 AND event_id = $2 \
             RETURNING ",
            ledger_columns!()
        ))
        .bind(key.provider())
        .bind(key.event_id())
        .bind(patch.status.map(WebhookEventStatus::as_str))
        .bind(patch.booking_id.map(|id| *id.as_uuid()))
        .bind(patch.payment_id.map(|id| *id.as_uuid()))
        .bind(&patch.payload)
        .bind(&patch.event_type)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_webhook_event", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn get(&self, key: &WebhookKey) -> Result<Option<WebhookEventRecord>, LedgerError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            ledger_columns!(),
            " FROM webhook_events WHERE provider = $1 AND event_id = $2"
        ))
        .bind(key.provider())
        .bind(key.event_id())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_webhook_event", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn delete(&self, key: &WebhookKey) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE provider = $1 AND event_id = $2")
            .bind(key.provider())
            .bind(key.event_id())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_webhook_event", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerError {
    if is_undefined_table(&err) {
        LedgerError::TableMissing
    } else {
        LedgerError::Unavailable(describe(operation, &err))
    }
}

fn decode<T>(column: &str, result: Result<T, sqlx::Error>) -> Result<T, LedgerError> {
    result.map_err(|e| LedgerError::Decode(format!("failed to read {}: {}", column, e)))
}

fn record_from_row(row: &PgRow) -> Result<WebhookEventRecord, LedgerError> {
    let id: Uuid = decode("id", row.try_get("id"))?;
    let status: String = decode("status", row.try_get("status"))?;
    let booking_id: Option<Uuid> = decode("booking_id", row.try_get("booking_id"))?;
    let payment_id: Option<Uuid> = decode("payment_id", row.try_get("payment_id"))?;
    let payload: Option<JsonValue> = decode("payload", row.try_get("payload"))?;

    Ok(WebhookEventRecord {
        id: WebhookEventId::from_uuid(id),
        provider: decode("provider", row.try_get("provider"))?,
        event_id: decode("event_id", row.try_get("event_id"))?,
        event_type: decode("event_type", row.try_get("event_type"))?,
        status: status
            .parse()
            .map_err(|e| LedgerError::Decode(format!("status: {}", e)))?,
        payload,
        booking_id: booking_id.map(BookingId::from_uuid),
        payment_id: payment_id.map(PaymentId::from_uuid),
        created_at: decode("created_at", row.try_get("created_at"))?,
        updated_at: decode("updated_at", row.try_get("updated_at"))?,
    })
}

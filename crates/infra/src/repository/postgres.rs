//! Postgres-backed booking repository.
//!
//! ## Conditional transition write
//!
//! `record_transition` runs in one transaction:
//! 1. `UPDATE bookings ... WHERE id = $1 AND lifecycle_status = $expected RETURNING ...`
//! 2. `INSERT INTO booking_lifecycle_events ...`
//! 3. commit
//!
//! A zero-row update means the booking either vanished (`NotFound`) or moved to a
//! different status since the engine read it (`Conflict`). A unique violation on the
//! partial index `(booking_id, idempotency_key)` becomes `DuplicateIdempotencyKey`,
//! and the status update is rolled back with it.
//!
//! Completion and cancellation timestamps are stamped in the same statement, so the
//! table's check constraints hold at every commit.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use travelos_booking::{
    ActorType, Booking, BookingLifecycleStatus, LifecycleEvent, Metadata, NewLifecycleEvent,
};
use travelos_core::{BookingId, CustomerId, LifecycleEventId};

use super::{BookingRepository, CommittedTransition, RepositoryError, TransitionRecord};
use crate::pg::{describe, is_unique_violation};

macro_rules! booking_columns {
    () => {
        "id, booking_code, customer_id, currency_code, gross_amount, net_amount, paid_amount, \
         due_amount, refund_amount, travel_start_date, travel_end_date, \
         supplier_confirmation_reference, lifecycle_status, metadata, completed_at, cancelled_at, \
         cancellation_reason, created_at, updated_at"
    };
}

macro_rules! event_columns {
    () => {
        "id, booking_id, from_status, to_status, event_name, actor_type, actor_id, \
         idempotency_key, note, metadata, created_at"
    };
}

/// Status/metadata update shared by the conditional and unconditional writes.
///
/// `$1` id, `$2` next status, `$3` metadata, `$4` cancellation reason.
macro_rules! update_status_sql {
    ($guard:literal) => {
        concat!(
            "UPDATE bookings SET \
               lifecycle_status = $2, \
               metadata = $3, \
               completed_at = CASE WHEN $2 = 'completed' THEN COALESCE(completed_at, NOW()) ELSE NULL END, \
               cancelled_at = CASE WHEN $2 = 'cancelled' THEN COALESCE(cancelled_at, NOW()) ELSE NULL END, \
               cancellation_reason = CASE WHEN $2 = 'cancelled' \
                 THEN COALESCE($4, cancellation_reason) ELSE cancellation_reason END, \
               updated_at = NOW() \
             WHERE id = $1",
            $guard,
            " RETURNING ",
            booking_columns!()
        )
    };
}

/// Postgres-backed booking repository.
///
/// Uses the SQLx pool (thread-safe); every transition write is transactional.
#[derive(Debug, Clone)]
pub struct PostgresBookingRepository {
    pool: Arc<PgPool>,
}

impl PostgresBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Insert a booking row (seeding/imports; booking CRUD lives outside this core).
    #[instrument(skip(self, booking), fields(booking_id = %booking.id), err)]
    pub async fn insert_booking(&self, booking: &Booking) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, booking_code, customer_id, currency_code, gross_amount, net_amount,
                paid_amount, due_amount, refund_amount, travel_start_date, travel_end_date,
                supplier_confirmation_reference, lifecycle_status, metadata, completed_at,
                cancelled_at, cancellation_reason, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(&booking.booking_code)
        .bind(booking.customer_id.as_uuid())
        .bind(&booking.currency_code)
        .bind(booking.gross_amount)
        .bind(booking.net_amount)
        .bind(booking.paid_amount)
        .bind(booking.due_amount)
        .bind(booking.refund_amount)
        .bind(booking.travel_start_date)
        .bind(booking.travel_end_date)
        .bind(&booking.supplier_confirmation_reference)
        .bind(booking.lifecycle_status.as_str())
        .bind(JsonValue::Object(booking.metadata.clone()))
        .bind(booking.completed_at)
        .bind(booking.cancelled_at)
        .bind(&booking.cancellation_reason)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_booking", e))?;

        Ok(())
    }
}

#[async_trait]
impl BookingRepository for PostgresBookingRepository {
    #[instrument(skip(self), fields(booking_id = %booking_id), err)]
    async fn get_booking_by_id(
        &self,
        booking_id: BookingId,
    ) -> Result<Option<Booking>, RepositoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            booking_columns!(),
            " FROM bookings WHERE id = $1"
        ))
        .bind(booking_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_booking_by_id", e))?;

        row.as_ref().map(booking_from_row).transpose()
    }

    #[instrument(
        skip(self, metadata, cancellation_reason),
        fields(booking_id = %booking_id, status = %status),
        err
    )]
    async fn update_booking_lifecycle_status(
        &self,
        booking_id: BookingId,
        status: BookingLifecycleStatus,
        metadata: Metadata,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, RepositoryError> {
        let row = sqlx::query(update_status_sql!(""))
            .bind(booking_id.as_uuid())
            .bind(status.as_str())
            .bind(JsonValue::Object(metadata))
            .bind(cancellation_reason)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_booking_lifecycle_status", e))?;

        match row {
            Some(row) => booking_from_row(&row),
            None => Err(RepositoryError::NotFound(booking_id)),
        }
    }

    #[instrument(skip(self), fields(booking_id = %booking_id), err)]
    async fn find_lifecycle_event_by_idempotency_key(
        &self,
        booking_id: BookingId,
        idempotency_key: &str,
    ) -> Result<Option<LifecycleEvent>, RepositoryError> {
        let row = sqlx::query(concat!(
            "SELECT ",
            event_columns!(),
            " FROM booking_lifecycle_events WHERE booking_id = $1 AND idempotency_key = $2 LIMIT 1"
        ))
        .bind(booking_id.as_uuid())
        .bind(idempotency_key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_lifecycle_event_by_idempotency_key", e))?;

        row.as_ref().map(event_from_row).transpose()
    }

    #[instrument(
        skip(self, event),
        fields(booking_id = %event.booking_id, to_status = %event.to_status),
        err
    )]
    async fn create_lifecycle_event(
        &self,
        event: NewLifecycleEvent,
    ) -> Result<LifecycleEvent, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        let stored = insert_event(&mut tx, event).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(booking_id = %booking_id), err)]
    async fn list_lifecycle_events(
        &self,
        booking_id: BookingId,
    ) -> Result<Vec<LifecycleEvent>, RepositoryError> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            event_columns!(),
            " FROM booking_lifecycle_events WHERE booking_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(booking_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_lifecycle_events", e))?;

        rows.iter().map(event_from_row).collect()
    }

    #[instrument(
        skip(self, record),
        fields(
            booking_id = %record.booking_id,
            from = %record.expected_status,
            to = %record.next_status
        ),
        err
    )]
    async fn record_transition(
        &self,
        record: TransitionRecord,
    ) -> Result<CommittedTransition, RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(update_status_sql!(" AND lifecycle_status = $5"))
            .bind(record.booking_id.as_uuid())
            .bind(record.next_status.as_str())
            .bind(JsonValue::Object(record.metadata))
            .bind(record.cancellation_reason)
            .bind(record.expected_status.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("conditional_status_update", e))?;

        let Some(row) = row else {
            let current = current_status(&mut tx, record.booking_id).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(match current {
                None => RepositoryError::NotFound(record.booking_id),
                Some(found) => RepositoryError::Conflict(format!(
                    "booking {} expected {}, found {}",
                    record.booking_id, record.expected_status, found
                )),
            });
        };
        let booking = booking_from_row(&row)?;

        let event = match insert_event(&mut tx, record.event).await {
            Ok(event) => event,
            Err(err) => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(err);
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommittedTransition { booking, event })
    }
}

async fn current_status(
    tx: &mut Transaction<'_, Postgres>,
    booking_id: BookingId,
) -> Result<Option<String>, RepositoryError> {
    let row = sqlx::query("SELECT lifecycle_status FROM bookings WHERE id = $1")
        .bind(booking_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("current_status", e))?;

    row.map(|r| r.try_get::<String, _>("lifecycle_status"))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("failed to read lifecycle_status: {}", e)))
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: NewLifecycleEvent,
) -> Result<LifecycleEvent, RepositoryError> {
    let id = LifecycleEventId::new();
    let event_name = event.event_name();

    let created_at: DateTime<Utc> = sqlx::query_scalar(
        r#"
        INSERT INTO booking_lifecycle_events (
            id, booking_id, from_status, to_status, event_name, actor_type, actor_id,
            idempotency_key, note, metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING created_at
        "#,
    )
    .bind(id.as_uuid())
    .bind(event.booking_id.as_uuid())
    .bind(event.from_status.map(BookingLifecycleStatus::as_str))
    .bind(event.to_status.as_str())
    .bind(&event_name)
    .bind(event.actor_type.as_str())
    .bind(&event.actor_id)
    .bind(&event.idempotency_key)
    .bind(&event.note)
    .bind(JsonValue::Object(event.metadata.clone()))
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            RepositoryError::DuplicateIdempotencyKey {
                booking_id: event.booking_id,
                key: event.idempotency_key.clone().unwrap_or_default(),
            }
        } else {
            map_sqlx_error("insert_lifecycle_event", e)
        }
    })?;

    Ok(event.into_event(id, created_at))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RepositoryError {
    RepositoryError::Unavailable(describe(operation, &err))
}

fn decode<T>(column: &str, result: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(format!("failed to read {}: {}", column, e)))
}

fn metadata_from(column: &str, value: JsonValue) -> Result<Metadata, RepositoryError> {
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Metadata::new()),
        other => Err(RepositoryError::Decode(format!(
            "{} is not a JSON object: {}",
            column, other
        ))),
    }
}

fn status_from(column: &str, value: &str) -> Result<BookingLifecycleStatus, RepositoryError> {
    value
        .parse()
        .map_err(|e| RepositoryError::Decode(format!("{}: {}", column, e)))
}

fn booking_from_row(row: &PgRow) -> Result<Booking, RepositoryError> {
    let id: Uuid = decode("id", row.try_get("id"))?;
    let customer_id: Uuid = decode("customer_id", row.try_get("customer_id"))?;
    let status: String = decode("lifecycle_status", row.try_get("lifecycle_status"))?;
    let metadata: JsonValue = decode("metadata", row.try_get("metadata"))?;

    Ok(Booking {
        id: BookingId::from_uuid(id),
        booking_code: decode("booking_code", row.try_get("booking_code"))?,
        customer_id: CustomerId::from_uuid(customer_id),
        currency_code: decode("currency_code", row.try_get("currency_code"))?,
        gross_amount: decode("gross_amount", row.try_get("gross_amount"))?,
        net_amount: decode("net_amount", row.try_get("net_amount"))?,
        paid_amount: decode("paid_amount", row.try_get("paid_amount"))?,
        due_amount: decode("due_amount", row.try_get("due_amount"))?,
        refund_amount: decode("refund_amount", row.try_get("refund_amount"))?,
        travel_start_date: decode::<Option<NaiveDate>>(
            "travel_start_date",
            row.try_get("travel_start_date"),
        )?,
        travel_end_date: decode::<Option<NaiveDate>>(
            "travel_end_date",
            row.try_get("travel_end_date"),
        )?,
        supplier_confirmation_reference: decode(
            "supplier_confirmation_reference",
            row.try_get("supplier_confirmation_reference"),
        )?,
        lifecycle_status: status_from("lifecycle_status", &status)?,
        metadata: metadata_from("metadata", metadata)?,
        completed_at: decode("completed_at", row.try_get("completed_at"))?,
        cancelled_at: decode("cancelled_at", row.try_get("cancelled_at"))?,
        cancellation_reason: decode("cancellation_reason", row.try_get("cancellation_reason"))?,
        created_at: decode("created_at", row.try_get("created_at"))?,
        updated_at: decode("updated_at", row.try_get("updated_at"))?,
    })
}

fn event_from_row(row: &PgRow) -> Result<LifecycleEvent, RepositoryError> {
    let id: Uuid = decode("id", row.try_get("id"))?;
    let booking_id: Uuid = decode("booking_id", row.try_get("booking_id"))?;
    let from_status: Option<String> = decode("from_status", row.try_get("from_status"))?;
    let to_status: String = decode("to_status", row.try_get("to_status"))?;
    let actor_type: String = decode("actor_type", row.try_get("actor_type"))?;
    let metadata: JsonValue = decode("metadata", row.try_get("metadata"))?;

    Ok(LifecycleEvent {
        id: LifecycleEventId::from_uuid(id),
        booking_id: BookingId::from_uuid(booking_id),
        from_status: from_status
            .as_deref()
            .map(|s| status_from("from_status", s))
            .transpose()?,
        to_status: status_from("to_status", &to_status)?,
        event_name: decode("event_name", row.try_get("event_name"))?,
        actor_type: actor_type
            .parse::<ActorType>()
            .map_err(|e| RepositoryError::Decode(format!("actor_type: {}", e)))?,
        actor_id: decode("actor_id", row.try_get("actor_id"))?,
        idempotency_key: decode("idempotency_key", row.try_get("idempotency_key"))?,
        note: decode("note", row.try_get("note"))?,
        metadata: metadata_from("metadata", metadata)?,
        created_at: decode("created_at", row.try_get("created_at"))?,
    })
}

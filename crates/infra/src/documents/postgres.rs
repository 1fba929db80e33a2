//! Postgres document record writer.
//!
//! Writes the `documents` row only; the next version for `(booking_id, type)` is
//! computed inside the insert. Two concurrent regenerations of the same kind collide
//! on the `(booking_id, type, version)` unique constraint, and the loser reports a
//! generation failure (the automation handler logs it).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use travelos_booking::{Document, DocumentKind, DocumentStatus, GenerateDocument};
use travelos_core::DocumentId;

use super::{DocumentError, DocumentGenerator};
use crate::pg::{describe, is_unique_violation};

#[derive(Debug, Clone)]
pub struct PostgresDocumentGenerator {
    pool: Arc<PgPool>,
}

impl PostgresDocumentGenerator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl DocumentGenerator for PostgresDocumentGenerator {
    #[instrument(
        skip(self, request),
        fields(booking_id = %request.booking_id, kind = %kind),
        err
    )]
    async fn generate(
        &self,
        kind: DocumentKind,
        request: GenerateDocument,
    ) -> Result<Document, DocumentError> {
        let id = DocumentId::new();
        let status = DocumentStatus::Generated;

        let row = sqlx::query(
            r#"
            INSERT INTO documents (id, booking_id, customer_id, type, status, version, generated_by, metadata)
            SELECT $1, $2, $3, $4, $5, COALESCE(MAX(version), 0) + 1, $6, $7
            FROM documents
            WHERE booking_id = $2 AND type = $4
            RETURNING version, generated_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(request.booking_id.as_uuid())
        .bind(request.customer_id.map(|c| *c.as_uuid()))
        .bind(kind.as_str())
        .bind(status.as_str())
        .bind(&request.generated_by)
        .bind(JsonValue::Object(request.payload.clone()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DocumentError::Generation {
                    kind,
                    reason: "concurrent regeneration of the same document".to_string(),
                }
            } else {
                DocumentError::Unavailable(describe("insert_document", &e))
            }
        })?;

        let version: i32 = row
            .try_get("version")
            .map_err(|e| DocumentError::Unavailable(describe("read_version", &e)))?;
        let generated_at: DateTime<Utc> = row
            .try_get("generated_at")
            .map_err(|e| DocumentError::Unavailable(describe("read_generated_at", &e)))?;

        Ok(Document {
            id,
            booking_id: request.booking_id,
            customer_id: request.customer_id,
            kind,
            status,
            version: u32::try_from(version).unwrap_or_default(),
            generated_by: request.generated_by,
            generated_at,
            metadata: request.payload,
        })
    }
}

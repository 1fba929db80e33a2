//! Postgres plumbing shared by the sqlx adapters.
//!
//! ## Error classification
//!
//! | PostgreSQL code | Meaning | Used for |
//! |-----------------|---------|----------|
//! | `23505` | unique violation | idempotency-key collisions, webhook dedup, payment keys |
//! | `42P01` | undefined table | webhook ledger not provisioned |
//! | other | - | reported as store unavailability by each adapter |

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const UNIQUE_VIOLATION: &str = "23505";
const UNDEFINED_TABLE: &str = "42P01";

const SCHEMA: &str = include_str!("../migrations/0001_booking_core.sql");

/// Open a connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Apply the bundled schema. Every statement is `IF NOT EXISTS`, so re-running is harmless.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("booking core schema applied");
    Ok(())
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Check if an error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNIQUE_VIOLATION)
}

/// Check if an error reports a missing relation.
pub(crate) fn is_undefined_table(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNDEFINED_TABLE)
}

/// Human-readable description of a sqlx failure in `operation`.
pub(crate) fn describe(operation: &str, err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            format!("database error in {}: {}", operation, db_err.message())
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {}", operation),
        sqlx::Error::PoolTimedOut => format!("connection pool timed out in {}", operation),
        sqlx::Error::RowNotFound => format!("unexpected row not found in {}", operation),
        other => format!("sqlx error in {}: {}", operation, other),
    }
}

//! `scan_audit` table.
//!
//! Write-only from the verifier's point of view. [`PostgresAuditLog::recent`]
//! exists for operators and tests.

use checkin_core::{AuditEntry, AuditError, AuditOutcome, AuditSink};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::future::Future;
use std::pin::Pin;

fn parse_outcome(value: &str) -> Result<AuditOutcome, AuditError> {
    match value {
        "valid" => Ok(AuditOutcome::Valid),
        "duplicate" => Ok(AuditOutcome::Duplicate),
        "unknown_code" => Ok(AuditOutcome::UnknownCode),
        "store_error" => Ok(AuditOutcome::StoreError),
        other => Err(AuditError::Unavailable(format!("Invalid audit outcome: {other}"))),
    }
}

/// Audit sink writing one row per verdict.
#[derive(Clone, Debug)]
pub struct PostgresAuditLog {
    pool: PgPool,
    event_slug: String,
}

impl PostgresAuditLog {
    /// Create an audit log scoped to `event_slug`.
    #[must_use]
    pub fn new(pool: PgPool, event_slug: impl Into<String>) -> Self {
        Self {
            pool,
            event_slug: event_slug.into(),
        }
    }

    /// Most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Unavailable`] if the query fails or a stored
    /// outcome is not recognised.
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>, AuditError> {
        let rows: Vec<(String, DateTime<Utc>, String, Option<String>)> = sqlx::query_as(
            r"
            SELECT raw_code, observed_at, outcome, attendee_name
            FROM scan_audit
            WHERE event_slug = $1
            ORDER BY observed_at DESC, id DESC
            LIMIT $2
            ",
        )
        .bind(&self.event_slug)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Unavailable(format!("Failed to read audit log: {e}")))?;

        rows.into_iter()
            .map(|(raw_code, observed_at, outcome, attendee_name)| {
                Ok(AuditEntry {
                    raw_code,
                    observed_at,
                    outcome: parse_outcome(&outcome)?,
                    attendee_name,
                })
            })
            .collect()
    }
}

impl AuditSink for PostgresAuditLog {
    fn record<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO scan_audit (event_slug, raw_code, observed_at, outcome, attendee_name)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(&self.event_slug)
            .bind(&entry.raw_code)
            .bind(entry.observed_at)
            .bind(entry.outcome.as_str())
            .bind(entry.attendee_name.as_deref())
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::Unavailable(format!("Failed to write audit record: {e}")))?;

            Ok(())
        })
    }
}

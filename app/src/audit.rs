//! Audit sink that writes structured `tracing` events.

use checkin_core::{AuditEntry, AuditError, AuditSink};
use std::future::Future;
use std::pin::Pin;

/// Target of every audit event, for filtering (`RUST_LOG=checkin::audit=info`).
pub const AUDIT_TARGET: &str = "checkin::audit";

/// Emits one `info` event per verdict under [`AUDIT_TARGET`]. Never fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                target: AUDIT_TARGET,
                raw_code = %entry.raw_code,
                outcome = %entry.outcome,
                attendee = entry.attendee_name.as_deref().unwrap_or("-"),
                observed_at = %entry.observed_at,
                "Scan recorded"
            );
            Ok(())
        })
    }
}

//! Check-in decision procedure.
//!
//! One lookup, then at most one conditional write. The write is the
//! compare-and-swap on `checked_in_at IS NULL`; losing it means another device
//! admitted the ticket first, so the scan is reported as a duplicate with the
//! winner's timestamp. No in-process locking is involved.

use crate::audit::TracingAuditSink;
use checkin_core::environment::Clock;
use checkin_core::{
    AuditEntry, AuditSink, CheckInOutcome, ScanAttempt, Ticket, TicketStore, Verdict,
};
use checkin_runtime::metrics::VerifierMetrics;
use std::sync::Arc;
use std::time::Instant;

/// Evaluates scanned codes against the ticket store.
///
/// Cheap to share: hold it in an `Arc`.
pub struct Verifier {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
}

impl Verifier {
    /// Create a verifier that audits through `tracing`.
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replace the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Evaluate a code observed now.
    pub async fn evaluate(&self, code: &str) -> Verdict {
        let attempt = ScanAttempt::new(code, self.clock.now());
        self.evaluate_attempt(&attempt).await
    }

    /// Evaluate one scan attempt and record the verdict.
    ///
    /// Never fails: store errors become `Invalid{StoreError}`. Audit failures
    /// are logged and do not change the verdict.
    #[tracing::instrument(skip(self, attempt), fields(code = %attempt.raw_code))]
    pub async fn evaluate_attempt(&self, attempt: &ScanAttempt) -> Verdict {
        let started = Instant::now();
        let verdict = self.decide(attempt).await;

        let entry = AuditEntry::from_verdict(attempt, &verdict);
        if let Err(error) = self.audit.record(&entry).await {
            tracing::warn!(error = %error, "Audit record dropped");
            VerifierMetrics::record_audit_failure();
        }

        VerifierMetrics::record_verdict(verdict.label(), started.elapsed());
        tracing::debug!(verdict = verdict.label(), "Scan evaluated");
        verdict
    }

    async fn decide(&self, attempt: &ScanAttempt) -> Verdict {
        let code = attempt.code();
        if code.as_str().is_empty() {
            return Verdict::unknown_code();
        }

        let ticket = match self.store.find_by_code(&code).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => return Verdict::unknown_code(),
            Err(error) => {
                tracing::warn!(error = %error, "Ticket lookup failed");
                return Verdict::store_error();
            },
        };

        if ticket.is_checked_in() {
            return duplicate(ticket);
        }

        match self.store.check_in(&code, self.clock.now()).await {
            Ok(CheckInOutcome::CheckedIn(ticket)) => Verdict::Valid {
                attendee_name: ticket.attendee_name,
                event_name: ticket.event_name,
            },
            Ok(CheckInOutcome::AlreadyCheckedIn(ticket)) => {
                tracing::info!("Lost check-in race to another device");
                duplicate(ticket)
            },
            Ok(CheckInOutcome::NotFound) => Verdict::unknown_code(),
            Err(error) => {
                tracing::warn!(error = %error, "Check-in write failed");
                Verdict::store_error()
            },
        }
    }
}

/// Duplicate verdict for a ticket that is already checked in.
fn duplicate(ticket: Ticket) -> Verdict {
    match ticket.checked_in_at {
        Some(previous_checked_in_at) => Verdict::Duplicate {
            attendee_name: ticket.attendee_name,
            previous_checked_in_at,
        },
        None => {
            tracing::warn!("Store reported a used ticket without a check-in time");
            Verdict::store_error()
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use checkin_core::{AuditOutcome, InvalidReason};
    use checkin_testing::mocks::epoch;
    use checkin_testing::{InMemoryTicketStore, RecordingAuditSink, checked_in_ticket, test_clock, ticket};

    fn verifier(store: &InMemoryTicketStore) -> (Verifier, RecordingAuditSink) {
        let audit = RecordingAuditSink::new();
        let verifier = Verifier::new(Arc::new(store.clone()), Arc::new(test_clock()))
            .with_audit(Arc::new(audit.clone()));
        (verifier, audit)
    }

    #[tokio::test]
    async fn first_scan_is_valid_then_duplicate() {
        let store = InMemoryTicketStore::with_tickets([ticket("TICKET001", "John Doe")]);
        let (verifier, _) = verifier(&store);

        assert_eq!(
            verifier.evaluate("TICKET001").await,
            Verdict::Valid {
                attendee_name: "John Doe".to_string(),
                event_name: "My Event".to_string(),
            }
        );
        assert_eq!(
            verifier.evaluate("TICKET001").await,
            Verdict::Duplicate {
                attendee_name: "John Doe".to_string(),
                previous_checked_in_at: epoch(),
            }
        );
        assert_eq!(store.get("TICKET001").unwrap().checked_in_at, Some(epoch()));
    }

    #[tokio::test]
    async fn used_ticket_is_never_rewritten() {
        let earlier = epoch() - chrono::Duration::hours(1);
        let store = InMemoryTicketStore::with_tickets([checked_in_ticket("T1", "Ada", earlier)]);
        let (verifier, _) = verifier(&store);

        for _ in 0..3 {
            assert!(matches!(
                verifier.evaluate("T1").await,
                Verdict::Duplicate { previous_checked_in_at, .. } if previous_checked_in_at == earlier
            ));
        }
        assert_eq!(store.check_in_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_and_empty_codes_are_misses() {
        let store = InMemoryTicketStore::new();
        let (verifier, _) = verifier(&store);

        let verdict = verifier.evaluate("NOPE").await;
        assert_eq!(verdict, Verdict::unknown_code());
        assert_eq!(verdict.to_string(), "Invalid ticket code");
        assert_eq!(verifier.evaluate("").await, Verdict::unknown_code());
    }

    #[tokio::test]
    async fn codes_match_exactly() {
        let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
        let (verifier, _) = verifier(&store);
        assert_eq!(verifier.evaluate("t1").await, Verdict::unknown_code());
        assert_eq!(verifier.evaluate(" T1").await, Verdict::unknown_code());
    }

    #[tokio::test]
    async fn lookup_failure_is_store_error() {
        let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
        store.fail_lookups(true);
        let (verifier, _) = verifier(&store);

        assert!(matches!(
            verifier.evaluate("T1").await,
            Verdict::Invalid {
                reason: InvalidReason::StoreError
            }
        ));
    }

    #[tokio::test]
    async fn write_failure_is_store_error_without_mutation() {
        let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
        store.fail_writes(true);
        let (verifier, _) = verifier(&store);

        assert_eq!(verifier.evaluate("T1").await, Verdict::store_error());
        assert_eq!(store.get("T1").unwrap().checked_in_at, None);

        store.fail_writes(false);
        assert!(verifier.evaluate("T1").await.is_valid());
    }

    #[tokio::test]
    async fn every_verdict_is_audited() {
        let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
        let (verifier, audit) = verifier(&store);

        verifier.evaluate("T1").await;
        verifier.evaluate("T1").await;
        verifier.evaluate("NOPE").await;

        let outcomes: Vec<AuditOutcome> = audit.entries().iter().map(|e| e.outcome).collect();
        assert_eq!(
            outcomes,
            vec![AuditOutcome::Valid, AuditOutcome::Duplicate, AuditOutcome::UnknownCode]
        );
    }

    #[tokio::test]
    async fn audit_failure_does_not_change_verdict() {
        let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
        let (verifier, audit) = verifier(&store);
        audit.fail(true);

        assert!(verifier.evaluate("T1").await.is_valid());
        assert!(audit.entries().is_empty());
    }
}

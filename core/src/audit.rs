//! Audit hook for scan outcomes.
//!
//! The verifier hands every verdict to an injected [`AuditSink`]. Sinks never
//! influence the verdict: a failing sink is logged by the caller and ignored.

use crate::ticket::{InvalidReason, ScanAttempt, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Audit classification of one scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// First valid scan
    Valid,
    /// Ticket already used
    Duplicate,
    /// No ticket with the scanned code
    UnknownCode,
    /// Store failure while evaluating
    StoreError,
}

impl AuditOutcome {
    /// Stable string stored in audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Duplicate => "duplicate",
            Self::UnknownCode => "unknown_code",
            Self::StoreError => "store_error",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Code as decoded
    pub raw_code: String,
    /// When the frame was decoded
    pub observed_at: DateTime<Utc>,
    /// Classification
    pub outcome: AuditOutcome,
    /// Attendee, when the code matched a ticket
    pub attendee_name: Option<String>,
}

impl AuditEntry {
    /// Build the record for an evaluated attempt.
    #[must_use]
    pub fn from_verdict(attempt: &ScanAttempt, verdict: &Verdict) -> Self {
        let (outcome, attendee_name) = match verdict {
            Verdict::Valid { attendee_name, .. } => (AuditOutcome::Valid, Some(attendee_name.clone())),
            Verdict::Duplicate { attendee_name, .. } => {
                (AuditOutcome::Duplicate, Some(attendee_name.clone()))
            },
            Verdict::Invalid {
                reason: InvalidReason::UnknownCode,
            } => (AuditOutcome::UnknownCode, None),
            Verdict::Invalid {
                reason: InvalidReason::StoreError,
            } => (AuditOutcome::StoreError, None),
        };

        Self {
            raw_code: attempt.raw_code.clone(),
            observed_at: attempt.observed_at,
            outcome,
            attendee_name,
        }
    }
}

/// Failure to persist an audit record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// Backend unreachable or rejected the write
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Unavailable`] if the record could not be written.
    fn record<'a>(
        &'a self,
        entry: &'a AuditEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), AuditError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_have_no_attendee() {
        let attempt = ScanAttempt::new("NOPE", Utc::now());
        let entry = AuditEntry::from_verdict(&attempt, &Verdict::unknown_code());
        assert_eq!(entry.outcome, AuditOutcome::UnknownCode);
        assert_eq!(entry.attendee_name, None);
        assert_eq!(entry.raw_code, "NOPE");
    }

    #[test]
    fn duplicates_keep_attendee() {
        let attempt = ScanAttempt::new("T1", Utc::now());
        let verdict = Verdict::Duplicate {
            attendee_name: "Ada".to_string(),
            previous_checked_in_at: Utc::now(),
        };
        let entry = AuditEntry::from_verdict(&attempt, &verdict);
        assert_eq!(entry.outcome.as_str(), "duplicate");
        assert_eq!(entry.attendee_name.as_deref(), Some("Ada"));
    }
}

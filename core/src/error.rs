//! Operator-facing error taxonomy.
//!
//! Every member is recovered locally: it is rendered as a verdict or an inline
//! message and the operator may re-scan or restart the camera. None is fatal.

use crate::decoder::DecoderError;
use crate::ticket::{InvalidReason, Verdict};
use crate::ticket_store::TicketStoreError;
use thiserror::Error;

/// Check-in failures as seen by the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckInError {
    /// Lookup miss
    #[error("Unknown ticket code")]
    UnknownCode,

    /// Ticket already checked in
    #[error("Ticket already used")]
    AlreadyUsed,

    /// Transport or backend failure on lookup or write
    #[error("Ticket store unavailable: {0}")]
    StoreUnavailable(String),

    /// Decoder failed to start
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
}

impl CheckInError {
    /// Whether the failure comes from infrastructure rather than the ticket.
    ///
    /// Infrastructure failures are logged for operator visibility.
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::CameraUnavailable(_))
    }

    /// The error a verdict represents, if any.
    #[must_use]
    pub const fn from_verdict(verdict: &Verdict) -> Option<Self> {
        match verdict {
            Verdict::Valid { .. } => None,
            Verdict::Duplicate { .. } => Some(Self::AlreadyUsed),
            Verdict::Invalid {
                reason: InvalidReason::UnknownCode,
            } => Some(Self::UnknownCode),
            Verdict::Invalid {
                reason: InvalidReason::StoreError,
            } => Some(Self::StoreUnavailable(String::new())),
        }
    }
}

impl From<TicketStoreError> for CheckInError {
    fn from(error: TicketStoreError) -> Self {
        match error {
            TicketStoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<DecoderError> for CheckInError {
    fn from(error: DecoderError) -> Self {
        match error {
            DecoderError::CameraUnavailable(reason) => Self::CameraUnavailable(reason),
            other => Self::CameraUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_map_to_taxonomy() {
        assert_eq!(CheckInError::from_verdict(&Verdict::unknown_code()), Some(CheckInError::UnknownCode));
        assert!(matches!(
            CheckInError::from_verdict(&Verdict::store_error()),
            Some(CheckInError::StoreUnavailable(_))
        ));
        assert_eq!(
            CheckInError::from_verdict(&Verdict::Valid {
                attendee_name: "Ada".to_string(),
                event_name: "Conf".to_string(),
            }),
            None
        );
    }

    #[test]
    fn camera_errors_are_infrastructure() {
        let error: CheckInError = DecoderError::CameraUnavailable("permission denied".to_string()).into();
        assert_eq!(error, CheckInError::CameraUnavailable("permission denied".to_string()));
        assert!(error.is_infrastructure());
        assert!(!CheckInError::AlreadyUsed.is_infrastructure());
    }

    #[test]
    fn store_errors_convert() {
        let error: CheckInError = TicketStoreError::Unavailable("timeout".to_string()).into();
        assert_eq!(error.to_string(), "Ticket store unavailable: timeout");
    }
}

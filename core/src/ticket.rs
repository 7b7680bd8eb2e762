//! Ticket, scan attempt and verdict types.
//!
//! A [`Ticket`] is identified by its [`TicketCode`] and carries a single
//! mutable field, `checked_in_at`, which moves from `None` to `Some` exactly
//! once. A [`ScanAttempt`] is the transient input to the decision procedure
//! and a [`Verdict`] is its only output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique code printed on a ticket (barcode/QR payload).
///
/// Matching is exact and case-sensitive. No format is imposed: any string the
/// decoder produces is a legal lookup key.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty strings
/// - `From::from()` and `new()`: no validation (decoder output is trusted as-is)
///
/// # Examples
///
/// ```
/// use checkin_core::ticket::TicketCode;
///
/// let code = TicketCode::new("TICKET001");
/// assert_eq!(code.as_str(), "TICKET001");
///
/// assert!("".parse::<TicketCode>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketCode(String);

impl TicketCode {
    /// Create a new `TicketCode` from a string.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the `TicketCode` into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TicketCode {
    type Err = TicketValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(TicketValidationError::MissingField("ticket_code"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for TicketCode {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TicketCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for TicketCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Why a ticket record could not be built from raw input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketValidationError {
    /// A required field was empty after trimming.
    #[error("{0} is required")]
    MissingField(&'static str),
}

/// A ticket record as stored in the shared ticket collection.
///
/// Schema: `{ticket_code, attendee_name, event_name, checked_in_at | null}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique code within the event
    pub ticket_code: TicketCode,
    /// Attendee the ticket was issued to
    pub attendee_name: String,
    /// Human-readable event name
    pub event_name: String,
    /// When the ticket was used; `None` until the first valid scan
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Whether the ticket has already been used.
    #[must_use]
    pub const fn is_checked_in(&self) -> bool {
        self.checked_in_at.is_some()
    }
}

/// A validated ticket waiting to be inserted.
///
/// All three fields are trimmed and guaranteed non-empty. New tickets are
/// always inserted with `checked_in_at = null`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    ticket_code: TicketCode,
    attendee_name: String,
    event_name: String,
}

impl NewTicket {
    /// Validate and build a new ticket.
    ///
    /// # Errors
    ///
    /// Returns [`TicketValidationError::MissingField`] naming the first field
    /// that is empty after trimming.
    ///
    /// # Examples
    ///
    /// ```
    /// use checkin_core::ticket::NewTicket;
    ///
    /// let ticket = NewTicket::new(" T-1 ", "Ada", "Conf").unwrap();
    /// assert_eq!(ticket.ticket_code().as_str(), "T-1");
    ///
    /// assert!(NewTicket::new("T-2", "   ", "Conf").is_err());
    /// ```
    pub fn new(
        ticket_code: &str,
        attendee_name: &str,
        event_name: &str,
    ) -> Result<Self, TicketValidationError> {
        let ticket_code = required("ticket_code", ticket_code)?;
        let attendee_name = required("attendee_name", attendee_name)?;
        let event_name = required("event_name", event_name)?;

        Ok(Self {
            ticket_code: TicketCode::new(ticket_code),
            attendee_name,
            event_name,
        })
    }

    /// Ticket code.
    #[must_use]
    pub const fn ticket_code(&self) -> &TicketCode {
        &self.ticket_code
    }

    /// Attendee name.
    #[must_use]
    pub fn attendee_name(&self) -> &str {
        &self.attendee_name
    }

    /// Event name.
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// Convert into a stored ticket that has not been checked in.
    #[must_use]
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            ticket_code: self.ticket_code,
            attendee_name: self.attendee_name,
            event_name: self.event_name,
            checked_in_at: None,
        }
    }
}

fn required(field: &'static str, value: &str) -> Result<String, TicketValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TicketValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// One decoded frame presented to the decision procedure.
///
/// Not persisted; lives for the duration of one evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAttempt {
    /// Decoded text exactly as the decoder produced it
    pub raw_code: String,
    /// When the frame was decoded
    pub observed_at: DateTime<Utc>,
}

impl ScanAttempt {
    /// Create a scan attempt.
    #[must_use]
    pub fn new(raw_code: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            raw_code: raw_code.into(),
            observed_at,
        }
    }

    /// The decoded text as a lookup key.
    #[must_use]
    pub fn code(&self) -> TicketCode {
        TicketCode::new(self.raw_code.clone())
    }
}

/// Why a scan was classified as invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No ticket carries the scanned code
    UnknownCode,
    /// The ticket store could not be reached or rejected the request
    StoreError,
}

impl InvalidReason {
    /// Stable reason string (`"unknown code"` / `"store error"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownCode => "unknown code",
            Self::StoreError => "store error",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one scan attempt against the ticket collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    /// First valid scan; the ticket is now checked in
    Valid {
        /// Attendee on the ticket
        attendee_name: String,
        /// Event on the ticket
        event_name: String,
    },
    /// The scan could not be matched to a usable ticket
    Invalid {
        /// Why
        reason: InvalidReason,
    },
    /// The ticket was already used
    Duplicate {
        /// Attendee on the ticket
        attendee_name: String,
        /// When the ticket was first checked in
        previous_checked_in_at: DateTime<Utc>,
    },
}

impl Verdict {
    /// Shorthand for `Invalid { reason: UnknownCode }`.
    #[must_use]
    pub const fn unknown_code() -> Self {
        Self::Invalid {
            reason: InvalidReason::UnknownCode,
        }
    }

    /// Shorthand for `Invalid { reason: StoreError }`.
    #[must_use]
    pub const fn store_error() -> Self {
        Self::Invalid {
            reason: InvalidReason::StoreError,
        }
    }

    /// Verdict label used in logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valid { .. } => "valid",
            Self::Invalid { .. } => "invalid",
            Self::Duplicate { .. } => "duplicate",
        }
    }

    /// Whether the attendee may enter.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid {
                attendee_name,
                event_name,
            } => write!(f, "Verified - {event_name}: {attendee_name}"),
            Self::Invalid {
                reason: InvalidReason::UnknownCode,
            } => f.write_str("Invalid ticket code"),
            Self::Invalid {
                reason: InvalidReason::StoreError,
            } => f.write_str("Error checking ticket"),
            Self::Duplicate {
                attendee_name,
                previous_checked_in_at,
            } => write!(
                f,
                "Already checked in: {attendee_name} at {}",
                previous_checked_in_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn new_ticket_trims_fields() {
        let ticket = NewTicket::new("  QR12345 ", " John Doe", "Conf  ").unwrap();
        assert_eq!(ticket.ticket_code().as_str(), "QR12345");
        assert_eq!(ticket.attendee_name(), "John Doe");
        assert_eq!(ticket.event_name(), "Conf");

        let stored = ticket.into_ticket();
        assert!(!stored.is_checked_in());
    }

    #[test]
    fn new_ticket_names_missing_field() {
        assert_eq!(
            NewTicket::new("T1", "", "Conf"),
            Err(TicketValidationError::MissingField("attendee_name"))
        );
        assert_eq!(
            NewTicket::new("", "Ada", ""),
            Err(TicketValidationError::MissingField("ticket_code"))
        );
        assert_eq!(
            NewTicket::new("T1", "Ada", "\t"),
            Err(TicketValidationError::MissingField("event_name"))
        );
    }

    #[test]
    fn ticket_code_is_case_sensitive() {
        assert_ne!(TicketCode::new("ticket001"), TicketCode::new("TICKET001"));
    }

    #[test]
    fn invalid_reasons_render_stable_strings() {
        assert_eq!(InvalidReason::UnknownCode.to_string(), "unknown code");
        assert_eq!(InvalidReason::StoreError.to_string(), "store error");
    }

    #[test]
    fn verdict_serializes_with_status_tag() {
        let json = serde_json::to_value(Verdict::unknown_code()).unwrap();
        assert_eq!(json["status"], "invalid");
        assert_eq!(json["reason"], "unknown_code");
    }

    #[test]
    fn verdict_messages() {
        let valid = Verdict::Valid {
            attendee_name: "John Doe".to_string(),
            event_name: "Conf".to_string(),
        };
        assert_eq!(valid.to_string(), "Verified - Conf: John Doe");
        assert_eq!(valid.label(), "valid");
        assert!(valid.is_valid());

        assert_eq!(Verdict::store_error().to_string(), "Error checking ticket");
        assert_eq!(Verdict::store_error().label(), "invalid");
    }

    proptest! {
        #[test]
        fn blank_fields_are_always_rejected(
            code in "[A-Z0-9]{1,12}",
            blank in "[ \t]{0,4}",
        ) {
            prop_assert!(NewTicket::new(&code, &blank, "Conf").is_err());
            prop_assert!(NewTicket::new(&blank, "Ada", "Conf").is_err());
        }

        #[test]
        fn accepted_fields_are_trimmed(
            code in "[A-Za-z0-9-]{1,16}",
            pad in " {0,3}",
        ) {
            let padded = format!("{pad}{code}{pad}");
            let ticket = NewTicket::new(&padded, "Ada", "Conf").unwrap();
            prop_assert_eq!(ticket.ticket_code().as_str(), code.as_str());
        }
    }
}

//! Ticket store abstraction shared by every scanning device.
//!
//! The store is the only coordination point between devices. Check-in state
//! lives on the ticket itself and is written with a conditional update
//! (compare-and-swap on `checked_in_at IS NULL`), so that of N concurrent
//! scans of one fresh ticket exactly one wins.
//!
//! # Implementations
//!
//! - `PostgresTicketStore` (in `checkin-postgres`): `UPDATE ... WHERE checked_in_at IS NULL`
//! - `InMemoryTicketStore` (in `checkin-testing`): mutex-guarded map, fault injection
//!
//! # Example
//!
//! ```no_run
//! use checkin_core::ticket::TicketCode;
//! use checkin_core::ticket_store::{CheckInOutcome, TicketStore, TicketStoreError};
//! use chrono::Utc;
//!
//! async fn example<S: TicketStore>(store: &S) -> Result<(), TicketStoreError> {
//!     let code = TicketCode::new("TICKET001");
//!     match store.check_in(&code, Utc::now()).await? {
//!         CheckInOutcome::CheckedIn(ticket) => println!("welcome {}", ticket.attendee_name),
//!         CheckInOutcome::AlreadyCheckedIn(ticket) => println!("used at {:?}", ticket.checked_in_at),
//!         CheckInOutcome::NotFound => println!("unknown"),
//!     }
//!     Ok(())
//! }
//! ```

use crate::ticket::{NewTicket, Ticket, TicketCode};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by ticket store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketStoreError {
    /// Transport or backend failure (connection lost, timeout, query error).
    #[error("Ticket store unavailable: {0}")]
    Unavailable(String),

    /// Insert rejected because the code is already taken.
    #[error("Ticket code already exists: {0}")]
    DuplicateCode(TicketCode),

    /// A record or notification could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result of a conditional check-in write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInOutcome {
    /// The write applied; the ticket now carries the new timestamp.
    CheckedIn(Ticket),
    /// The condition failed: the ticket was already checked in. Carries the
    /// ticket as stored, including the winning timestamp.
    AlreadyCheckedIn(Ticket),
    /// No ticket with that code exists.
    NotFound,
}

/// A change notification from the ticket collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "ticket", rename_all = "snake_case")]
pub enum TicketChange {
    /// A ticket was added
    Inserted(Ticket),
    /// A ticket's `checked_in_at` was set
    CheckedIn(Ticket),
}

impl TicketChange {
    /// The ticket as it looks after the change.
    #[must_use]
    pub const fn ticket(&self) -> &Ticket {
        match self {
            Self::Inserted(ticket) | Self::CheckedIn(ticket) => ticket,
        }
    }

    /// Consume the notification, keeping the ticket.
    #[must_use]
    pub fn into_ticket(self) -> Ticket {
        match self {
            Self::Inserted(ticket) | Self::CheckedIn(ticket) => ticket,
        }
    }
}

/// Stream of change notifications. Dropping it ends the subscription.
pub type TicketChangeStream =
    Pin<Box<dyn Stream<Item = Result<TicketChange, TicketStoreError>> + Send>>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TicketStoreError>> + Send + 'a>>;

/// Persistent ticket collection.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the verifier and the live dashboard
/// hold them as `Arc<dyn TicketStore>`.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the trait can
/// be used as a trait object inside effects.
pub trait TicketStore: Send + Sync {
    /// Point lookup by exact code.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Unavailable`] on transport failure.
    fn find_by_code<'a>(&'a self, code: &'a TicketCode) -> StoreFuture<'a, Option<Ticket>>;

    /// Set `checked_in_at = at` only if it is currently null.
    ///
    /// This is the compare-and-swap primitive. It must be atomic with respect
    /// to every other `check_in` on the same code, across processes.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Unavailable`] on transport failure. A
    /// failed condition is not an error; it is reported as
    /// [`CheckInOutcome::AlreadyCheckedIn`].
    fn check_in<'a>(
        &'a self,
        code: &'a TicketCode,
        at: DateTime<Utc>,
    ) -> StoreFuture<'a, CheckInOutcome>;

    /// Insert one ticket with `checked_in_at = null`.
    ///
    /// # Errors
    ///
    /// - [`TicketStoreError::DuplicateCode`] if the code already exists
    /// - [`TicketStoreError::Unavailable`] on transport failure
    fn insert(&self, ticket: NewTicket) -> StoreFuture<'_, Ticket>;

    /// Every ticket in the collection, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Unavailable`] on transport failure.
    fn list(&self) -> StoreFuture<'_, Vec<Ticket>>;

    /// Subscribe to change notifications for the whole collection.
    ///
    /// Only changes made after the subscription is established are delivered;
    /// callers that need a full view load [`list`](Self::list) afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError::Unavailable`] if the subscription cannot be
    /// established.
    fn subscribe(&self) -> StoreFuture<'_, TicketChangeStream>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            ticket_code: TicketCode::new("T1"),
            attendee_name: "Ada".to_string(),
            event_name: "Conf".to_string(),
            checked_in_at: None,
        }
    }

    #[test]
    fn change_exposes_ticket() {
        let change = TicketChange::Inserted(ticket());
        assert_eq!(change.ticket().ticket_code.as_str(), "T1");
        assert_eq!(change.into_ticket(), ticket());
    }

    #[test]
    fn change_payload_shape() {
        let json = serde_json::to_value(TicketChange::CheckedIn(ticket())).unwrap();
        assert_eq!(json["op"], "checked_in");
        assert_eq!(json["ticket"]["ticket_code"], "T1");
        assert!(json["ticket"]["checked_in_at"].is_null());
    }
}

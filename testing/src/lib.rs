//! # Check-in Testing
//!
//! Testing utilities for the event check-in workspace.
//!
//! This crate provides:
//! - Deterministic clocks
//! - An in-memory [`TicketStore`](checkin_core::TicketStore) with fault injection
//! - A scripted camera decoder and a recording audit sink
//! - The Given-When-Then [`ReducerTest`] harness
//! - proptest strategies for tickets
//!
//! ## Example
//!
//! ```ignore
//! use checkin_testing::{test_clock, InMemoryTicketStore};
//!
//! #[tokio::test]
//! async fn checks_in_once() {
//!     let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
//!     let verifier = Verifier::new(Arc::new(store), Arc::new(test_clock()));
//!
//!     assert!(verifier.evaluate("T1").await.is_valid());
//! }
//! ```

use checkin_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};

pub mod device_mocks;
pub mod reducer_test;
pub mod ticket_store_mocks;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use checkin_testing::mocks::FixedClock;
    /// use checkin_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that moves forward by `step` on every reading.
    ///
    /// Gives each check-in a distinct, predictable timestamp.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// First reading returns `start`.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }
}

/// Builders for test data.
pub mod helpers {
    use checkin_core::{DateTime, Ticket, TicketCode, Utc};

    /// Fresh ticket for the default event.
    #[must_use]
    pub fn ticket(code: &str, attendee_name: &str) -> Ticket {
        Ticket {
            ticket_code: TicketCode::new(code),
            attendee_name: attendee_name.to_string(),
            event_name: "My Event".to_string(),
            checked_in_at: None,
        }
    }

    /// Ticket already checked in at `at`.
    #[must_use]
    pub fn checked_in_ticket(code: &str, attendee_name: &str, at: DateTime<Utc>) -> Ticket {
        Ticket {
            checked_in_at: Some(at),
            ..ticket(code, attendee_name)
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use super::mocks::epoch;
    use checkin_core::{Ticket, TicketCode};
    use chrono::Duration;
    use proptest::prelude::*;

    /// Non-empty alphanumeric ticket codes.
    pub fn ticket_code() -> impl Strategy<Value = TicketCode> {
        "[A-Z0-9]{1,12}".prop_map(TicketCode::new)
    }

    /// Attendee names, including duplicates across tickets.
    pub fn attendee_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("Ada".to_string()),
            Just("Grace".to_string()),
            "[A-Z][a-z]{1,8}",
        ]
    }

    /// A ticket, checked in within the first day of 2025 about half the time.
    pub fn ticket() -> impl Strategy<Value = Ticket> {
        (
            ticket_code(),
            attendee_name(),
            proptest::option::of(0i64..86_400),
        )
            .prop_map(|(ticket_code, attendee_name, offset)| Ticket {
                ticket_code,
                attendee_name,
                event_name: "My Event".to_string(),
                checked_in_at: offset.map(|secs| epoch() + Duration::seconds(secs)),
            })
    }

    /// Tickets with unique codes.
    pub fn tickets(max: usize) -> impl Strategy<Value = Vec<Ticket>> {
        proptest::collection::vec(ticket(), 0..max).prop_map(|tickets| {
            let mut seen = std::collections::HashSet::new();
            tickets
                .into_iter()
                .filter(|t| seen.insert(t.ticket_code.clone()))
                .collect()
        })
    }
}

// Re-export commonly used items
pub use device_mocks::{RecordingAuditSink, ScriptedDecoder};
pub use helpers::{checked_in_ticket, ticket};
pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
pub use ticket_store_mocks::InMemoryTicketStore;

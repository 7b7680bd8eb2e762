//! In-memory ticket store for fast, deterministic tests
//!
//! [`InMemoryTicketStore`] keeps tickets in a mutex-guarded map, so the
//! conditional check-in is atomic exactly like the `Postgres` update. Change
//! notifications go through a broadcast channel. Faults can be switched on per
//! operation to exercise the store-error paths.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use checkin_core::ticket_store::StoreFuture;
use checkin_core::{
    CheckInOutcome, DateTime, NewTicket, Ticket, TicketChange, TicketChangeStream, TicketCode,
    TicketStore, TicketStoreError, Utc,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Faults switched on by tests.
#[derive(Debug, Default)]
struct Faults {
    lookups: AtomicBool,
    writes: AtomicBool,
    subscribe: AtomicBool,
    rejected_codes: Mutex<HashSet<String>>,
}

/// In-memory ticket store.
///
/// Clones share the same collection.
///
/// # Example
///
/// ```
/// use checkin_testing::{InMemoryTicketStore, ticket};
/// use checkin_core::{TicketCode, TicketStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryTicketStore::with_tickets([ticket("T1", "Ada")]);
/// let found = store.find_by_code(&TicketCode::new("T1")).await?;
/// assert!(found.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryTicketStore {
    tickets: Arc<Mutex<HashMap<TicketCode, Ticket>>>,
    changes: broadcast::Sender<TicketChange>,
    faults: Arc<Faults>,
    check_in_calls: Arc<AtomicUsize>,
}

impl InMemoryTicketStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            tickets: Arc::new(Mutex::new(HashMap::new())),
            changes,
            faults: Arc::new(Faults::default()),
            check_in_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a store pre-loaded with tickets (no notifications are sent)
    #[must_use]
    pub fn with_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let store = Self::new();
        {
            let mut map = store.tickets.lock().unwrap();
            for ticket in tickets {
                map.insert(ticket.ticket_code.clone(), ticket);
            }
        }
        store
    }

    /// Make `find_by_code` and `list` fail with `Unavailable`
    pub fn fail_lookups(&self, fail: bool) {
        self.faults.lookups.store(fail, Ordering::SeqCst);
    }

    /// Make `check_in` and `insert` fail with `Unavailable`
    pub fn fail_writes(&self, fail: bool) {
        self.faults.writes.store(fail, Ordering::SeqCst);
    }

    /// Make `subscribe` fail with `Unavailable`
    pub fn fail_subscribe(&self, fail: bool) {
        self.faults.subscribe.store(fail, Ordering::SeqCst);
    }

    /// Make inserts of one specific code fail with `Unavailable`
    pub fn reject_insert_of(&self, code: &str) {
        self.faults.rejected_codes.lock().unwrap().insert(code.to_string());
    }

    /// Ticket as currently stored
    #[must_use]
    pub fn get(&self, code: &str) -> Option<Ticket> {
        self.tickets.lock().unwrap().get(&TicketCode::new(code)).cloned()
    }

    /// Number of stored tickets
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    /// Whether the store holds no tickets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.lock().unwrap().is_empty()
    }

    /// Number of conditional writes attempted so far
    #[must_use]
    pub fn check_in_calls(&self) -> usize {
        self.check_in_calls.load(Ordering::SeqCst)
    }

    /// Set `checked_in_at` directly, as another device would, and notify.
    pub fn check_in_externally(&self, code: &str, at: DateTime<Utc>) {
        let updated = {
            let mut map = self.tickets.lock().unwrap();
            map.get_mut(&TicketCode::new(code)).map(|ticket| {
                ticket.checked_in_at = Some(at);
                ticket.clone()
            })
        };
        if let Some(ticket) = updated {
            let _ = self.changes.send(TicketChange::CheckedIn(ticket));
        }
    }

    fn unavailable() -> TicketStoreError {
        TicketStoreError::Unavailable("injected fault".to_string())
    }
}

impl Default for InMemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketStore for InMemoryTicketStore {
    fn find_by_code<'a>(&'a self, code: &'a TicketCode) -> StoreFuture<'a, Option<Ticket>> {
        Box::pin(async move {
            if self.faults.lookups.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            Ok(self.tickets.lock().unwrap().get(code).cloned())
        })
    }

    fn check_in<'a>(
        &'a self,
        code: &'a TicketCode,
        at: DateTime<Utc>,
    ) -> StoreFuture<'a, CheckInOutcome> {
        Box::pin(async move {
            self.check_in_calls.fetch_add(1, Ordering::SeqCst);
            if self.faults.writes.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }

            let outcome = {
                let mut map = self.tickets.lock().unwrap();
                match map.get_mut(code) {
                    None => CheckInOutcome::NotFound,
                    Some(ticket) if ticket.checked_in_at.is_some() => {
                        CheckInOutcome::AlreadyCheckedIn(ticket.clone())
                    },
                    Some(ticket) => {
                        ticket.checked_in_at = Some(at);
                        CheckInOutcome::CheckedIn(ticket.clone())
                    },
                }
            };

            if let CheckInOutcome::CheckedIn(ticket) = &outcome {
                let _ = self.changes.send(TicketChange::CheckedIn(ticket.clone()));
            }
            Ok(outcome)
        })
    }

    fn insert(&self, ticket: NewTicket) -> StoreFuture<'_, Ticket> {
        Box::pin(async move {
            if self.faults.writes.load(Ordering::SeqCst)
                || self
                    .faults
                    .rejected_codes
                    .lock()
                    .unwrap()
                    .contains(ticket.ticket_code().as_str())
            {
                return Err(Self::unavailable());
            }

            let ticket = ticket.into_ticket();
            {
                let mut map = self.tickets.lock().unwrap();
                if map.contains_key(&ticket.ticket_code) {
                    return Err(TicketStoreError::DuplicateCode(ticket.ticket_code));
                }
                map.insert(ticket.ticket_code.clone(), ticket.clone());
            }

            let _ = self.changes.send(TicketChange::Inserted(ticket.clone()));
            Ok(ticket)
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(async move {
            if self.faults.lookups.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }
            Ok(self.tickets.lock().unwrap().values().cloned().collect())
        })
    }

    fn subscribe(&self) -> StoreFuture<'_, TicketChangeStream> {
        Box::pin(async move {
            if self.faults.subscribe.load(Ordering::SeqCst) {
                return Err(Self::unavailable());
            }

            let mut rx = self.changes.subscribe();
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(change) => yield Ok(change),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            yield Err(TicketStoreError::Unavailable(format!(
                                "subscriber lagged by {skipped} changes"
                            )));
                        },
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as TicketChangeStream)
        })
    }
}

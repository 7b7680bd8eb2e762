//! Dashboard projection: counts and attendee ordering.

use checkin_core::{Ticket, TicketChange, TicketCode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Attendance counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// All tickets
    pub total: usize,
    /// Tickets with `checked_in_at` set
    pub checked_in: usize,
    /// `total - checked_in`
    pub not_checked_in: usize,
}

/// Counts plus the ordered attendee list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    /// Attendance counts
    pub stats: DashboardStats,
    /// Checked-in tickets (most recent first), then the rest by attendee name
    pub entries: Vec<Ticket>,
}

impl DashboardSnapshot {
    /// Build a snapshot from any collection of tickets.
    ///
    /// # Example
    ///
    /// ```
    /// use checkin_projections::DashboardSnapshot;
    ///
    /// let snapshot = DashboardSnapshot::from_tickets(Vec::new());
    /// assert_eq!(snapshot.stats.total, 0);
    /// assert!((snapshot.check_in_rate() - 0.0).abs() < f64::EPSILON);
    /// ```
    #[must_use]
    pub fn from_tickets(tickets: impl IntoIterator<Item = Ticket>) -> Self {
        let mut entries: Vec<Ticket> = tickets.into_iter().collect();
        entries.sort_by(dashboard_order);

        let checked_in = entries.iter().filter(|t| t.is_checked_in()).count();
        let stats = DashboardStats {
            total: entries.len(),
            checked_in,
            not_checked_in: entries.len() - checked_in,
        };

        Self { stats, entries }
    }

    /// Fraction of tickets checked in; `0.0` when there are no tickets.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // attendee counts are far below 2^52
    pub fn check_in_rate(&self) -> f64 {
        if self.stats.total == 0 {
            return 0.0;
        }
        self.stats.checked_in as f64 / self.stats.total as f64
    }

    /// Checked-in entries, most recent first.
    pub fn checked_in(&self) -> impl Iterator<Item = &Ticket> {
        self.entries.iter().filter(|t| t.is_checked_in())
    }

    /// Entries still expected, alphabetically.
    pub fn not_checked_in(&self) -> impl Iterator<Item = &Ticket> {
        self.entries.iter().filter(|t| !t.is_checked_in())
    }
}

/// Checked-in first by `checked_in_at` descending, then by name and code.
fn dashboard_order(a: &Ticket, b: &Ticket) -> Ordering {
    match (a.checked_in_at, b.checked_in_at) {
        (Some(x), Some(y)) => y
            .cmp(&x)
            .then_with(|| a.attendee_name.cmp(&b.attendee_name))
            .then_with(|| a.ticket_code.cmp(&b.ticket_code)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a
            .attendee_name
            .cmp(&b.attendee_name)
            .then_with(|| a.ticket_code.cmp(&b.ticket_code)),
    }
}

/// In-memory view of the ticket collection.
#[derive(Clone, Debug, Default)]
pub struct Dashboard {
    tickets: HashMap<TicketCode, Ticket>,
}

impl Dashboard {
    /// Create an empty dashboard
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view with a full listing.
    pub fn load(&mut self, tickets: impl IntoIterator<Item = Ticket>) {
        self.tickets = tickets
            .into_iter()
            .map(|t| (t.ticket_code.clone(), t))
            .collect();
    }

    /// Apply one change notification.
    ///
    /// A ticket that is already checked in keeps its timestamp even if a
    /// stale notification without one arrives later.
    pub fn apply(&mut self, change: TicketChange) {
        let incoming = change.into_ticket();
        match self.tickets.get_mut(&incoming.ticket_code) {
            Some(existing) => {
                let checked_in_at = existing.checked_in_at.or(incoming.checked_in_at);
                *existing = Ticket {
                    checked_in_at,
                    ..incoming
                };
            },
            None => {
                self.tickets.insert(incoming.ticket_code.clone(), incoming);
            },
        }
    }

    /// Number of tickets in view
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether the view is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Recompute counts and ordering.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::from_tickets(self.tickets.values().cloned())
    }
}

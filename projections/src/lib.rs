//! Attendance dashboard for event check-in.
//!
//! # Overview
//!
//! The dashboard is a read-only projection of the ticket collection:
//! - **[`Dashboard`]**: in-memory view keyed by ticket code, updated from
//!   [`TicketChange`](checkin_core::TicketChange) notifications
//! - **[`DashboardSnapshot`]**: counts plus the ordered attendee list
//! - **[`LiveDashboard`]**: background task that keeps a dashboard current and
//!   reports every new snapshot, stopped through a [`SubscriptionHandle`]
//!
//! # Example
//!
//! ```ignore
//! use checkin_projections::LiveDashboard;
//!
//! let handle = LiveDashboard::spawn(store, |snapshot| {
//!     println!("{}/{} checked in", snapshot.stats.checked_in, snapshot.stats.total);
//! })
//! .await?;
//!
//! // On teardown
//! handle.cancel();
//! ```

pub mod dashboard;
pub mod live;

pub use dashboard::{Dashboard, DashboardSnapshot, DashboardStats};
pub use live::{LiveDashboard, SubscriptionHandle};

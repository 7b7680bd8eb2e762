//! `PostgreSQL` adapters for event check-in.
//!
//! This crate provides:
//!
//! - [`PostgresTicketStore`]: the shared ticket collection, with the
//!   conditional check-in as `UPDATE ... WHERE checked_in_at IS NULL` and a
//!   change feed over `LISTEN/NOTIFY`
//! - [`PostgresAuditLog`]: write-only `scan_audit` table
//! - [`connect`] and [`migrate`]: pool setup and embedded schema migrations
//!
//! # Example
//!
//! ```ignore
//! use checkin_postgres::{connect, migrate, PoolSettings, PostgresTicketStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/checkin", &PoolSettings::default()).await?;
//!     migrate(&pool).await?;
//!     let store = PostgresTicketStore::new(pool, "my-first-event");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod ticket_store;

pub use audit::PostgresAuditLog;
pub use ticket_store::PostgresTicketStore;

use checkin_core::TicketStoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// `LISTEN/NOTIFY` channel written by the `tickets_notify_change` trigger.
pub const CHANGE_CHANNEL: &str = "ticket_changes";

/// Connection pool sizing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`TicketStoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<PgPool, TicketStoreError> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| TicketStoreError::Unavailable(format!("Failed to connect: {e}")))
}

/// Apply the embedded migrations (`tickets`, `scan_audit`, change trigger).
///
/// # Errors
///
/// Returns [`TicketStoreError::Unavailable`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), TicketStoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| TicketStoreError::Unavailable(format!("Migration failed: {e}")))?;
    tracing::info!("Ticket store migrations complete");
    Ok(())
}

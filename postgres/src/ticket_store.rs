//! `PostgreSQL` ticket store.

use crate::CHANGE_CHANNEL;
use checkin_core::ticket_store::StoreFuture;
use checkin_core::{
    CheckInOutcome, NewTicket, Ticket, TicketChange, TicketChangeStream, TicketCode, TicketStore,
    TicketStoreError,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::Instrument;

const TICKET_COLUMNS: &str = "ticket_code, attendee_name, event_name, checked_in_at";

/// Row shape shared by every ticket query.
#[derive(Debug, sqlx::FromRow)]
struct TicketRecord {
    ticket_code: String,
    attendee_name: String,
    event_name: String,
    checked_in_at: Option<DateTime<Utc>>,
}

impl From<TicketRecord> for Ticket {
    fn from(row: TicketRecord) -> Self {
        Self {
            ticket_code: TicketCode::new(row.ticket_code),
            attendee_name: row.attendee_name,
            event_name: row.event_name,
            checked_in_at: row.checked_in_at,
        }
    }
}

/// Payload of a `ticket_changes` notification.
#[derive(Debug, Deserialize)]
struct ChangeNotification {
    event_slug: String,
    op: ChangeOp,
    ticket: Ticket,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ChangeOp {
    Inserted,
    CheckedIn,
}

impl ChangeNotification {
    fn parse(payload: &str) -> Result<Self, TicketStoreError> {
        serde_json::from_str(payload)
            .map_err(|e| TicketStoreError::Serialization(format!("Bad change notification: {e}")))
    }

    fn into_change(self) -> TicketChange {
        match self.op {
            ChangeOp::Inserted => TicketChange::Inserted(self.ticket),
            ChangeOp::CheckedIn => TicketChange::CheckedIn(self.ticket),
        }
    }
}

fn unavailable(action: &str, error: &sqlx::Error) -> TicketStoreError {
    TicketStoreError::Unavailable(format!("Failed to {action}: {error}"))
}

/// Ticket collection for one event, backed by the `tickets` table.
///
/// Every device points at the same database; the conditional update is the
/// only coordination between them.
///
/// # Example
///
/// ```no_run
/// use checkin_postgres::PostgresTicketStore;
/// use checkin_core::{TicketCode, TicketStore};
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresTicketStore::new(pool, "my-first-event");
/// let ticket = store.find_by_code(&TicketCode::new("TICKET001")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresTicketStore {
    pool: PgPool,
    event_slug: String,
}

impl PostgresTicketStore {
    /// Create a store scoped to `event_slug`.
    #[must_use]
    pub fn new(pool: PgPool, event_slug: impl Into<String>) -> Self {
        Self {
            pool,
            event_slug: event_slug.into(),
        }
    }

    /// Event this store is scoped to.
    #[must_use]
    pub fn event_slug(&self) -> &str {
        &self.event_slug
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, code: &TicketCode) -> Result<Option<Ticket>, TicketStoreError> {
        let row: Option<TicketRecord> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_slug = $1 AND ticket_code = $2"
        ))
        .bind(&self.event_slug)
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unavailable("look up ticket", &e))?;

        Ok(row.map(Ticket::from))
    }
}

impl TicketStore for PostgresTicketStore {
    fn find_by_code<'a>(&'a self, code: &'a TicketCode) -> StoreFuture<'a, Option<Ticket>> {
        Box::pin(
            self.fetch(code)
                .instrument(tracing::debug_span!("find_by_code", code = %code)),
        )
    }

    fn check_in<'a>(
        &'a self,
        code: &'a TicketCode,
        at: DateTime<Utc>,
    ) -> StoreFuture<'a, CheckInOutcome> {
        let span = tracing::debug_span!("check_in", code = %code);
        Box::pin(
            async move {
                let updated: Option<TicketRecord> = sqlx::query_as(&format!(
                    "UPDATE tickets SET checked_in_at = $3 \
                     WHERE event_slug = $1 AND ticket_code = $2 AND checked_in_at IS NULL \
                     RETURNING {TICKET_COLUMNS}"
                ))
                .bind(&self.event_slug)
                .bind(code.as_str())
                .bind(at)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| unavailable("check in ticket", &e))?;

                let outcome = match updated {
                    Some(row) => CheckInOutcome::CheckedIn(row.into()),
                    // The condition failed: either someone else won or the code is unknown
                    None => match self.fetch(code).await? {
                        Some(ticket) => CheckInOutcome::AlreadyCheckedIn(ticket),
                        None => CheckInOutcome::NotFound,
                    },
                };

                let label = match &outcome {
                    CheckInOutcome::CheckedIn(_) => "checked_in",
                    CheckInOutcome::AlreadyCheckedIn(_) => "already_checked_in",
                    CheckInOutcome::NotFound => "not_found",
                };
                metrics::counter!("ticket_store.check_ins", "outcome" => label).increment(1);
                Ok(outcome)
            }
            .instrument(span),
        )
    }

    fn insert(&self, ticket: NewTicket) -> StoreFuture<'_, Ticket> {
        let span = tracing::debug_span!("insert", code = %ticket.ticket_code());
        Box::pin(
            async move {
                let inserted: Option<TicketRecord> = sqlx::query_as(&format!(
                    "INSERT INTO tickets (event_slug, ticket_code, attendee_name, event_name) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (event_slug, ticket_code) DO NOTHING \
                     RETURNING {TICKET_COLUMNS}"
                ))
                .bind(&self.event_slug)
                .bind(ticket.ticket_code().as_str())
                .bind(ticket.attendee_name())
                .bind(ticket.event_name())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| unavailable("insert ticket", &e))?;

                inserted
                    .map(Ticket::from)
                    .ok_or_else(|| TicketStoreError::DuplicateCode(ticket.ticket_code().clone()))
            }
            .instrument(span),
        )
    }

    fn list(&self) -> StoreFuture<'_, Vec<Ticket>> {
        Box::pin(
            async move {
                let rows: Vec<TicketRecord> = sqlx::query_as(&format!(
                    "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_slug = $1"
                ))
                .bind(&self.event_slug)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| unavailable("list tickets", &e))?;

                Ok(rows.into_iter().map(Ticket::from).collect())
            }
            .instrument(tracing::debug_span!("list_tickets")),
        )
    }

    fn subscribe(&self) -> StoreFuture<'_, TicketChangeStream> {
        Box::pin(async move {
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| unavailable("open change listener", &e))?;
            listener
                .listen(CHANGE_CHANNEL)
                .await
                .map_err(|e| unavailable("listen for changes", &e))?;
            tracing::debug!(event_slug = %self.event_slug, "Listening for ticket changes");

            let event_slug = self.event_slug.clone();
            let stream = async_stream::stream! {
                loop {
                    match listener.try_recv().await {
                        Ok(Some(notification)) => {
                            match ChangeNotification::parse(notification.payload()) {
                                Ok(change) if change.event_slug == event_slug => {
                                    yield Ok(change.into_change());
                                },
                                Ok(_) => {},
                                Err(error) => yield Err(error),
                            }
                        },
                        Ok(None) => {
                            // Listener reconnected; notifications in between are lost
                            yield Err(TicketStoreError::Unavailable(
                                "change listener reconnected".to_string(),
                            ));
                        },
                        Err(error) => {
                            yield Err(unavailable("receive change", &error));
                            break;
                        },
                    }
                }
            };
            Ok(Box::pin(stream) as TicketChangeStream)
        })
    }
}

//! CSV bulk import and manual ticket entry.
//!
//! Import is all-settled: rows are validated first, accepted rows are inserted
//! concurrently and independently, and the [`ImportReport`] says which rows
//! made it. Nothing is rolled back.

use checkin_core::{NewTicket, Ticket, TicketCode, TicketStore, TicketStoreError, TicketValidationError};
use checkin_runtime::metrics::ImportMetrics;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for a single ticket row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// A field is empty after trimming
    #[error(transparent)]
    Invalid(#[from] TicketValidationError),

    /// A ticket with this code already exists
    #[error("Ticket code already exists: {0}")]
    DuplicateCode(TicketCode),

    /// The store could not be reached
    #[error("Ticket store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<TicketStoreError> for ImportError {
    fn from(error: TicketStoreError) -> Self {
        match error {
            TicketStoreError::DuplicateCode(code) => Self::DuplicateCode(code),
            TicketStoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// One row as written by the operator. Fields are untrimmed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRow {
    /// Ticket code
    pub ticket_code: String,
    /// Attendee name
    pub attendee_name: String,
    /// Event name
    pub event_name: String,
}

impl TicketRow {
    /// Create a row.
    #[must_use]
    pub fn new(
        ticket_code: impl Into<String>,
        attendee_name: impl Into<String>,
        event_name: impl Into<String>,
    ) -> Self {
        Self {
            ticket_code: ticket_code.into(),
            attendee_name: attendee_name.into(),
            event_name: event_name.into(),
        }
    }

    /// Accept the row only if every field is non-empty after trimming.
    ///
    /// # Errors
    ///
    /// Returns [`TicketValidationError::MissingField`] for the first empty
    /// field.
    pub fn validate(&self) -> Result<NewTicket, TicketValidationError> {
        NewTicket::new(&self.ticket_code, &self.attendee_name, &self.event_name)
    }
}

/// Parse `ticket_code,attendee_name,event_name` lines.
///
/// The first non-blank line is a header and is skipped. Cells are trimmed and
/// missing cells become empty strings, so malformed rows survive to
/// validation and are reported with their row number. Quoting is not
/// supported.
#[must_use]
pub fn parse_csv(text: &str) -> Vec<TicketRow> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .skip(1)
        .map(|line| {
            let mut cells = line.split(',').map(str::trim);
            let mut next = || cells.next().unwrap_or_default().to_string();
            TicketRow {
                ticket_code: next(),
                attendee_name: next(),
                event_name: next(),
            }
        })
        .collect()
}

/// A row that failed validation and was never sent to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowRejection {
    /// 1-based position among data rows
    pub row: usize,
    /// What was wrong
    pub reason: TicketValidationError,
}

/// A valid row the store refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowFailure {
    /// 1-based position among data rows
    pub row: usize,
    /// Code of the refused ticket
    pub ticket_code: TicketCode,
    /// Why
    pub error: ImportError,
}

/// How an import went overall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Every row was inserted
    Complete,
    /// Some rows were inserted
    Partial,
    /// Nothing was inserted
    Failed,
}

/// Result of [`import_rows`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Stored tickets, in row order
    pub inserted: Vec<Ticket>,
    /// Rows that failed validation
    pub rejected: Vec<RowRejection>,
    /// Rows the store refused
    pub failed: Vec<RowFailure>,
}

impl ImportReport {
    /// Overall outcome.
    ///
    /// An empty import is `Complete`.
    #[must_use]
    pub fn outcome(&self) -> ImportOutcome {
        if self.rejected.is_empty() && self.failed.is_empty() {
            ImportOutcome::Complete
        } else if self.inserted.is_empty() {
            ImportOutcome::Failed
        } else {
            ImportOutcome::Partial
        }
    }

    /// Rows that did not make it, for any reason.
    #[must_use]
    pub fn problem_count(&self) -> usize {
        self.rejected.len() + self.failed.len()
    }
}

/// Validate every row and insert the valid ones concurrently.
///
/// One row failing never affects another.
#[tracing::instrument(skip(store, rows), fields(rows = rows.len()))]
pub async fn import_rows(store: &dyn TicketStore, rows: Vec<TicketRow>) -> ImportReport {
    let mut report = ImportReport::default();
    let mut accepted = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        match row.validate() {
            Ok(ticket) => accepted.push((index + 1, ticket)),
            Err(reason) => {
                tracing::debug!(row = index + 1, %reason, "Row rejected");
                report.rejected.push(RowRejection {
                    row: index + 1,
                    reason,
                });
            },
        }
    }

    let inserts = accepted.into_iter().map(|(row, ticket)| async move {
        let ticket_code = ticket.ticket_code().clone();
        (row, ticket_code, store.insert(ticket).await)
    });

    for (row, ticket_code, result) in join_all(inserts).await {
        match result {
            Ok(ticket) => report.inserted.push(ticket),
            Err(error) => {
                tracing::warn!(row, code = %ticket_code, %error, "Row not inserted");
                report.failed.push(RowFailure {
                    row,
                    ticket_code,
                    error: error.into(),
                });
            },
        }
    }

    ImportMetrics::record_rows("inserted", report.inserted.len());
    ImportMetrics::record_rows("rejected", report.rejected.len());
    ImportMetrics::record_rows("failed", report.failed.len());
    tracing::info!(
        inserted = report.inserted.len(),
        rejected = report.rejected.len(),
        failed = report.failed.len(),
        outcome = ?report.outcome(),
        "Import finished"
    );

    report
}

/// Validate and insert one manually entered ticket.
///
/// # Errors
///
/// - [`ImportError::Invalid`] if a field is empty
/// - [`ImportError::DuplicateCode`] if the code is taken
/// - [`ImportError::StoreUnavailable`] on transport failure
#[tracing::instrument(skip(store, row), fields(code = %row.ticket_code))]
pub async fn create_ticket(store: &dyn TicketStore, row: &TicketRow) -> Result<Ticket, ImportError> {
    let ticket = row.validate()?;
    let stored = store.insert(ticket).await?;
    tracing::info!(attendee = %stored.attendee_name, "Ticket created");
    Ok(stored)
}

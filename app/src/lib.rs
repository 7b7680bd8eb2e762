//! Event ticket check-in.
//!
//! Operators scan ticket codes at the door; each scan is checked against the
//! shared ticket collection and answered with a [`Verdict`](checkin_core::Verdict).
//! Any number of devices may scan at once: the store's conditional update
//! guarantees that a ticket is admitted once.
//!
//! # Modules
//!
//! - [`verifier`]: the check-in decision procedure
//! - [`session`]: scan session controller (reducer + store) around a camera decoder
//! - [`import`]: CSV bulk import and manual ticket entry
//! - [`audit`]: `tracing`-backed audit sink
//! - [`decoder`]: line-oriented decoder for terminals and piped input
//! - [`config`]: environment configuration
//!
//! # Example
//!
//! ```ignore
//! use checkin::verifier::Verifier;
//!
//! let verifier = Verifier::new(store, Arc::new(SystemClock));
//! println!("{}", verifier.evaluate("TICKET001").await);
//! ```

pub mod audit;
pub mod config;
pub mod decoder;
pub mod import;
pub mod session;
pub mod verifier;

pub use config::{Backend, Config, ConfigError};
pub use import::{ImportError, ImportOutcome, ImportReport, TicketRow};
pub use session::{SessionController, SessionState};
pub use verifier::Verifier;

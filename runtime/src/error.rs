//! Store errors.

use thiserror::Error;

/// Why the store refused or gave up on a request.
#[derive(Error, Debug)]
pub enum StoreError {
    /// `shutdown` was called; no more actions are reduced
    #[error("Store is shutting down")]
    ShutdownInProgress,

    /// Effects were still running when the shutdown deadline passed
    #[error("Shutdown timed out with {0} effects still running")]
    ShutdownTimeout(usize),

    /// No matching action arrived in time
    #[error("Timeout waiting for action")]
    Timeout,

    /// Nothing can publish actions any more
    #[error("Action broadcast channel closed")]
    ChannelClosed,
}

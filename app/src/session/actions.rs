//! Actions for the scan session reducer.

use checkin_core::{CheckInError, DateTime, ScanAttempt, Utc, Verdict};

/// Everything the session reacts to.
///
/// `Start` and `Stop` come from the operator. The decoder stream produces the
/// camera actions, each tagged with the `run` that started it so that output
/// of a released camera cannot leak into a later run. The verifier produces
/// `VerdictReady`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Acquire the camera and begin scanning
    Start,
    /// Release the camera
    Stop,
    /// The decoder opened the camera
    CameraStarted {
        /// Run that requested the camera
        run: u64,
    },
    /// The decoder could not open the camera
    CameraFailed {
        /// Run that requested the camera
        run: u64,
        /// Operator-facing error
        error: CheckInError,
    },
    /// The decoder stream ended (stopped, or the camera went away)
    DecoderStopped {
        /// Run whose stream ended
        run: u64,
    },
    /// A frame was decoded
    CodeDecoded {
        /// Run that produced the frame
        run: u64,
        /// Decoded text
        raw_code: String,
        /// When it was decoded
        observed_at: DateTime<Utc>,
    },
    /// The verifier answered
    VerdictReady {
        /// Run that produced the frame
        run: u64,
        /// What was scanned
        attempt: ScanAttempt,
        /// The answer
        verdict: Verdict,
    },
}

impl SessionAction {
    /// Whether this action settles the `Start` of `run` (camera opened or
    /// failed).
    #[must_use]
    pub const fn settles_start(&self, run: u64) -> bool {
        match self {
            Self::CameraStarted { run: settled } | Self::CameraFailed { run: settled, .. } => *settled == run,
            _ => false,
        }
    }
}

//! Scan session state.

use super::FrameGate;
use checkin_core::{CheckInError, ScanAttempt, Verdict};

/// Camera lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// Camera released
    #[default]
    Stopped,
    /// `Decoder::start` in flight
    Starting,
    /// Frames are flowing
    Scanning,
}

/// One evaluated scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanResult {
    /// What was scanned
    pub attempt: ScanAttempt,
    /// The answer
    pub verdict: Verdict,
}

/// Scan session state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Camera lifecycle
    pub status: SessionStatus,
    /// An evaluation is outstanding
    pub processing: bool,
    /// Most recent verdict, cleared by the next start
    pub last_result: Option<ScanResult>,
    /// Why the last start failed, cleared by the next start
    pub camera_error: Option<CheckInError>,
    /// Frames dropped while processing
    pub ignored_frames: u64,
    /// Frames handed to the verifier
    pub scans: u64,
    /// Incremented by every accepted `Start`
    pub run: u64,
    /// Run whose `Decoder::start` has not answered yet
    pub opening: Option<u64>,
    /// Paces the current run's frames
    pub gate: FrameGate,
}

impl SessionState {
    /// Whether frames are being accepted.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.status == SessionStatus::Scanning
    }

    /// Most recent verdict.
    #[must_use]
    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.last_result.as_ref().map(|result| &result.verdict)
    }
}

//! Scan session: camera decoder feeding the verifier.
//!
//! The session is a reducer ([`SessionReducer`]) run by the `checkin-runtime`
//! [`Store`](checkin_runtime::Store) and driven through [`SessionController`].
//!
//! ```text
//! start() → Decoder::start ─ frames ─→ CodeDecoded ─→ Verifier::evaluate_attempt
//!                                          │ (next frame after the verdict)
//!                                          ↓
//!                                     VerdictReady → last_verdict
//! ```
//!
//! At most one evaluation is outstanding. A [`FrameGate`] keeps the decoder
//! from reading the next frame until the current one is settled, so nothing
//! is read and then discarded.

pub mod actions;
pub mod controller;
pub mod environment;
pub mod gate;
pub mod reducer;
pub mod types;

pub use actions::SessionAction;
pub use controller::{SessionController, VerdictStream};
pub use environment::SessionEnvironment;
pub use gate::FrameGate;
pub use reducer::SessionReducer;
pub use types::{ScanResult, SessionState, SessionStatus};

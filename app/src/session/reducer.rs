//! Reducer for the scan session.

use super::{FrameGate, SessionAction, SessionEnvironment, SessionState, SessionStatus};
use checkin_core::effect::Effect;
use checkin_core::reducer::Reducer;
use checkin_core::{smallvec, CheckInError, ScanAttempt, SmallVec};
use checkin_runtime::metrics::SessionMetrics;
use futures::StreamExt;
use std::sync::Arc;

/// Scan session state machine.
///
/// ```text
/// Stopped ──Start──→ Starting ──CameraStarted──→ Scanning
///    ↑                  │                           │
///    └──CameraFailed────┘    Stop / DecoderStopped ─┘
/// ```
///
/// `processing` is orthogonal to the status: it is set when a code is handed
/// to the verifier and cleared by `VerdictReady`.
///
/// Only one `Decoder::start` is in flight at a time. A `Start` that arrives
/// while an abandoned run's camera is still opening waits for that camera to
/// answer; that camera is then released and the new run's start follows.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionReducer;

impl SessionReducer {
    /// Create a new session reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Action = SessionAction;
    type Environment = SessionEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut SessionState,
        action: SessionAction,
        env: &SessionEnvironment,
    ) -> SmallVec<[Effect<SessionAction>; 4]> {
        match action {
            SessionAction::Start => {
                if state.status != SessionStatus::Stopped {
                    tracing::debug!(status = ?state.status, "Start ignored");
                    return smallvec![Effect::None];
                }

                state.run += 1;
                state.status = SessionStatus::Starting;
                state.last_result = None;
                state.camera_error = None;
                state.gate = FrameGate::open();

                if let Some(pending) = state.opening {
                    // Dispatched once the earlier start answers
                    tracing::info!(run = state.run, pending, "Camera still opening, start deferred");
                    return smallvec![Effect::None];
                }

                tracing::info!(run = state.run, "Starting camera");
                state.opening = Some(state.run);
                smallvec![run_decoder(env, state.run, state.gate.clone())]
            },

            SessionAction::Stop => {
                if state.status == SessionStatus::Stopped {
                    return smallvec![Effect::None];
                }

                state.status = SessionStatus::Stopped;
                SessionMetrics::record_scanning(false);
                tracing::info!(run = state.run, "Stopping camera");

                smallvec![release_camera(env, &state.gate)]
            },

            SessionAction::CameraStarted { run } => {
                settle_start(state, run);

                if run != state.run {
                    tracing::debug!(run, current = state.run, "Releasing camera of an abandoned run");
                    return match start_deferred(state, env) {
                        Some(start) => smallvec![Effect::chain(vec![stop_decoder(env), start])],
                        None => smallvec![stop_decoder(env)],
                    };
                }

                match state.status {
                    SessionStatus::Starting => {
                        state.status = SessionStatus::Scanning;
                        SessionMetrics::record_scanning(true);
                        smallvec![Effect::None]
                    },
                    // Stopped while the camera was opening
                    SessionStatus::Stopped => smallvec![release_camera(env, &state.gate)],
                    SessionStatus::Scanning => smallvec![Effect::None],
                }
            },

            SessionAction::CameraFailed { run, error } => {
                settle_start(state, run);

                if run != state.run {
                    return smallvec![start_deferred(state, env).unwrap_or(Effect::None)];
                }

                tracing::error!(error = %error, "Camera failed to start");
                SessionMetrics::record_camera_failure();
                state.status = SessionStatus::Stopped;
                state.camera_error = Some(error);
                smallvec![Effect::None]
            },

            SessionAction::DecoderStopped { run } => {
                if run == state.run && state.status == SessionStatus::Scanning {
                    tracing::info!(run, "Decoder stream ended");
                    state.status = SessionStatus::Stopped;
                    SessionMetrics::record_scanning(false);
                }
                smallvec![Effect::None]
            },

            SessionAction::CodeDecoded {
                run,
                raw_code,
                observed_at,
            } => {
                if run != state.run {
                    return smallvec![Effect::None];
                }
                if !state.is_scanning() || raw_code.trim().is_empty() {
                    return smallvec![release_frame(&state.gate)];
                }
                SessionMetrics::record_frame();

                if state.processing {
                    state.ignored_frames += 1;
                    SessionMetrics::record_ignored_frame();
                    tracing::trace!(code = %raw_code, "Frame ignored while processing");
                    return smallvec![release_frame(&state.gate)];
                }

                state.processing = true;
                state.scans += 1;
                let evaluate = evaluate(env, run, ScanAttempt::new(raw_code, observed_at));

                if env.single_shot {
                    state.status = SessionStatus::Stopped;
                    SessionMetrics::record_scanning(false);
                    smallvec![Effect::chain(vec![release_camera(env, &state.gate), evaluate])]
                } else {
                    smallvec![evaluate]
                }
            },

            SessionAction::VerdictReady { run, attempt, verdict } => {
                state.processing = false;
                state.last_result = Some(super::ScanResult { attempt, verdict });
                if run == state.run {
                    smallvec![release_frame(&state.gate)]
                } else {
                    smallvec![Effect::None]
                }
            },
        }
    }
}

/// Forget the in-flight start of `run`, if it was the one being waited on.
fn settle_start(state: &mut SessionState, run: u64) {
    if state.opening == Some(run) {
        state.opening = None;
    }
}

/// Start the camera for a run whose `Start` arrived while an earlier start
/// was still in flight.
fn start_deferred(state: &mut SessionState, env: &SessionEnvironment) -> Option<Effect<SessionAction>> {
    if state.status != SessionStatus::Starting || state.opening.is_some() {
        return None;
    }
    tracing::info!(run = state.run, "Starting camera");
    state.opening = Some(state.run);
    Some(run_decoder(env, state.run, state.gate.clone()))
}

/// Open the camera and turn its output into session actions.
///
/// A frame is read only after the gate lets it through.
fn run_decoder(env: &SessionEnvironment, run: u64, gate: FrameGate) -> Effect<SessionAction> {
    let decoder = Arc::clone(&env.decoder);
    let clock = Arc::clone(&env.clock);
    let settings = env.settings.clone();

    Effect::Stream(Box::pin(async_stream::stream! {
        let frames = decoder.start(&settings).await;
        match frames {
            Ok(mut frames) => {
                yield SessionAction::CameraStarted { run };
                while gate.take().await {
                    match frames.next().await {
                        Some(raw_code) => {
                            yield SessionAction::CodeDecoded {
                                run,
                                raw_code,
                                observed_at: clock.now(),
                            };
                        },
                        None => break,
                    }
                }
                yield SessionAction::DecoderStopped { run };
            },
            Err(error) => {
                yield SessionAction::CameraFailed {
                    run,
                    error: CheckInError::from(error),
                };
            },
        }
    }))
}

/// Close the run's gate, then stop the decoder.
fn release_camera(env: &SessionEnvironment, gate: &FrameGate) -> Effect<SessionAction> {
    let decoder = Arc::clone(&env.decoder);
    let gate = gate.clone();
    Effect::Future(Box::pin(async move {
        gate.close();
        decoder.stop().await;
        None
    }))
}

fn stop_decoder(env: &SessionEnvironment) -> Effect<SessionAction> {
    let decoder = Arc::clone(&env.decoder);
    Effect::Future(Box::pin(async move {
        decoder.stop().await;
        None
    }))
}

/// Let the decoder read its next frame.
fn release_frame(gate: &FrameGate) -> Effect<SessionAction> {
    let gate = gate.clone();
    Effect::Future(Box::pin(async move {
        gate.release();
        None
    }))
}

fn evaluate(env: &SessionEnvironment, run: u64, attempt: ScanAttempt) -> Effect<SessionAction> {
    let verifier = Arc::clone(&env.verifier);
    Effect::Future(Box::pin(async move {
        let verdict = verifier.evaluate_attempt(&attempt).await;
        Some(SessionAction::VerdictReady { run, attempt, verdict })
    }))
}

//! Operator-facing handle on a running scan session.

use super::{ScanResult, SessionAction, SessionEnvironment, SessionReducer, SessionState};
use checkin_runtime::{Store, StoreError};
use futures::Stream;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::broadcast;

/// Verdicts as they are produced, in order.
pub type VerdictStream = Pin<Box<dyn Stream<Item = ScanResult> + Send>>;

type SessionStore = Store<SessionState, SessionAction, SessionEnvironment, SessionReducer>;

/// Drives one scan session.
///
/// Cloning yields another handle on the same session.
#[derive(Clone)]
pub struct SessionController {
    store: SessionStore,
}

impl SessionController {
    /// Create a stopped session.
    #[must_use]
    pub fn new(environment: SessionEnvironment) -> Self {
        Self {
            store: Store::new(SessionState::default(), SessionReducer::new(), environment),
        }
    }

    /// Request the camera. A no-op unless the session is stopped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<(), StoreError> {
        self.store.send(SessionAction::Start).await.map(|_| ())
    }

    /// Request the camera and wait until it opened or failed.
    ///
    /// Returns the resulting state. A camera failure is reported through
    /// [`SessionState::camera_error`], not as an `Err`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: the decoder did not answer within `timeout`
    /// - [`StoreError::ShutdownInProgress`]: the session was shut down
    pub async fn start_and_wait(&self, timeout: Duration) -> Result<SessionState, StoreError> {
        let Some(run) = self
            .store
            .state(|s| (s.status == super::SessionStatus::Stopped).then_some(s.run + 1))
            .await
        else {
            return Ok(self.state().await);
        };
        self.store
            .send_and_wait_for(SessionAction::Start, move |action| action.settles_start(run), timeout)
            .await?;
        Ok(self.state().await)
    }

    /// Release the camera. A no-op when stopped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    pub async fn stop(&self) -> Result<(), StoreError> {
        self.store.send(SessionAction::Stop).await.map(|_| ())
    }

    /// Snapshot of the session state.
    pub async fn state(&self) -> SessionState {
        self.store.state(Clone::clone).await
    }

    /// Most recent verdict, if any since the last start.
    pub async fn last_result(&self) -> Option<ScanResult> {
        self.store.state(|s| s.last_result.clone()).await
    }

    /// Every action produced by the decoder and the verifier.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<SessionAction> {
        self.store.subscribe_actions()
    }

    /// Verdicts produced from now on.
    ///
    /// Ends when the session is shut down and dropped. A slow consumer skips
    /// verdicts rather than blocking the session.
    #[must_use]
    pub fn subscribe_verdicts(&self) -> VerdictStream {
        let mut actions = self.store.subscribe_actions();
        Box::pin(async_stream::stream! {
            loop {
                match actions.recv().await {
                    Ok(SessionAction::VerdictReady { attempt, verdict, .. }) => {
                        yield ScanResult { attempt, verdict };
                    },
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Verdict subscriber lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Release the camera and wait for in-flight evaluations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// after `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        if let Err(error) = self.stop().await {
            tracing::debug!(%error, "Stop skipped during shutdown");
        }
        self.store.shutdown(timeout).await
    }
}

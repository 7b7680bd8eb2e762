//! Counting running effect tasks.
//!
//! Every spawned effect holds an [`EffectGuard`] on two counters: the one for
//! the `send` that started it and the store-wide one used by shutdown.

use crate::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Number of running effects, observable through a watch channel.
#[derive(Clone)]
pub(crate) struct EffectCounter(Arc<watch::Sender<usize>>);

impl EffectCounter {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self(Arc::new(tx))
    }

    /// Count one more effect until the guard drops.
    pub(crate) fn enter(&self) -> EffectGuard {
        self.0.send_modify(|running| *running += 1);
        EffectGuard(self.clone())
    }

    pub(crate) fn running(&self) -> usize {
        *self.0.borrow()
    }

    pub(crate) fn handle(&self) -> EffectHandle {
        EffectHandle {
            running: self.0.subscribe(),
        }
    }
}

/// Decrements its counter on drop, including when the task panics.
pub(crate) struct EffectGuard(EffectCounter);

impl Drop for EffectGuard {
    fn drop(&mut self) {
        self.0.0.send_modify(|running| *running = running.saturating_sub(1));
    }
}

/// Waits for the effects started by one `send`.
///
/// Only direct effects are counted. Actions they feed back start effects of
/// their own; wait for those with [`Store::send_and_wait_for`](crate::Store::send_and_wait_for).
///
/// ```ignore
/// let mut handle = store.send(SessionAction::Stop).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    running: watch::Receiver<usize>,
}

impl EffectHandle {
    /// A handle with nothing to wait for.
    #[must_use]
    pub fn completed() -> Self {
        let (_, running) = watch::channel(0);
        Self { running }
    }

    /// Effects still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        *self.running.borrow()
    }

    /// Resolve once every tracked effect has finished.
    pub async fn wait(&mut self) {
        // A closed channel means every guard is gone
        let _ = self.running.wait_for(|running| *running == 0).await;
    }

    /// [`wait`](Self::wait) with a deadline.
    ///
    /// # Errors
    ///
    /// [`StoreError::Timeout`] if effects are still running at the deadline.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

//! Frame pacing between the decoder stream and the session.

use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// One-frame-at-a-time gate for a camera run.
///
/// The decoder stream takes the single permit before it reads a frame. The
/// session hands the permit back once that frame is settled: dropped, or
/// evaluated and answered. Frames therefore stay in the decoder while a
/// verdict is pending instead of being read and thrown away.
///
/// Closing the gate ends a stream waiting for the permit. Equality is
/// identity: two gates are equal only if they are the same gate.
#[derive(Clone)]
pub struct FrameGate(Arc<Semaphore>);

impl FrameGate {
    /// A gate with the permit available.
    #[must_use]
    pub fn open() -> Self {
        Self(Arc::new(Semaphore::new(1)))
    }

    /// A gate that never lets a frame through.
    #[must_use]
    pub fn closed() -> Self {
        let gate = Self(Arc::new(Semaphore::new(0)));
        gate.close();
        gate
    }

    /// Wait for the permit. `false` once the gate is closed.
    pub async fn take(&self) -> bool {
        match self.0.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            },
            Err(_) => false,
        }
    }

    /// Hand the permit back. Never holds more than one.
    pub fn release(&self) {
        if !self.0.is_closed() && self.0.available_permits() == 0 {
            self.0.add_permits(1);
        }
    }

    /// Stop letting frames through.
    pub fn close(&self) {
        self.0.close();
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

impl Default for FrameGate {
    fn default() -> Self {
        Self::closed()
    }
}

impl PartialEq for FrameGate {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FrameGate {}

impl fmt::Debug for FrameGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameGate")
            .field("closed", &self.0.is_closed())
            .field("available", &self.0.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn one_frame_until_released() {
        let gate = FrameGate::open();
        assert!(gate.take().await);
        assert!(tokio::time::timeout(Duration::from_millis(20), gate.take()).await.is_err());

        gate.release();
        gate.release();
        assert!(gate.take().await);
        assert!(tokio::time::timeout(Duration::from_millis(20), gate.take()).await.is_err());
    }

    #[tokio::test]
    async fn closing_wakes_a_waiting_stream() {
        let gate = FrameGate::open();
        assert!(gate.take().await);

        let waiter = tokio::spawn({
            let gate = gate.clone();
            async move { gate.take().await }
        });
        gate.close();
        assert_eq!(waiter.await.ok(), Some(false));

        gate.release();
        assert!(!gate.take().await);
    }

    #[test]
    fn equality_is_identity() {
        let gate = FrameGate::open();
        assert_eq!(gate, gate.clone());
        assert_ne!(gate, FrameGate::open());
        assert!(FrameGate::default().is_closed());
    }
}

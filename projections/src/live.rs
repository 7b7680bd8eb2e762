//! Live dashboard task.
//!
//! Keeps a [`Dashboard`] current from the store's change feed until the
//! returned [`SubscriptionHandle`] is cancelled or dropped.

use crate::dashboard::{Dashboard, DashboardSnapshot};
use checkin_core::{TicketStore, TicketStoreError};
use checkin_runtime::metrics::DashboardMetrics;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cancels a live dashboard subscription.
///
/// Dropping the handle cancels as well.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Stop delivering updates. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Whether the background task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel and wait for the background task to exit.
    pub async fn cancel_and_wait(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(error = %error, "Live dashboard task ended abnormally");
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// Spawns live dashboards.
pub struct LiveDashboard;

impl LiveDashboard {
    /// Subscribe, load the initial snapshot, then keep applying changes.
    ///
    /// `on_change` is called once with the initial snapshot before this
    /// returns, then from the background task after every notification. A
    /// feed error (for example a lagging subscriber) triggers a full reload.
    ///
    /// # Errors
    ///
    /// Returns [`TicketStoreError`] if the subscription or the initial listing
    /// fails. Later failures are logged and end the task.
    pub async fn spawn<F>(
        store: Arc<dyn TicketStore>,
        mut on_change: F,
    ) -> Result<SubscriptionHandle, TicketStoreError>
    where
        F: FnMut(DashboardSnapshot) + Send + 'static,
    {
        // Subscribe before listing so no change falls between the two
        let mut changes = store.subscribe().await?;
        let mut dashboard = Dashboard::new();
        dashboard.load(store.list().await?);
        tracing::info!(tickets = dashboard.len(), "Live dashboard loaded");
        on_change(dashboard.snapshot());

        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    next = changes.next() => next,
                };

                match next {
                    Some(Ok(change)) => {
                        tracing::debug!(code = %change.ticket().ticket_code, "Dashboard change");
                        dashboard.apply(change);
                    },
                    Some(Err(error)) => {
                        tracing::warn!(error = %error, "Change feed error, reloading dashboard");
                        match store.list().await {
                            Ok(tickets) => dashboard.load(tickets),
                            Err(error) => {
                                tracing::error!(error = %error, "Dashboard reload failed");
                                break;
                            },
                        }
                    },
                    None => {
                        tracing::info!("Change feed closed");
                        break;
                    },
                }

                if *cancelled.borrow() {
                    break;
                }
                let snapshot = dashboard.snapshot();
                DashboardMetrics::record_change(snapshot.stats.checked_in);
                on_change(snapshot);
            }
            tracing::debug!("Live dashboard stopped");
        });

        Ok(SubscriptionHandle {
            cancel,
            task: Some(task),
        })
    }
}

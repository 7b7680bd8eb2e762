//! The `Store`: state, reducer, environment and the effect loop.

use crate::effects::{EffectCounter, EffectHandle};
use crate::StoreError;
use checkin_core::{effect::Effect, reducer::Reducer};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

const ACTION_CHANNEL_CAPACITY: usize = 64;

/// Runs a reducer and the effects it returns.
///
/// Reductions are serialized by the state write lock, so each action sees
/// every state change made before it. Actions produced by effects are reduced
/// first and then published to [`subscribe_actions`](Self::subscribe_actions)
/// receivers, which can therefore read the updated state.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: Arc<R>,
    environment: Arc<E>,
    closing: Arc<AtomicBool>,
    in_flight: EffectCounter,
    actions: broadcast::Sender<A>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Build a store around `state`.
    #[must_use]
    pub fn new(state: S, reducer: R, environment: E) -> Self {
        let (actions, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(state)),
            reducer: Arc::new(reducer),
            environment: Arc::new(environment),
            closing: Arc::new(AtomicBool::new(false)),
            in_flight: EffectCounter::new(),
            actions,
        }
    }

    /// Reduce `action` and start its effects.
    ///
    /// Returns once the effects are spawned; the handle waits for them.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownInProgress`] after [`shutdown`](Self::shutdown).
    #[tracing::instrument(skip_all, name = "store_send")]
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        if self.closing.load(Ordering::Acquire) {
            return Err(StoreError::ShutdownInProgress);
        }

        let effects = {
            let mut state = self.state.write().await;
            self.reducer.reduce(&mut state, action, &self.environment)
        };
        metrics::counter!("checkin_store_actions_total").increment(1);

        let started = EffectCounter::new();
        for effect in effects {
            self.run_effect(effect, &started);
        }
        Ok(started.handle())
    }

    /// Send `action`, then wait for the first published action matching
    /// `predicate`.
    ///
    /// The receiver is registered before sending, so fast effects are not
    /// missed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`] if the store is closing
    /// - [`StoreError::Timeout`] if nothing matched in time
    /// - [`StoreError::ChannelClosed`] if publishing stopped
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut published = self.actions.subscribe();
        self.send(action).await?;

        let matching = async {
            loop {
                match published.recv().await {
                    Ok(action) if predicate(&action) => break Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => break Err(StoreError::ChannelClosed),
                }
            }
        };
        tokio::time::timeout(timeout, matching)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    /// Receive every action produced by an effect, after it was reduced.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.actions.subscribe()
    }

    /// Read from the state under the read lock.
    pub async fn state<F, T>(&self, read: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        read(&*self.state.read().await)
    }

    /// Refuse further actions and wait for running effects to end.
    ///
    /// Streams stop at their next item, since feeding it back fails.
    ///
    /// # Errors
    ///
    /// [`StoreError::ShutdownTimeout`] with the number of effects still
    /// running at the deadline.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.closing.store(true, Ordering::Release);
        tracing::info!(running = self.in_flight.running(), "Store shutting down");

        let mut drained = self.in_flight.handle();
        match drained.wait_with_timeout(timeout).await {
            Ok(()) => {
                tracing::info!("Store drained");
                Ok(())
            },
            Err(_) => {
                let running = self.in_flight.running();
                tracing::error!(running, "Store shutdown timed out");
                Err(StoreError::ShutdownTimeout(running))
            },
        }
    }

    /// Spawn `task`, counted by `started` and by the store-wide counter.
    fn spawn_counted<F>(&self, started: &EffectCounter, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guards = (started.enter(), self.in_flight.enter());
        tokio::spawn(async move {
            let _guards = guards;
            task.await;
        });
    }

    /// Reduce an effect's action, then publish it even if it was refused.
    async fn feed_back(&self, action: A) -> Result<EffectHandle, StoreError> {
        let reduced = self.send(action.clone()).await;
        let _ = self.actions.send(action);
        reduced
    }

    fn run_effect(&self, effect: Effect<A>, started: &EffectCounter) {
        match effect {
            Effect::None => {},
            Effect::Future(future) => {
                metrics::counter!("checkin_store_effects_total", "kind" => "future").increment(1);
                let store = self.clone();
                self.spawn_counted(started, async move {
                    let Some(action) = future.await else { return };
                    if let Err(error) = store.feed_back(action).await {
                        tracing::debug!(%error, "Future effect output dropped");
                    }
                });
            },
            Effect::Stream(mut stream) => {
                metrics::counter!("checkin_store_effects_total", "kind" => "stream").increment(1);
                let store = self.clone();
                self.spawn_counted(started, async move {
                    while let Some(action) = stream.next().await {
                        if let Err(error) = store.feed_back(action).await {
                            tracing::debug!(%error, "Stream effect stopped");
                            break;
                        }
                    }
                });
            },
            Effect::Sequential(steps) => {
                metrics::counter!("checkin_store_effects_total", "kind" => "sequential").increment(1);
                let store = self.clone();
                self.spawn_counted(started, async move {
                    for step in steps {
                        let current = EffectCounter::new();
                        store.run_effect(step, &current);
                        current.handle().wait().await;
                    }
                });
            },
        }
    }
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: Arc::clone(&self.reducer),
            environment: Arc::clone(&self.environment),
            closing: Arc::clone(&self.closing),
            in_flight: self.in_flight.clone(),
            actions: self.actions.clone(),
        }
    }
}

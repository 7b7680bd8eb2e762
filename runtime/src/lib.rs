//! # Check-in Runtime
//!
//! Executes reducers. A [`Store`] owns the state, reduces one action at a
//! time and runs the returned effects on tokio, feeding the actions they
//! produce back in.
//!
//! ```ignore
//! use checkin_runtime::Store;
//!
//! let store = Store::new(SessionState::default(), SessionReducer::new(), environment);
//! store.send(SessionAction::Start).await?;
//! let scanning = store.state(|s| s.is_scanning()).await;
//! ```

mod effects;
mod error;
pub mod metrics;
mod store;

pub use effects::EffectHandle;
pub use error::StoreError;
pub use store::Store;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use checkin_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Clone, Debug, Default)]
    struct CounterState {
        count: i64,
        log: Vec<&'static str>,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum CounterAction {
        Increment,
        IncrementLater,
        Log(&'static str),
        LogBoth,
        Done,
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut CounterState,
            action: CounterAction,
            _env: &(),
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                CounterAction::IncrementLater => smallvec![Effect::Future(Box::pin(async {
                    Some(CounterAction::Increment)
                }))],
                CounterAction::Log(entry) => {
                    state.log.push(entry);
                    smallvec![Effect::None]
                },
                CounterAction::LogBoth => smallvec![Effect::chain(vec![
                    Effect::Future(Box::pin(async { Some(CounterAction::Log("first")) })),
                    Effect::Future(Box::pin(async { Some(CounterAction::Log("second")) })),
                    Effect::Future(Box::pin(async { Some(CounterAction::Done) })),
                ])],
                CounterAction::Done => smallvec![Effect::None],
            }
        }
    }

    #[tokio::test]
    async fn send_applies_reducer() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        store.send(CounterAction::Increment).await.unwrap();
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn future_effects_feed_back() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let result = store
            .send_and_wait_for(
                CounterAction::IncrementLater,
                |a| *a == CounterAction::Increment,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(result, CounterAction::Increment);

        let mut handle = EffectHandle::completed();
        handle.wait().await;
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn sequential_effects_keep_order() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        store
            .send_and_wait_for(CounterAction::LogBoth, |a| *a == CounterAction::Done, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(store.state(|s| s.log.clone()).await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(
            store.send(CounterAction::Increment).await,
            Err(StoreError::ShutdownInProgress)
        ));
    }
}

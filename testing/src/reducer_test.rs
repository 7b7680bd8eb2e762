//! Given/when/then harness for reducers.
//!
//! Drives a reducer directly, without a runtime, so effects can be inspected
//! instead of executed.

#![allow(clippy::module_name_repetitions)]

use checkin_core::{effect::Effect, reducer::Reducer};

type StateCheck<S> = Box<dyn FnOnce(&S)>;
type EffectCheck<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Reducer test case.
///
/// # Example
///
/// ```ignore
/// use checkin_testing::{assertions, ReducerTest};
///
/// ReducerTest::new(SessionReducer::new())
///     .with_env(environment)
///     .given_state(SessionState::default())
///     .when_action(SessionAction::Start)
///     .then_state(|state| assert_eq!(state.status, SessionStatus::Starting))
///     .then_effects(|effects| assertions::assert_has_stream_effect(effects))
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    env: Option<E>,
    given: Option<S>,
    actions: Vec<A>,
    state_checks: Vec<StateCheck<S>>,
    effect_checks: Vec<EffectCheck<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
    S: Clone,
    A: Clone,
{
    /// Start a test case for `reducer`.
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            env: None,
            given: None,
            actions: Vec::new(),
            state_checks: Vec::new(),
            effect_checks: Vec::new(),
        }
    }

    /// Environment passed to every `reduce` call.
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.env = Some(env);
        self
    }

    /// Starting state.
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.given = Some(state);
        self
    }

    /// Queue one action.
    ///
    /// Actions are reduced in order; effect checks see only the effects of
    /// the last one.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Queue several actions.
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Check the final state.
    #[must_use]
    pub fn then_state<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_checks.push(Box::new(check));
        self
    }

    /// Check the effects of the last action.
    #[must_use]
    pub fn then_effects<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_checks.push(Box::new(check));
        self
    }

    /// Reduce every queued action, then run the checks.
    ///
    /// # Panics
    ///
    /// Panics if the state, the environment or any action is missing, and
    /// when a check fails.
    #[allow(clippy::panic)]
    #[allow(clippy::expect_used)]
    pub fn run(self) {
        let mut state = self.given.expect("call given_state() first");
        let env = self.env.expect("call with_env() first");
        assert!(!self.actions.is_empty(), "call when_action() at least once");

        let mut effects = Vec::new();
        for action in self.actions {
            effects = self.reducer.reduce(&mut state, action, &env).into_vec();
        }

        for check in self.state_checks {
            check(&state);
        }
        for check in self.effect_checks {
            check(&effects);
        }
    }
}

/// Effect checks for use in [`ReducerTest::then_effects`].
pub mod assertions {
    use checkin_core::effect::Effect;

    /// Nothing to execute: no effects, or a lone `Effect::None`.
    ///
    /// # Panics
    ///
    /// Panics otherwise.
    #[allow(clippy::panic)]
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.is_empty() || matches!(effects, [Effect::None]),
            "expected no effects, got {effects:?}"
        );
    }

    /// Exactly `expected` effects.
    ///
    /// # Panics
    ///
    /// Panics on a different count.
    #[allow(clippy::panic)]
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(effects.len(), expected, "unexpected number of effects");
    }

    /// At least one `Effect::Future`.
    ///
    /// # Panics
    ///
    /// Panics if there is none.
    #[allow(clippy::panic)]
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Future(_))),
            "expected a Future effect"
        );
    }

    /// At least one `Effect::Stream`.
    ///
    /// # Panics
    ///
    /// Panics if there is none.
    #[allow(clippy::panic)]
    pub fn assert_has_stream_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(|e| matches!(e, Effect::Stream(_))),
            "expected a Stream effect"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkin_core::effect::Effect;
    use checkin_core::reducer::Reducer;
    use checkin_core::{smallvec, SmallVec};

    #[derive(Clone, Debug, Default)]
    struct GateState {
        admitted: u32,
        turned_away: u32,
    }

    #[derive(Clone, Debug)]
    enum GateAction {
        Admit,
        TurnAway,
        AdmitLater,
    }

    struct GateReducer;

    impl Reducer for GateReducer {
        type State = GateState;
        type Action = GateAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut GateState,
            action: GateAction,
            _env: &(),
        ) -> SmallVec<[Effect<GateAction>; 4]> {
            match action {
                GateAction::Admit => {
                    state.admitted += 1;
                    smallvec![Effect::None]
                },
                GateAction::TurnAway => {
                    state.turned_away += 1;
                    smallvec![Effect::None]
                },
                GateAction::AdmitLater => {
                    smallvec![Effect::Future(Box::pin(async { Some(GateAction::Admit) }))]
                },
            }
        }
    }

    #[test]
    fn single_action() {
        ReducerTest::new(GateReducer)
            .with_env(())
            .given_state(GateState::default())
            .when_action(GateAction::Admit)
            .then_state(|state| assert_eq!(state.admitted, 1))
            .then_effects(|effects| assertions::assert_no_effects(effects))
            .run();
    }

    #[test]
    fn action_sequence_reports_last_effects() {
        ReducerTest::new(GateReducer)
            .with_env(())
            .given_state(GateState::default())
            .when_actions([GateAction::TurnAway, GateAction::Admit, GateAction::AdmitLater])
            .then_state(|state| {
                assert_eq!(state.admitted, 1);
                assert_eq!(state.turned_away, 1);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_future_effect(effects);
            })
            .run();
    }

    #[test]
    fn assertion_helpers() {
        assertions::assert_no_effects::<GateAction>(&[Effect::None]);
        assertions::assert_no_effects::<GateAction>(&[]);
        assertions::assert_has_stream_effect::<GateAction>(&[Effect::Stream(Box::pin(
            futures::stream::empty(),
        ))]);
    }
}

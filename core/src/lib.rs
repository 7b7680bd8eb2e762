//! # Check-in Core
//!
//! Core traits and domain types for event ticket check-in.
//!
//! The crate has two halves:
//!
//! - The **architecture** used by the session controller: [`reducer::Reducer`],
//!   [`effect::Effect`] and the injected [`environment::Clock`].
//! - The **domain**: tickets, scan attempts and verdicts ([`ticket`]), the
//!   shared ticket store seam ([`ticket_store`]), the camera decoder seam
//!   ([`decoder`]), the audit hook ([`audit`]) and the operator-facing error
//!   taxonomy ([`error`]).
//!
//! ## Session architecture
//!
//! - **State**: what the scan session currently knows (camera status, last verdict)
//! - **Action**: operator commands plus everything the decoder and verifier report
//! - **Reducer**: `(state, action, environment)` to new state plus effects, with no I/O
//! - **Effect**: I/O the runtime performs on the reducer's behalf
//! - **Environment**: decoder, verifier and clock, injected as trait objects
//!
//! ## Example
//!
//! ```ignore
//! use checkin_core::*;
//!
//! impl Reducer for SessionReducer {
//!     type State = SessionState;
//!     type Action = SessionAction;
//!     type Environment = SessionEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut SessionState,
//!         action: SessionAction,
//!         env: &SessionEnvironment,
//!     ) -> SmallVec<[Effect<SessionAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

pub mod audit;
pub mod decoder;
pub mod error;
pub mod ticket;
pub mod ticket_store;

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};

pub use audit::{AuditEntry, AuditError, AuditOutcome, AuditSink};
pub use decoder::{CameraFacing, DecodeRegion, DecodedStream, Decoder, DecoderError, DecoderSettings};
pub use error::CheckInError;
pub use ticket::{InvalidReason, NewTicket, ScanAttempt, Ticket, TicketCode, TicketValidationError, Verdict};
pub use ticket_store::{CheckInOutcome, TicketChange, TicketChangeStream, TicketStore, TicketStoreError};

/// The [`Reducer`](reducer::Reducer) trait.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// State machine driven by actions.
    ///
    /// `reduce` mutates `state` and returns the I/O to perform next. It must
    /// not block or perform I/O itself, so the same inputs always produce
    /// the same state.
    pub trait Reducer {
        /// State owned by the runtime
        type State;

        /// Inputs, including those fed back by effects
        type Action;

        /// Injected dependencies
        type Environment;

        /// Apply `action` to `state` and describe the follow-up effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Descriptions of I/O returned by reducers.
pub mod effect {
    use futures::Stream;
    use std::future::Future;
    use std::pin::Pin;

    /// I/O for the runtime to perform.
    ///
    /// Building an effect does nothing; the runtime's `Store` executes it and
    /// feeds any resulting actions back into the reducer.
    pub enum Effect<Action> {
        /// Nothing to do
        None,

        /// Run each effect to completion before starting the next
        Sequential(Vec<Effect<Action>>),

        /// One async call, optionally answered by an action
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Long-lived stream of actions
        ///
        /// Every item is fed back into the reducer in order. Used for decoder
        /// output, which keeps producing until the camera is released.
        Stream(Pin<Box<dyn Stream<Item = Action> + Send>>),
    }

    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => f.write_str("Effect::None"),
                Self::Sequential(chain) => f.debug_tuple("Effect::Sequential").field(chain).finish(),
                Self::Future(_) => f.write_str("Effect::Future(<future>)"),
                Self::Stream(_) => f.write_str("Effect::Stream(<stream>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Run `effects` one after another.
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Whether this effect does nothing
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Injected dependencies shared across crates.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Source of check-in and scan timestamps.
    ///
    /// Injected so tests can assert exact `checked_in_at` values.
    pub trait Clock: Send + Sync {
        /// Current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`].
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;

    #[test]
    fn effect_debug_hides_futures() {
        let effect: Effect<u8> = Effect::Future(Box::pin(async { Some(1) }));
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");

        let chained: Effect<u8> = Effect::chain(vec![Effect::None]);
        assert_eq!(format!("{chained:?}"), "Effect::Sequential([Effect::None])");
    }

    #[test]
    fn none_is_none() {
        assert!(Effect::<u8>::None.is_none());
        assert!(!Effect::<u8>::chain(vec![]).is_none());
    }
}

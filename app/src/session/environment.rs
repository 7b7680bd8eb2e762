//! Injected dependencies of the scan session.

use crate::verifier::Verifier;
use checkin_core::environment::Clock;
use checkin_core::{Decoder, DecoderSettings};
use std::sync::Arc;

/// Dependencies and settings for [`SessionReducer`](super::SessionReducer).
#[derive(Clone)]
pub struct SessionEnvironment {
    /// Decision procedure
    pub verifier: Arc<Verifier>,
    /// Camera
    pub decoder: Arc<dyn Decoder>,
    /// Stamps decoded frames
    pub clock: Arc<dyn Clock>,
    /// Passed to every `Decoder::start`
    pub settings: DecoderSettings,
    /// Release the camera after each accepted code
    pub single_shot: bool,
}

impl SessionEnvironment {
    /// Continuous scanning with default decoder settings.
    #[must_use]
    pub fn new(verifier: Arc<Verifier>, decoder: Arc<dyn Decoder>, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            decoder,
            clock,
            settings: DecoderSettings::default(),
            single_shot: false,
        }
    }

    /// Override decoder settings.
    #[must_use]
    pub fn with_settings(mut self, settings: DecoderSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Enable or disable single-shot mode.
    #[must_use]
    pub const fn with_single_shot(mut self, single_shot: bool) -> Self {
        self.single_shot = single_shot;
        self
    }
}

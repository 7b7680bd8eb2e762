//! Camera decoder seam.
//!
//! Frame acquisition and barcode/QR decoding happen outside this workspace.
//! A [`Decoder`] turns a camera into a lazy stream of decoded strings, one per
//! successful frame read.

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while acquiring or driving the decoder.
#[derive(Error, Debug)]
pub enum DecoderError {
    /// The camera could not be opened (permission denied, no device, busy).
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// `start` was called while a previous start is still active.
    #[error("Decoder already started")]
    AlreadyStarted,

    /// Underlying I/O failure.
    #[error("Decoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A setting could not be parsed.
    #[error("Invalid decoder setting: {0}")]
    InvalidSetting(String),
}

/// Which camera to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraFacing {
    /// Rear camera (scanning someone else's ticket)
    #[default]
    Environment,
    /// Front camera
    User,
}

impl FromStr for CameraFacing {
    type Err = DecoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(Self::Environment),
            "user" | "front" => Ok(Self::User),
            other => Err(DecoderError::InvalidSetting(format!(
                "unknown camera facing '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CameraFacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => f.write_str("environment"),
            Self::User => f.write_str("user"),
        }
    }
}

/// Square-ish region of the frame the decoder looks at, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeRegion {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for DecodeRegion {
    fn default() -> Self {
        Self {
            width: 250,
            height: 250,
        }
    }
}

impl FromStr for DecodeRegion {
    type Err = DecoderError;

    /// Parses `WIDTHxHEIGHT`, e.g. `250x250`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DecoderError::InvalidSetting(format!("decode region '{s}'"));
        let (width, height) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = width.trim().parse().map_err(|_| invalid())?;
        let height: u32 = height.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for DecodeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters passed to [`Decoder::start`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderSettings {
    /// Camera to open
    pub camera_facing: CameraFacing,
    /// Frames per second to attempt decoding
    pub frame_rate: u32,
    /// Region of interest
    pub decode_region: DecodeRegion,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self {
            camera_facing: CameraFacing::Environment,
            frame_rate: 10,
            decode_region: DecodeRegion::default(),
        }
    }
}

/// Decoded text payloads, one per successful frame read.
///
/// The stream ends when the decoder is stopped or the camera goes away.
pub type DecodedStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// External barcode/QR decoding capability.
///
/// # Contract
///
/// - `start` is never called twice concurrently by the session controller;
///   implementations may return [`DecoderError::AlreadyStarted`] if it is.
/// - `stop` on a stopped decoder is a no-op.
pub trait Decoder: Send + Sync {
    /// Open the camera and begin decoding.
    ///
    /// # Errors
    ///
    /// Returns [`DecoderError::CameraUnavailable`] if the camera cannot be
    /// acquired.
    fn start<'a>(
        &'a self,
        settings: &'a DecoderSettings,
    ) -> Pin<Box<dyn Future<Output = Result<DecodedStream, DecoderError>> + Send + 'a>>;

    /// Release the camera. Ends the stream returned by `start`.
    fn stop(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_decode_region() {
        let region: DecodeRegion = "320x240".parse().unwrap();
        assert_eq!(region, DecodeRegion { width: 320, height: 240 });
        assert_eq!(region.to_string(), "320x240");

        assert!("0x10".parse::<DecodeRegion>().is_err());
        assert!("square".parse::<DecodeRegion>().is_err());
    }

    #[test]
    fn parses_camera_facing() {
        assert_eq!("Environment".parse::<CameraFacing>().unwrap(), CameraFacing::Environment);
        assert_eq!("front".parse::<CameraFacing>().unwrap(), CameraFacing::User);
        assert!("sideways".parse::<CameraFacing>().is_err());
    }

    #[test]
    fn default_settings_match_scanner_defaults() {
        let settings = DecoderSettings::default();
        assert_eq!(settings.frame_rate, 10);
        assert_eq!(settings.decode_region.to_string(), "250x250");
        assert_eq!(settings.camera_facing, CameraFacing::Environment);
    }
}

//! Camera platform seam.
//!
//! The controller never talks to a device API directly. It asks a
//! [`CameraPlatform`] for a [`MediaStream`] using one [`ConstraintCandidate`]
//! at a time and owns whatever stream comes back until it is stopped.

pub mod replay;

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

pub use replay::ReplayCamera;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    #[default]
    Environment,
    User,
    Any,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
            FacingMode::Any => "any",
        }
    }

    /// Whether a device facing `actual` satisfies a request for `self`.
    pub fn admits(&self, actual: FacingMode) -> bool {
        matches!(self, FacingMode::Any) || *self == actual
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "environment" | "env" | "back" | "rear" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            "any" => Ok(FacingMode::Any),
            other => Err(format!("unknown facing mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn fits_within(&self, other: &Resolution) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (w, h) = value
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
        let width = w.trim().parse::<u32>().map_err(|e| format!("bad width: {e}"))?;
        let height = h.trim().parse::<u32>().map_err(|e| format!("bad height: {e}"))?;
        if width == 0 || height == 0 {
            return Err("resolution must be non-zero".into());
        }
        Ok(Self { width, height })
    }
}

/// One camera request in an acquisition fallback chain.
///
/// `resolution`, `facing` and `frame_rate` are preferences unless
/// `require_exact` is set, in which case a platform that cannot honour them
/// must reject the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintCandidate {
    pub label: String,
    pub facing: FacingMode,
    pub resolution: Option<Resolution>,
    pub frame_rate: Option<u32>,
    pub require_exact: bool,
}

impl ConstraintCandidate {
    pub fn new(label: impl Into<String>, facing: FacingMode) -> Self {
        Self {
            label: label.into(),
            facing,
            resolution: None,
            frame_rate: None,
            require_exact: false,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(Resolution::new(width, height));
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn exact(mut self) -> Self {
        self.require_exact = true;
        self
    }

    /// The bare `{ video: true }` request: whatever camera the platform has.
    pub fn minimal() -> Self {
        Self::new("minimal", FacingMode::Any)
    }

    /// Default chain, most specific first.
    pub fn fallback_chain(preferred: FacingMode) -> Vec<ConstraintCandidate> {
        vec![
            ConstraintCandidate::new("full-hd", preferred)
                .with_resolution(1920, 1080)
                .with_frame_rate(30),
            ConstraintCandidate::new("hd", preferred).with_resolution(1280, 720),
            ConstraintCandidate::new("vga", FacingMode::Any).with_resolution(640, 480),
            ConstraintCandidate::minimal(),
        ]
    }
}

/// The configuration a platform actually granted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GrantedConstraints {
    pub candidate_index: usize,
    pub candidate: ConstraintCandidate,
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

/// Why a platform turned down a single acquisition request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AcquisitionReason {
    PermissionDenied,
    NoDevice,
    ConstraintsUnsupported,
    DeviceBusy,
}

impl AcquisitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionReason::PermissionDenied => "permission denied",
            AcquisitionReason::NoDevice => "no camera found",
            AcquisitionReason::ConstraintsUnsupported => "constraints not supported",
            AcquisitionReason::DeviceBusy => "camera busy",
        }
    }

    /// Text the UI can show the operator.
    pub fn troubleshooting_hint(&self) -> &'static str {
        match self {
            AcquisitionReason::PermissionDenied => {
                "Allow camera access for this app in the system settings and try again."
            }
            AcquisitionReason::NoDevice => "No camera was detected on this device.",
            AcquisitionReason::ConstraintsUnsupported => {
                "The camera does not support any of the requested modes."
            }
            AcquisitionReason::DeviceBusy => {
                "The camera is in use by another application. Close it and retry."
            }
        }
    }
}

impl fmt::Display for AcquisitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single RGBA8 video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("video track ended")]
    Ended,
}

/// A live camera stream owned by exactly one session.
pub trait MediaStream: Send + 'static {
    fn id(&self) -> &str;

    fn granted(&self) -> &GrantedConstraints;

    /// `Ok(None)` when the source has no new frame for this tick.
    fn grab_frame(&mut self) -> Result<Option<Frame>, FrameError>;

    fn supports_torch(&self) -> bool;

    fn set_torch(&mut self, on: bool) -> Result<(), String>;

    /// Stops every track and releases the device. Must be idempotent.
    ///
    /// The controller calls this on `stop()` and when it is dropped, even
    /// if the sampling task still holds the stream at that moment. Streams
    /// that wrap a real device should also release it in their own `Drop`.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

pub trait CameraPlatform: Send + Sync + 'static {
    type Stream: MediaStream;

    fn query_permission(&self) -> impl Future<Output = PermissionState> + Send;

    fn acquire(
        &self,
        candidate: &ConstraintCandidate,
        index: usize,
    ) -> impl Future<Output = Result<Self::Stream, AcquisitionReason>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_chain_ends_with_minimal_request() {
        let chain = ConstraintCandidate::fallback_chain(FacingMode::Environment);
        assert_eq!(chain.len(), 4);
        assert_eq!(chain[0].resolution, Some(Resolution::new(1920, 1080)));
        assert_eq!(chain[0].facing, FacingMode::Environment);
        let last = chain.last().unwrap();
        assert_eq!(last, &ConstraintCandidate::minimal());
        assert!(last.resolution.is_none());
    }

    #[test]
    fn parses_resolution_and_facing() {
        assert_eq!("640x480".parse::<Resolution>(), Ok(Resolution::new(640, 480)));
        assert!("640".parse::<Resolution>().is_err());
        assert!("0x480".parse::<Resolution>().is_err());
        assert_eq!("rear".parse::<FacingMode>(), Ok(FacingMode::Environment));
        assert_eq!("Front".parse::<FacingMode>(), Ok(FacingMode::User));
    }

    #[test]
    fn any_facing_admits_everything() {
        assert!(FacingMode::Any.admits(FacingMode::User));
        assert!(FacingMode::Environment.admits(FacingMode::Environment));
        assert!(!FacingMode::Environment.admits(FacingMode::User));
    }
}

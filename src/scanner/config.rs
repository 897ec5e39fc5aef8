use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::camera::{ConstraintCandidate, Resolution};
use crate::settings::ScannerPreferences;

/// What `start()` does when a session already owns the camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RestartPolicy {
    /// Keep the running session and hand back its handle.
    #[default]
    Ignore,
    /// Stop the running session, then acquire a fresh one.
    Restart,
}

/// Tunables for one scan controller.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Period of the sampling tick (one display refresh by default).
    pub frame_interval: Duration,

    /// Process every Nth tick. `1` decodes on every tick.
    pub frame_skip: u32,

    /// Window during which a repeated payload is not reported again.
    pub cooldown: Duration,

    /// Downscale frames larger than this before decoding.
    pub decode_size: Option<Resolution>,

    pub restart_policy: RestartPolicy,

    /// Used when `start()` is given an empty list. Empty here means the
    /// built-in fallback chain for the requested facing mode.
    pub candidates: Vec<ConstraintCandidate>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            frame_skip: 2,
            cooldown: Duration::from_millis(1500),
            decode_size: None,
            restart_policy: RestartPolicy::Ignore,
            candidates: Vec::new(),
        }
    }
}

impl ScannerConfig {
    pub fn from_preferences(preferences: &ScannerPreferences) -> Self {
        Self {
            frame_skip: preferences.frame_skip.max(1),
            cooldown: Duration::from_millis(preferences.cooldown_ms),
            ..Self::default()
        }
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        self
    }

    pub fn with_frame_skip(mut self, frame_skip: u32) -> Self {
        self.frame_skip = frame_skip.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_decode_size(mut self, decode_size: Option<Resolution>) -> Self {
        self.decode_size = decode_size;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<ConstraintCandidate>) -> Self {
        self.candidates = candidates;
        self
    }
}

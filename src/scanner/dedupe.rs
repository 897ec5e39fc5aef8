use std::time::Duration;

use tokio::time::Instant;

/// Suppresses repeat reads of the same code while it stays in view.
///
/// A payload equal to the last accepted one is rejected until `cooldown`
/// has passed since that acceptance. Any different payload is accepted
/// immediately and becomes the new reference.
#[derive(Debug, Clone)]
pub struct DuplicateFilter {
    cooldown: Duration,
    last_value: Option<String>,
    last_at: Option<Instant>,
}

impl DuplicateFilter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_value: None,
            last_at: None,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_value(&self) -> Option<&str> {
        self.last_value.as_deref()
    }

    pub fn last_at(&self) -> Option<Instant> {
        self.last_at
    }

    pub fn is_duplicate(&self, payload: &str, now: Instant) -> bool {
        match (&self.last_value, self.last_at) {
            (Some(last), Some(at)) if last == payload => {
                now.saturating_duration_since(at) < self.cooldown
            }
            _ => false,
        }
    }

    /// Returns `true` and records the payload when it should be reported.
    pub fn accept(&mut self, payload: &str, now: Instant) -> bool {
        if self.is_duplicate(payload, now) {
            return false;
        }
        self.last_value = Some(payload.to_string());
        self.last_at = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_value = None;
        self.last_at = None;
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::camera::{FacingMode, GrantedConstraints};
use crate::decoder::DecodeResult;

use super::dedupe::DuplicateFilter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScanState {
    #[default]
    Idle,
    Acquiring,
    Active,
    Paused,
    Stopped,
}

impl ScanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Acquiring => "Acquiring",
            ScanState::Active => "Active",
            ScanState::Paused => "Paused",
            ScanState::Stopped => "Stopped",
        }
    }

    /// A session in this state owns a live camera stream.
    pub fn holds_stream(&self) -> bool {
        matches!(self, ScanState::Active | ScanState::Paused)
    }
}

/// What happened to a decoded payload at the acceptance gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Accepted(DecodeResult),
    Duplicate,
    NotActive,
}

/// One camera-to-decode lifecycle.
#[derive(Debug)]
pub struct ScanSession {
    id: String,
    state: ScanState,
    preferred_facing: FacingMode,
    stream_id: Option<String>,
    granted: Option<GrantedConstraints>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    torch_on: bool,
    accepted_count: u64,
    filter: DuplicateFilter,
}

impl ScanSession {
    pub fn new(preferred_facing: FacingMode, cooldown: Duration) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: ScanState::Idle,
            preferred_facing,
            stream_id: None,
            granted: None,
            started_at: None,
            stopped_at: None,
            torch_on: false,
            accepted_count: 0,
            filter: DuplicateFilter::new(cooldown),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn granted(&self) -> Option<&GrantedConstraints> {
        self.granted.as_ref()
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub fn set_torch(&mut self, on: bool) {
        self.torch_on = on;
    }

    pub fn begin_acquiring(&mut self) -> bool {
        if self.state != ScanState::Idle {
            return false;
        }
        self.state = ScanState::Acquiring;
        true
    }

    pub fn acquisition_failed(&mut self) {
        if self.state == ScanState::Acquiring {
            self.state = ScanState::Idle;
        }
    }

    pub fn activate(&mut self, stream_id: String, granted: GrantedConstraints, at: DateTime<Utc>) {
        self.stream_id = Some(stream_id);
        self.granted = Some(granted);
        self.started_at = Some(at);
        self.state = ScanState::Active;
    }

    /// Returns `true` if the state changed.
    pub fn pause(&mut self) -> bool {
        if self.state != ScanState::Active {
            return false;
        }
        self.state = ScanState::Paused;
        true
    }

    /// Returns `true` if the state changed.
    pub fn resume(&mut self) -> bool {
        if self.state != ScanState::Paused {
            return false;
        }
        self.state = ScanState::Active;
        true
    }

    /// Returns `true` if the state changed.
    pub fn stop(&mut self, at: DateTime<Utc>) -> bool {
        if self.state == ScanState::Stopped {
            return false;
        }
        self.state = ScanState::Stopped;
        self.stopped_at = Some(at);
        self.torch_on = false;
        true
    }

    /// Acceptance gate for a decoded payload. Only an `Active` session
    /// reports, and only payloads the duplicate filter lets through.
    pub fn admit(&mut self, payload: String, now: Instant, timestamp: DateTime<Utc>) -> Admission {
        if self.state != ScanState::Active {
            return Admission::NotActive;
        }
        if !self.filter.accept(&payload, now) {
            return Admission::Duplicate;
        }
        self.accepted_count += 1;
        Admission::Accepted(DecodeResult::new(payload, timestamp))
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            session_id: self.id.clone(),
            state: self.state,
            preferred_facing: self.preferred_facing,
            stream_id: self.stream_id.clone(),
            granted: self.granted.clone(),
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            torch_on: self.torch_on,
            accepted_count: self.accepted_count,
            last_decoded_value: self.filter.last_value().map(str::to_string),
            cooldown_ms: self.filter.cooldown().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub session_id: String,
    pub state: ScanState,
    pub preferred_facing: FacingMode,
    pub stream_id: Option<String>,
    pub granted: Option<GrantedConstraints>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub torch_on: bool,
    pub accepted_count: u64,
    pub last_decoded_value: Option<String>,
    pub cooldown_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ConstraintCandidate;

    fn granted() -> GrantedConstraints {
        GrantedConstraints {
            candidate_index: 0,
            candidate: ConstraintCandidate::minimal(),
            width: 640,
            height: 480,
            facing: FacingMode::Environment,
        }
    }

    fn active_session() -> ScanSession {
        let mut session = ScanSession::new(FacingMode::Environment, Duration::from_millis(500));
        assert!(session.begin_acquiring());
        session.activate("stream-1".into(), granted(), Utc::now());
        session
    }

    #[test]
    fn failed_acquisition_returns_to_idle() {
        let mut session = ScanSession::new(FacingMode::Any, Duration::from_millis(500));
        assert!(session.begin_acquiring());
        assert!(!session.begin_acquiring());
        session.acquisition_failed();
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let mut session = active_session();
        assert!(session.pause());
        assert!(!session.pause());
        assert_eq!(session.state(), ScanState::Paused);
        assert!(session.resume());
        assert!(!session.resume());
        assert_eq!(session.state(), ScanState::Active);
        assert_eq!(session.stream_id(), Some("stream-1"));
    }

    #[test]
    fn stopped_is_terminal() {
        let mut session = active_session();
        assert!(session.stop(Utc::now()));
        assert!(!session.stop(Utc::now()));
        assert!(!session.resume());
        assert!(!session.pause());
        assert!(!session.begin_acquiring());
        assert_eq!(session.state(), ScanState::Stopped);
    }

    #[test]
    fn gate_rejects_unless_active() {
        let now = Instant::now();
        let mut session = active_session();

        session.pause();
        assert_eq!(session.admit("BAG-001".into(), now, Utc::now()), Admission::NotActive);

        session.resume();
        assert!(matches!(
            session.admit("BAG-001".into(), now, Utc::now()),
            Admission::Accepted(_)
        ));
        assert_eq!(
            session.admit("BAG-001".into(), now + Duration::from_millis(10), Utc::now()),
            Admission::Duplicate
        );

        session.stop(Utc::now());
        assert_eq!(
            session.admit("BAG-002".into(), now, Utc::now()),
            Admission::NotActive
        );
        assert_eq!(session.snapshot().accepted_count, 1);
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let session = active_session();
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["state"], "active");
        assert_eq!(json["cooldownMs"], 500);
        assert_eq!(json["granted"]["candidateIndex"], 0);
    }
}

use std::fmt;

use serde::Serialize;

use crate::camera::AcquisitionReason;

/// One rejected request in the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateAttempt {
    pub index: usize,
    pub label: String,
    pub reason: AcquisitionReason,
}

/// Every candidate was tried and none produced a stream.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("camera acquisition failed: {reason} ({} candidate(s) tried)", .attempts.len())]
pub struct AcquisitionError {
    pub reason: AcquisitionReason,
    pub attempts: Vec<CandidateAttempt>,
}

impl AcquisitionError {
    /// Collapses the per-candidate rejections into the one the operator
    /// needs to act on: a permission denial anywhere in the chain wins,
    /// otherwise the verdict on the most permissive (last) request.
    pub fn from_attempts(attempts: Vec<CandidateAttempt>) -> Self {
        let reason = if attempts
            .iter()
            .any(|a| a.reason == AcquisitionReason::PermissionDenied)
        {
            AcquisitionReason::PermissionDenied
        } else {
            attempts
                .last()
                .map(|a| a.reason)
                .unwrap_or(AcquisitionReason::ConstraintsUnsupported)
        };
        Self { reason, attempts }
    }

    pub fn permission_denied() -> Self {
        Self {
            reason: AcquisitionReason::PermissionDenied,
            attempts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Torch,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Torch => f.write_str("torch"),
        }
    }
}

/// Optional camera controls. Never fatal to a session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("stream has no {0} control")]
    Unsupported(Capability),
    #[error("no active camera stream")]
    NoActiveStream,
    #[error("failed to apply {capability}: {message}")]
    ApplyFailed {
        capability: Capability,
        message: String,
    },
}

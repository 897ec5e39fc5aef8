//! Journal rows for scan sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::ScanSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanSessionStatus {
    /// Holding the camera (active or paused).
    Active,
    Completed,
    /// Left `Active` by a process that never stopped it.
    Interrupted,
}

impl ScanSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSessionStatus::Active => "Active",
            ScanSessionStatus::Completed => "Completed",
            ScanSessionStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSessionRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: ScanSessionStatus,
    pub facing: String,
    pub constraint_label: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub accepted_count: u64,
    pub torch_used: bool,
}

impl ScanSessionRecord {
    /// Row for a session that has just gone active.
    pub fn from_snapshot(snapshot: &ScanSnapshot) -> Self {
        let granted = snapshot.granted.as_ref();
        Self {
            id: snapshot.session_id.clone(),
            started_at: snapshot.started_at.unwrap_or_else(Utc::now),
            stopped_at: None,
            status: ScanSessionStatus::Active,
            facing: granted
                .map(|g| g.facing)
                .unwrap_or(snapshot.preferred_facing)
                .as_str()
                .to_string(),
            constraint_label: granted.map(|g| g.candidate.label.clone()),
            width: granted.map(|g| g.width),
            height: granted.map(|g| g.height),
            accepted_count: snapshot.accepted_count,
            torch_used: snapshot.torch_on,
        }
    }
}

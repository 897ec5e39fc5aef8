use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted decode, as written by the journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: i64,
    pub session_id: String,
    pub payload: String,
    pub decoded_at: DateTime<Utc>,
}

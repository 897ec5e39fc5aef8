use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u32, to_u64},
    models::{ScanSessionRecord, ScanSessionStatus},
    Database,
};

const SESSION_COLUMNS: &str = "id, started_at, stopped_at, status, facing, constraint_label, \
                               width, height, accepted_count, torch_used";

fn row_to_session(row: &Row) -> Result<ScanSessionRecord> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let status: String = row.get("status")?;
    let accepted_count: i64 = row.get("accepted_count")?;

    Ok(ScanSessionRecord {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        facing: row.get("facing")?,
        constraint_label: row.get("constraint_label")?,
        width: to_u32(row.get("width")?, "width")?,
        height: to_u32(row.get("height")?, "height")?,
        accepted_count: to_u64(accepted_count, "accepted_count")?,
        torch_used: row.get("torch_used")?,
    })
}

impl Database {
    pub async fn insert_scan_session(&self, session: &ScanSessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO scan_sessions (id, started_at, stopped_at, status, facing, constraint_label, width, height, accepted_count, torch_used)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    record.facing,
                    record.constraint_label,
                    record.width,
                    record.height,
                    to_i64(record.accepted_count)?,
                    record.torch_used,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Closes a session. `accepted_count` is the controller's own tally.
    pub async fn finish_scan_session(
        &self,
        session_id: &str,
        status: ScanSessionStatus,
        stopped_at: DateTime<Utc>,
        accepted_count: u64,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE scan_sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     accepted_count = ?3
                 WHERE id = ?4",
                params![
                    status.as_str(),
                    stopped_at.to_rfc3339(),
                    to_i64(accepted_count)?,
                    session_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn mark_torch_used(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE scan_sessions SET torch_used = 1 WHERE id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_scan_session(&self, session_id: &str) -> Result<Option<ScanSessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM scan_sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let row = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?;
            row.transpose()
        })
        .await
    }

    /// Most recent sessions first.
    pub async fn list_scan_sessions(&self, limit: usize) -> Result<Vec<ScanSessionRecord>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM scan_sessions ORDER BY started_at DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Startup recovery: anything still `Active` belongs to a process that
    /// died holding the camera.
    pub async fn mark_active_sessions_interrupted(&self, at: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE scan_sessions
                 SET status = ?1,
                     stopped_at = COALESCE(stopped_at, ?2)
                 WHERE status = ?3",
                params![
                    ScanSessionStatus::Interrupted.as_str(),
                    at.to_rfc3339(),
                    ScanSessionStatus::Active.as_str(),
                ],
            )?;
            Ok(updated)
        })
        .await
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::db::{helpers::parse_datetime, models::ScanRecord, Database};

impl Database {
    /// Appends an accepted decode and bumps the session's tally.
    pub async fn insert_scan(
        &self,
        session_id: &str,
        payload: &str,
        decoded_at: DateTime<Utc>,
    ) -> Result<i64> {
        let session_id = session_id.to_string();
        let payload = payload.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO scans (session_id, payload, decoded_at) VALUES (?1, ?2, ?3)",
                params![session_id, payload, decoded_at.to_rfc3339()],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE scan_sessions SET accepted_count = accepted_count + 1 WHERE id = ?1",
                params![session_id],
            )?;
            tx.commit()?;
            Ok(id)
        })
        .await
    }

    pub async fn scans_for_session(&self, session_id: &str) -> Result<Vec<ScanRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, payload, decoded_at
                 FROM scans
                 WHERE session_id = ?1
                 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut scans = Vec::new();
            while let Some(row) = rows.next()? {
                let decoded_at: String = row.get(3)?;
                scans.push(ScanRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    payload: row.get(2)?,
                    decoded_at: parse_datetime(&decoded_at, "decoded_at")?,
                });
            }
            Ok(scans)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ScanSessionRecord, ScanSessionStatus};

    #[tokio::test]
    async fn scans_are_returned_in_insert_order_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.db")).unwrap();
        let started_at = Utc::now();
        db.insert_scan_session(&ScanSessionRecord {
            id: "s1".into(),
            started_at,
            stopped_at: None,
            status: ScanSessionStatus::Active,
            facing: "environment".into(),
            constraint_label: None,
            width: None,
            height: None,
            accepted_count: 0,
            torch_used: false,
        })
        .await
        .unwrap();

        db.insert_scan("s1", "BAG-002", started_at).await.unwrap();
        db.insert_scan("s1", "BAG-001", started_at).await.unwrap();

        let payloads: Vec<String> = db
            .scans_for_session("s1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.payload)
            .collect();
        assert_eq!(payloads, vec!["BAG-002", "BAG-001"]);
        let session = db.get_scan_session("s1").await.unwrap().unwrap();
        assert_eq!(session.accepted_count, 2);
    }

    #[tokio::test]
    async fn scan_for_unknown_session_violates_foreign_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("journal.db")).unwrap();
        assert!(db.insert_scan("ghost", "BAG-001", Utc::now()).await.is_err());
    }
}

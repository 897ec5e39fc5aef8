//! Persists scan sessions and accepted scans without blocking the
//! sampling loop. Observer callbacks only enqueue; one writer task drains
//! the queue in order.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{Database, ScanSessionRecord, ScanSessionStatus};
use crate::decoder::DecodeResult;
use crate::scanner::{ScanObserver, ScanSnapshot, ScanState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info};

#[derive(Debug)]
enum JournalEvent {
    State(ScanSnapshot),
    Decoded {
        session_id: String,
        payload: String,
        decoded_at: DateTime<Utc>,
    },
    TorchOn {
        session_id: String,
    },
}

pub struct JournalObserver {
    tx: mpsc::UnboundedSender<JournalEvent>,
}

impl JournalObserver {
    /// Starts the writer. It runs until every clone of the observer is
    /// dropped, so await the handle after the controller is gone to flush.
    pub fn spawn(db: Database) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_events(db, rx));
        (Self { tx }, handle)
    }

    fn send(&self, event: JournalEvent) {
        if self.tx.send(event).is_err() {
            log_error!("journal writer is gone; dropping event");
        }
    }
}

impl ScanObserver for JournalObserver {
    fn on_decoded(&self, session_id: &str, result: &DecodeResult) {
        self.send(JournalEvent::Decoded {
            session_id: session_id.to_string(),
            payload: result.payload.clone(),
            decoded_at: result.timestamp,
        });
    }

    fn on_state_changed(&self, snapshot: &ScanSnapshot) {
        if matches!(snapshot.state, ScanState::Active | ScanState::Stopped) {
            self.send(JournalEvent::State(snapshot.clone()));
        }
    }

    fn on_torch_changed(&self, session_id: &str, on: bool) {
        if on {
            self.send(JournalEvent::TorchOn {
                session_id: session_id.to_string(),
            });
        }
    }
}

async fn write_events(db: Database, mut rx: mpsc::UnboundedReceiver<JournalEvent>) {
    // Sessions that already have a row; a resume re-emits Active.
    let mut recorded: HashSet<String> = HashSet::new();

    while let Some(event) = rx.recv().await {
        let result = match event {
            JournalEvent::State(snapshot) => match snapshot.state {
                ScanState::Active if recorded.insert(snapshot.session_id.clone()) => {
                    db.insert_scan_session(&ScanSessionRecord::from_snapshot(&snapshot))
                        .await
                }
                ScanState::Stopped if recorded.contains(&snapshot.session_id) => {
                    db.finish_scan_session(
                        &snapshot.session_id,
                        ScanSessionStatus::Completed,
                        snapshot.stopped_at.unwrap_or_else(Utc::now),
                        snapshot.accepted_count,
                    )
                    .await
                }
                _ => Ok(()),
            },
            JournalEvent::Decoded {
                session_id,
                payload,
                decoded_at,
            } => db
                .insert_scan(&session_id, &payload, decoded_at)
                .await
                .map(|_| ()),
            JournalEvent::TorchOn { session_id } => db.mark_torch_used(&session_id).await,
        };

        if let Err(err) = result {
            log_error!("failed to write scan journal: {err:#}");
        }
    }

    log_info!("scan journal writer finished");
}

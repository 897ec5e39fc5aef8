pub mod camera;
mod cli;
pub mod db;
pub mod decoder;
pub mod journal;
pub mod metrics;
pub mod scanner;
pub mod settings;
mod utils;

use std::path::Path;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use camera::ReplayCamera;
use cli::{Cli, Command, HistoryArgs, ScanArgs};
use db::Database;
use decoder::{DecodeResult, QrDecoder};
use journal::JournalObserver;
use scanner::{ObserverSet, ScanController, ScanObserver, ScanSnapshot, ScanState, ScannerConfig};
use settings::{ScannerPreferences, SettingsStore};

const ENABLE_LOGS: bool = true;

const SETTINGS_FILE: &str = "settings.json";
const JOURNAL_FILE: &str = "bagscan.sqlite3";

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Scan(args) => scan(args, &cli.data_dir).await,
            Command::History(args) => history(args, &cli.data_dir).await,
        }
    })
}

/// Finalizes sessions that were still holding the camera when the last
/// process died.
async fn recover_interrupted(db: &Database) -> Result<()> {
    let interrupted = db.mark_active_sessions_interrupted(Utc::now()).await?;
    if interrupted > 0 {
        log_warn!("Recovered {interrupted} incomplete scan session(s); marked as Interrupted");
    }
    Ok(())
}

/// Prints accepted scans and tells the CLI when to wind down.
struct ConsoleObserver {
    accepted: AtomicUsize,
    max_scans: Option<usize>,
    done: Arc<Notify>,
}

impl ScanObserver for ConsoleObserver {
    fn on_decoded(&self, _session_id: &str, result: &DecodeResult) {
        println!("{}\t{}", result.timestamp.to_rfc3339(), result.payload);
        let accepted = self.accepted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_scans.is_some_and(|max| accepted >= max) {
            self.done.notify_one();
        }
    }

    fn on_state_changed(&self, snapshot: &ScanSnapshot) {
        if snapshot.state == ScanState::Stopped {
            self.done.notify_one();
        }
    }
}

/// Saved preferences with this run's command-line overrides applied.
fn merge_preferences(saved: &ScannerPreferences, args: &ScanArgs) -> ScannerPreferences {
    ScannerPreferences {
        cooldown_ms: args.cooldown_ms.unwrap_or(saved.cooldown_ms),
        frame_skip: args.frame_skip.unwrap_or(saved.frame_skip),
        preferred_facing: args.facing.unwrap_or(saved.preferred_facing),
    }
}

async fn scan(args: ScanArgs, data_dir: &Path) -> Result<()> {
    let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);
    let db = Database::new(data_dir.join(JOURNAL_FILE))?;
    recover_interrupted(&db).await?;

    let preferences = merge_preferences(&settings.scanner_preferences(), &args);
    if args.save_preferences {
        settings.update_scanner_preferences(preferences.clone())?;
        log_info!("Saved scanner preferences to {}", settings.path().display());
    }

    let mut config = ScannerConfig::from_preferences(&preferences)
        .with_decode_size(args.decode_size);
    if let Some(fps) = args.fps {
        config = config.with_frame_rate(fps);
    }
    let facing = preferences.preferred_facing;

    let camera = ReplayCamera::new(&args.source)
        .with_torch(args.torch)
        .looping(!args.once);

    let done = Arc::new(Notify::new());
    let (journal, journal_writer) = JournalObserver::spawn(db.clone());
    let observers = ObserverSet::new()
        .with(Arc::new(ConsoleObserver {
            accepted: AtomicUsize::new(0),
            max_scans: args.max_scans,
            done: Arc::clone(&done),
        }))
        .with(Arc::new(journal));

    let mut controller = ScanController::new(
        camera,
        QrDecoder::new(),
        config,
        settings,
        Arc::new(observers),
    );

    let started = controller.start(facing, Vec::new()).await;
    let handle = match started {
        Ok(handle) => handle,
        Err(err) => {
            log_error!("{}", err.reason.troubleshooting_hint());
            drop(controller);
            if let Err(join_err) = finish_journal(journal_writer).await {
                log_error!("{join_err:#}");
            }
            return Err(err.into());
        }
    };
    log_info!(
        "Scanning {} with '{}' at {}x{}",
        args.source.display(),
        handle.granted.candidate.label,
        handle.granted.width,
        handle.granted.height
    );

    if args.torch {
        if let Err(err) = controller.toggle_torch().await {
            log_warn!("Torch unavailable: {err}");
        }
    }

    tokio::select! {
        _ = done.notified() => {}
        _ = wait_for(args.timeout_secs.map(Duration::from_secs)) => {
            log_info!("Timeout reached");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                log_error!("Failed to listen for ctrl-c: {err}");
            }
        }
    }

    controller.stop().await;

    let metrics = controller.metrics_snapshot().await;
    match serde_json::to_string(&metrics.counters) {
        Ok(counters) => log_info!("Session counters: {counters}"),
        Err(err) => log_warn!("Failed to serialize counters: {err}"),
    }

    drop(controller);
    finish_journal(journal_writer).await
}

/// Waits for the journal writer to drain. Every observer holding its
/// sender must already be dropped.
async fn finish_journal(writer: JoinHandle<()>) -> Result<()> {
    writer.await.context("scan journal writer panicked")
}

async fn wait_for(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

async fn history(args: HistoryArgs, data_dir: &Path) -> Result<()> {
    let db = Database::new(data_dir.join(JOURNAL_FILE))?;
    let sessions = db.list_scan_sessions(args.limit).await?;
    if sessions.is_empty() {
        println!("No scan sessions recorded in {}", db.path().display());
        return Ok(());
    }

    for session in sessions {
        let stopped = session
            .stopped_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{} scan(s)\t{}",
            session.id,
            session.status.as_str(),
            session.started_at.to_rfc3339(),
            stopped,
            session.accepted_count,
            session.constraint_label.as_deref().unwrap_or("-"),
        );
        if args.scans {
            for scan in db.scans_for_session(&session.id).await? {
                println!("    {}\t{}", scan.decoded_at.to_rfc3339(), scan.payload);
            }
        }
    }
    Ok(())
}

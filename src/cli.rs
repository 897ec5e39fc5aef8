use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::camera::{FacingMode, Resolution};

#[derive(Parser, Debug)]
#[command(name = "bagscan")]
#[command(version)]
#[command(about = "Scans bag QR codes from a camera feed and journals every accepted read")]
pub struct Cli {
    /// Where settings.json and the scan journal live
    #[arg(long, global = true, env = "BAGSCAN_DATA_DIR", default_value = ".bagscan")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scan session against a directory of frames
    Scan(ScanArgs),
    /// List recorded scan sessions
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory of images replayed as camera frames
    #[arg(long)]
    pub source: PathBuf,

    /// Overrides the saved cooldown
    #[arg(long)]
    pub cooldown_ms: Option<u64>,

    /// Overrides the saved frame skip
    #[arg(long)]
    pub frame_skip: Option<u32>,

    /// environment, user or any; overrides the saved preference
    #[arg(long)]
    pub facing: Option<FacingMode>,

    /// Downscale frames above this size (e.g. 640x480) before decoding
    #[arg(long)]
    pub decode_size: Option<Resolution>,

    /// Sampling rate in ticks per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Replayed camera exposes a torch
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub torch: bool,

    /// End the stream after the last frame instead of looping
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub once: bool,

    /// Persist cooldown, frame skip and facing overrides as the new defaults
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub save_preferences: bool,

    /// Stop after this many accepted scans
    #[arg(long)]
    pub max_scans: Option<usize>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Also print each session's scans
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub scans: bool,
}

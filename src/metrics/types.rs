use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing of one decode attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeTiming {
    pub timestamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub decode_ms: f64,
    pub hit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanCounters {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub frames_sampled: u64,
    pub frames_not_ready: u64,
    pub malformed_frames: u64,
    pub decode_hits: u64,
    pub accepted: u64,
    pub duplicates_suppressed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub counters: ScanCounters,
    pub recent_decodes: Vec<DecodeTiming>,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            system: SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            },
            counters: ScanCounters::default(),
            recent_decodes: Vec::new(),
        }
    }
}

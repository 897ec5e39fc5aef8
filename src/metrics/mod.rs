mod types;

pub use types::{DecodeTiming, MetricsSnapshot, ScanCounters, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_DECODES: usize = 20;

/// What happened on one sampling tick, as far as metrics are concerned.
#[derive(Debug, Clone)]
pub enum MetricEvent {
    Skipped,
    NotReady,
    Malformed,
    Decoded(DecodeTiming),
    Accepted,
    Duplicate,
}

pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_decodes: Vec<DecodeTiming>,
    counters: ScanCounters,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // Initial refresh to establish baseline for CPU calculation
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_decodes: Vec::with_capacity(MAX_RECENT_DECODES),
                counters: ScanCounters::default(),
                system,
                pid,
            })),
        }
    }

    pub async fn record(&self, event: MetricEvent) {
        let mut guard = self.inner.lock().await;
        let state = &mut *guard;
        let counters = &mut state.counters;

        match event {
            MetricEvent::Skipped => {
                counters.ticks += 1;
                counters.skipped_ticks += 1;
            }
            MetricEvent::NotReady => {
                counters.ticks += 1;
                counters.frames_not_ready += 1;
            }
            MetricEvent::Malformed => {
                counters.ticks += 1;
                counters.malformed_frames += 1;
            }
            MetricEvent::Decoded(timing) => {
                counters.ticks += 1;
                counters.frames_sampled += 1;
                if timing.hit {
                    counters.decode_hits += 1;
                }
                state.recent_decodes.push(timing);
                if state.recent_decodes.len() > MAX_RECENT_DECODES {
                    state.recent_decodes.remove(0);
                }
            }
            MetricEvent::Accepted => counters.accepted += 1,
            MetricEvent::Duplicate => counters.duplicates_suppressed += 1,
        }
    }

    pub async fn counters(&self) -> ScanCounters {
        self.inner.lock().await.counters.clone()
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        // Refresh to get current CPU/RAM
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system_metrics = if let Some(process) = state.system.process(pid) {
            SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            }
        } else {
            SystemMetrics {
                cpu_percent: 0.0,
                memory_mb: 0.0,
            }
        };

        MetricsSnapshot {
            system: system_metrics,
            counters: state.counters.clone(),
            recent_decodes: state.recent_decodes.clone(),
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_decodes.clear();
        state.counters = ScanCounters::default();
        // Re-establish baseline for CPU after reset
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

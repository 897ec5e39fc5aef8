use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::camera::{Frame, FrameError, MediaStream, Resolution};
use crate::decoder::{FrameBuffer, FrameDecoder};
use crate::metrics::{DecodeTiming, MetricEvent, MetricsCollector};

use super::observer::ScanObserver;
use super::state::{Admission, ScanSession};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Result of handing one tick to the worker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TickOutcome {
    NotReady,
    Malformed(String),
    Miss { width: u32, height: u32, decode_ms: f64 },
    Hit { payload: String, width: u32, height: u32, decode_ms: f64 },
    Ended,
}

/// Per-session sampling state: frame-skip counter, off-screen buffer and
/// the decoder. Knows nothing about time or locking so it can be driven
/// frame by frame.
pub(crate) struct SamplingWorker<D> {
    decoder: Arc<D>,
    buffer: FrameBuffer,
    frame_skip: u64,
    tick: u64,
}

impl<D: FrameDecoder> SamplingWorker<D> {
    pub(crate) fn new(decoder: Arc<D>, frame_skip: u32, decode_size: Option<Resolution>) -> Self {
        Self {
            decoder,
            buffer: FrameBuffer::new(decode_size),
            frame_skip: u64::from(frame_skip.max(1)),
            tick: 0,
        }
    }

    /// Advances the tick counter; `true` on every `frame_skip`-th tick.
    pub(crate) fn should_sample(&mut self) -> bool {
        self.tick = self.tick.wrapping_add(1);
        self.tick % self.frame_skip == 0
    }

    pub(crate) fn process(&mut self, grabbed: Result<Option<Frame>, FrameError>) -> TickOutcome {
        let frame = match grabbed {
            Ok(Some(frame)) => frame,
            Ok(None) => return TickOutcome::NotReady,
            Err(FrameError::Ended) => return TickOutcome::Ended,
            Err(FrameError::Malformed(reason)) => return TickOutcome::Malformed(reason),
        };

        let image = match self.buffer.load(&frame) {
            Ok(image) => image,
            Err(err) => return TickOutcome::Malformed(err.to_string()),
        };
        let (width, height) = image.dimensions();

        let decode_start = std::time::Instant::now();
        let decoded = self.decoder.decode(image);
        let decode_ms = decode_start.elapsed().as_secs_f64() * 1000.0;

        match decoded {
            Some(payload) => TickOutcome::Hit {
                payload,
                width,
                height,
                decode_ms,
            },
            None => TickOutcome::Miss {
                width,
                height,
                decode_ms,
            },
        }
    }
}

pub(crate) struct LoopContext<S, D> {
    pub session: Arc<Mutex<ScanSession>>,
    pub stream: Arc<Mutex<S>>,
    pub worker: SamplingWorker<D>,
    pub observer: Arc<dyn ScanObserver>,
    pub metrics: MetricsCollector,
    pub frame_interval: Duration,
}

pub(crate) async fn sampling_loop<S, D>(
    mut ctx: LoopContext<S, D>,
    cancel_token: CancellationToken,
    mut pause_rx: watch::Receiver<bool>,
) where
    S: MediaStream,
    D: FrameDecoder,
{
    let mut ticker = tokio::time::interval(ctx.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *pause_rx.borrow_and_update() {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                changed = pause_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                    continue;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if !ctx.worker.should_sample() {
            ctx.metrics.record(MetricEvent::Skipped).await;
            continue;
        }

        let grabbed = {
            let mut stream = ctx.stream.lock().await;
            stream.grab_frame()
        };

        match ctx.worker.process(grabbed) {
            TickOutcome::NotReady => ctx.metrics.record(MetricEvent::NotReady).await,
            TickOutcome::Malformed(reason) => {
                log_debug!("dropping malformed frame: {reason}");
                ctx.metrics.record(MetricEvent::Malformed).await;
            }
            TickOutcome::Miss {
                width,
                height,
                decode_ms,
            } => {
                ctx.metrics
                    .record(MetricEvent::Decoded(DecodeTiming {
                        timestamp: Utc::now(),
                        width,
                        height,
                        decode_ms,
                        hit: false,
                    }))
                    .await;
            }
            TickOutcome::Hit {
                payload,
                width,
                height,
                decode_ms,
            } => {
                let timestamp = Utc::now();
                ctx.metrics
                    .record(MetricEvent::Decoded(DecodeTiming {
                        timestamp,
                        width,
                        height,
                        decode_ms,
                        hit: true,
                    }))
                    .await;

                // A stop that landed while we were decoding wins.
                if cancel_token.is_cancelled() {
                    break;
                }

                let admission = {
                    let mut session = ctx.session.lock().await;
                    let admission = session.admit(payload, Instant::now(), timestamp);
                    if let Admission::Accepted(result) = &admission {
                        ctx.observer.on_decoded(session.id(), result);
                    }
                    admission
                };

                match admission {
                    Admission::Accepted(result) => {
                        log_info!("accepted scan '{}'", result.payload);
                        ctx.metrics.record(MetricEvent::Accepted).await;
                    }
                    Admission::Duplicate => ctx.metrics.record(MetricEvent::Duplicate).await,
                    Admission::NotActive => {}
                }
            }
            TickOutcome::Ended => {
                log_warn!("video track ended; releasing camera");
                end_session(&ctx).await;
                break;
            }
        }
    }

    log_info!("sampling loop shutting down");
}

async fn end_session<S, D>(ctx: &LoopContext<S, D>)
where
    S: MediaStream,
    D: FrameDecoder,
{
    {
        let mut session = ctx.session.lock().await;
        if session.stop(Utc::now()) {
            ctx.observer.on_state_changed(&session.snapshot());
        }
    }
    ctx.stream.lock().await.stop_tracks();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::test_support::ScriptedDecoder;

    fn frame() -> Frame {
        Frame::new(2, 2, vec![128; 16])
    }

    #[test]
    fn frame_skip_samples_every_nth_tick() {
        let decoder = Arc::new(ScriptedDecoder::always(None));
        let mut worker = SamplingWorker::new(decoder, 3, None);
        let sampled: Vec<bool> = (0..7).map(|_| worker.should_sample()).collect();
        assert_eq!(sampled, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn frame_skip_of_one_samples_every_tick() {
        let decoder = Arc::new(ScriptedDecoder::always(None));
        let mut worker = SamplingWorker::new(decoder, 0, None);
        assert!((0..5).all(|_| worker.should_sample()));
    }

    #[test]
    fn classifies_tick_outcomes() {
        let decoder = Arc::new(ScriptedDecoder::sequence(vec![None, Some("BAG-001")]));
        let mut worker = SamplingWorker::new(Arc::clone(&decoder), 1, None);

        assert_eq!(worker.process(Ok(None)), TickOutcome::NotReady);
        assert_eq!(worker.process(Err(FrameError::Ended)), TickOutcome::Ended);
        assert!(matches!(
            worker.process(Ok(Some(Frame::new(2, 2, vec![0; 3])))),
            TickOutcome::Malformed(_)
        ));
        assert!(matches!(worker.process(Ok(Some(frame()))), TickOutcome::Miss { .. }));
        assert!(matches!(
            worker.process(Ok(Some(frame()))),
            TickOutcome::Hit { ref payload, .. } if payload == "BAG-001"
        ));
        assert_eq!(decoder.calls(), 2);
    }
}

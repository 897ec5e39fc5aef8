use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::{
    AcquisitionReason, CameraPlatform, ConstraintCandidate, FacingMode, GrantedConstraints,
    MediaStream, PermissionState,
};
use crate::decoder::FrameDecoder;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::settings::SettingsStore;

use super::config::{RestartPolicy, ScannerConfig};
use super::error::{AcquisitionError, Capability, CapabilityError};
use super::loop_worker::{sampling_loop, LoopContext, SamplingWorker};
use super::negotiate::negotiate;
use super::observer::ScanObserver;
use super::state::{ScanSession, ScanSnapshot, ScanState};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Returned by a successful `start()`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,
    pub stream_id: String,
    pub granted: GrantedConstraints,
}

/// Resources owned by the running session: the stream, the sampling task
/// and the signals that steer it.
struct SessionRuntime<S: MediaStream> {
    handle_info: SessionHandle,
    session: Arc<Mutex<ScanSession>>,
    stream: Arc<Mutex<S>>,
    task: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
    pause_tx: watch::Sender<bool>,
}

impl<S: MediaStream> Drop for SessionRuntime<S> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        // Teardown without an explicit stop(): the camera must not outlive us.
        match self.stream.try_lock() {
            Ok(mut stream) => stream.stop_tracks(),
            Err(_) => {
                // The aborted loop still holds the stream; release it once
                // the lock is free.
                let stream = Arc::clone(&self.stream);
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(async move {
                            stream.lock().await.stop_tracks();
                        });
                    }
                    Err(_) => log_warn!(
                        "stream {} busy at teardown and no runtime to release it",
                        self.handle_info.stream_id
                    ),
                }
            }
        }
    }
}

/// Owns the camera for one scan session at a time and drives the
/// sample → decode → report loop.
pub struct ScanController<P: CameraPlatform, D: FrameDecoder> {
    platform: P,
    decoder: Arc<D>,
    config: ScannerConfig,
    settings: Arc<SettingsStore>,
    permission_granted: bool,
    observer: Arc<dyn ScanObserver>,
    metrics: MetricsCollector,
    session: Option<Arc<Mutex<ScanSession>>>,
    runtime: Option<SessionRuntime<P::Stream>>,
}

impl<P: CameraPlatform, D: FrameDecoder> ScanController<P, D> {
    pub fn new(
        platform: P,
        decoder: D,
        config: ScannerConfig,
        settings: Arc<SettingsStore>,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        let permission_granted = settings.camera_permission_granted();
        Self {
            platform,
            decoder: Arc::new(decoder),
            config,
            settings,
            permission_granted,
            observer,
            metrics: MetricsCollector::new(),
            session: None,
            runtime: None,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub async fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }

    /// Acquires the camera and starts sampling.
    ///
    /// An empty `candidates` list falls back to the configured chain, and
    /// then to [`ConstraintCandidate::fallback_chain`].
    pub async fn start(
        &mut self,
        preferred_facing: FacingMode,
        candidates: Vec<ConstraintCandidate>,
    ) -> Result<SessionHandle, AcquisitionError> {
        if let Some(runtime) = &self.runtime {
            let state = runtime.session.lock().await.state();
            if state.holds_stream() && self.config.restart_policy == RestartPolicy::Ignore {
                log_info!(
                    "scan session {} already {}; ignoring start",
                    runtime.handle_info.session_id,
                    state.as_str()
                );
                return Ok(runtime.handle_info.clone());
            }
        }
        if self.runtime.is_some() {
            // Either a restart or a loop that already ended on its own.
            self.stop().await;
        }

        let chain = if !candidates.is_empty() {
            candidates
        } else if !self.config.candidates.is_empty() {
            self.config.candidates.clone()
        } else {
            ConstraintCandidate::fallback_chain(preferred_facing)
        };

        let session = Arc::new(Mutex::new(ScanSession::new(
            preferred_facing,
            self.config.cooldown,
        )));
        {
            let mut guard = session.lock().await;
            guard.begin_acquiring();
            self.observer.on_state_changed(&guard.snapshot());
        }
        self.session = Some(Arc::clone(&session));

        if !self.permission_granted
            && self.platform.query_permission().await == PermissionState::Denied
        {
            return Err(self
                .acquisition_failed(&session, AcquisitionError::permission_denied())
                .await);
        }

        let stream = match negotiate(&self.platform, &chain).await {
            Ok(stream) => stream,
            Err(err) => return Err(self.acquisition_failed(&session, err).await),
        };

        self.remember_permission();

        let handle_info = {
            let mut guard = session.lock().await;
            guard.activate(stream.id().to_string(), stream.granted().clone(), Utc::now());
            self.observer.on_state_changed(&guard.snapshot());
            SessionHandle {
                session_id: guard.id().to_string(),
                stream_id: stream.id().to_string(),
                granted: stream.granted().clone(),
            }
        };

        self.metrics.reset().await;

        let stream = Arc::new(Mutex::new(stream));
        let cancel_token = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        let ctx = LoopContext {
            session: Arc::clone(&session),
            stream: Arc::clone(&stream),
            worker: SamplingWorker::new(
                Arc::clone(&self.decoder),
                self.config.frame_skip,
                self.config.decode_size,
            ),
            observer: Arc::clone(&self.observer),
            metrics: self.metrics.clone(),
            frame_interval: self.config.frame_interval,
        };
        let task = tokio::spawn(sampling_loop(ctx, cancel_token.clone(), pause_rx));

        log_info!(
            "scan session {} active on stream {}",
            handle_info.session_id,
            handle_info.stream_id
        );

        self.runtime = Some(SessionRuntime {
            handle_info: handle_info.clone(),
            session,
            stream,
            task: Some(task),
            cancel_token,
            pause_tx,
        });

        Ok(handle_info)
    }

    async fn acquisition_failed(
        &mut self,
        session: &Arc<Mutex<ScanSession>>,
        err: AcquisitionError,
    ) -> AcquisitionError {
        log_error!("{err}");
        if err.reason == AcquisitionReason::PermissionDenied {
            self.forget_permission();
        }
        let mut guard = session.lock().await;
        guard.acquisition_failed();
        self.observer.on_state_changed(&guard.snapshot());
        self.observer.on_acquisition_failed(&err);
        err
    }

    fn remember_permission(&mut self) {
        if self.permission_granted {
            return;
        }
        self.permission_granted = true;
        if let Err(err) = self.settings.mark_camera_permission_granted(Utc::now()) {
            log_warn!("failed to persist camera permission flag: {err:#}");
        }
    }

    /// Access was revoked since it was last granted; ask the platform again next time.
    fn forget_permission(&mut self) {
        if !self.permission_granted {
            return;
        }
        self.permission_granted = false;
        if let Err(err) = self.settings.clear_camera_permission() {
            log_warn!("failed to clear camera permission flag: {err:#}");
        }
    }

    /// Halts sampling without releasing the camera. Idempotent.
    pub async fn pause(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let mut session = runtime.session.lock().await;
        if session.pause() {
            let _ = runtime.pause_tx.send(true);
            self.observer.on_state_changed(&session.snapshot());
        }
    }

    /// Restarts sampling from the next tick on the same stream. Idempotent.
    pub async fn resume(&self) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        let mut session = runtime.session.lock().await;
        if session.resume() {
            let _ = runtime.pause_tx.send(false);
            self.observer.on_state_changed(&session.snapshot());
        }
    }

    /// Ends the session and releases the camera. Safe to call any number
    /// of times; only the first call after a start does anything.
    pub async fn stop(&mut self) {
        let Some(mut runtime) = self.runtime.take() else {
            return;
        };

        {
            let mut session = runtime.session.lock().await;
            if session.stop(Utc::now()) {
                self.observer.on_state_changed(&session.snapshot());
            }
        }

        runtime.cancel_token.cancel();
        if let Some(task) = runtime.task.take() {
            if let Err(err) = task.await {
                log_error!("sampling loop task failed to join: {err}");
            }
        }

        runtime.stream.lock().await.stop_tracks();
        log_info!(
            "scan session {} stopped; camera released",
            runtime.handle_info.session_id
        );
    }

    pub async fn supports_torch(&self) -> bool {
        match &self.runtime {
            Some(runtime) => runtime.stream.lock().await.supports_torch(),
            None => false,
        }
    }

    /// Flips the torch and reports its new state.
    pub async fn toggle_torch(&self) -> Result<bool, CapabilityError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(CapabilityError::NoActiveStream)?;

        let mut session = runtime.session.lock().await;
        if !session.state().holds_stream() {
            return Err(CapabilityError::NoActiveStream);
        }

        let mut stream = runtime.stream.lock().await;
        if !stream.supports_torch() {
            return Err(CapabilityError::Unsupported(Capability::Torch));
        }

        let next = !session.torch_on();
        stream
            .set_torch(next)
            .map_err(|message| CapabilityError::ApplyFailed {
                capability: Capability::Torch,
                message,
            })?;
        session.set_torch(next);
        self.observer.on_torch_changed(session.id(), next);
        Ok(next)
    }

    pub async fn state(&self) -> ScanState {
        match &self.session {
            Some(session) => session.lock().await.state(),
            None => ScanState::Idle,
        }
    }

    pub async fn snapshot(&self) -> Option<ScanSnapshot> {
        match &self.session {
            Some(session) => Some(session.lock().await.snapshot()),
            None => None,
        }
    }

    /// Handle of the session currently holding the camera, if any.
    pub fn handle(&self) -> Option<&SessionHandle> {
        self.runtime.as_ref().map(|runtime| &runtime.handle_info)
    }

    /// `true` once the sampling task has exited on its own (track ended).
    pub fn loop_finished(&self) -> bool {
        self.runtime
            .as_ref()
            .and_then(|runtime| runtime.task.as_ref())
            .map(|task| task.is_finished())
            .unwrap_or(true)
    }
}

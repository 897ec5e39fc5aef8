//! Scripted camera, decoder and observer for driving the controller in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use image::GrayImage;

use crate::camera::{
    AcquisitionReason, CameraPlatform, ConstraintCandidate, FacingMode, Frame, FrameError,
    GrantedConstraints, MediaStream, PermissionState,
};
use crate::decoder::{DecodeResult, FrameDecoder};

use super::error::AcquisitionError;
use super::observer::ScanObserver;
use super::state::{ScanSnapshot, ScanState};

type DecodeHook = Box<dyn Fn() + Send + Sync>;

pub struct ScriptedDecoder {
    script: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    hook: Mutex<Option<DecodeHook>>,
}

impl ScriptedDecoder {
    pub fn always(payload: Option<&str>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: payload.map(str::to_string),
            calls: AtomicUsize::new(0),
            hook: Mutex::new(None),
        }
    }

    /// Returns the scripted results in order, then nothing.
    pub fn sequence(results: Vec<Option<&str>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().map(|r| r.map(str::to_string)).collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
            hook: Mutex::new(None),
        }
    }

    /// Runs `hook` inside every decode call, before the result is returned.
    pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrameDecoder for ScriptedDecoder {
    fn decode(&self, _image: &GrayImage) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook();
        }
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => self.fallback.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameScript {
    Good,
    NotReady,
    Malformed,
    Ended,
}

#[derive(Clone, Default)]
pub struct FakeCameraLog {
    pub attempts: Arc<Mutex<Vec<String>>>,
    pub acquired: Arc<AtomicUsize>,
    pub permission_queries: Arc<AtomicUsize>,
    pub streams: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl FakeCameraLog {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn permission_queries(&self) -> usize {
        self.permission_queries.load(Ordering::SeqCst)
    }

    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|live| live.load(Ordering::SeqCst))
            .count()
    }
}

pub struct FakeCamera {
    rejections: HashMap<String, AcquisitionReason>,
    permission: PermissionState,
    torch: bool,
    frames: Vec<FrameScript>,
    facing: FacingMode,
    log: FakeCameraLog,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            rejections: HashMap::new(),
            permission: PermissionState::Prompt,
            torch: false,
            frames: Vec::new(),
            facing: FacingMode::Environment,
            log: FakeCameraLog::default(),
        }
    }

    pub fn reject(mut self, label: &str, reason: AcquisitionReason) -> Self {
        self.rejections.insert(label.to_string(), reason);
        self
    }

    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    pub fn with_torch(mut self) -> Self {
        self.torch = true;
        self
    }

    /// Frames served before falling back to good frames forever.
    pub fn with_frames(mut self, frames: Vec<FrameScript>) -> Self {
        self.frames = frames;
        self
    }

    pub fn log(&self) -> FakeCameraLog {
        self.log.clone()
    }
}

impl CameraPlatform for FakeCamera {
    type Stream = FakeStream;

    async fn query_permission(&self) -> PermissionState {
        self.log.permission_queries.fetch_add(1, Ordering::SeqCst);
        self.permission
    }

    async fn acquire(
        &self,
        candidate: &ConstraintCandidate,
        index: usize,
    ) -> Result<FakeStream, AcquisitionReason> {
        self.log.attempts.lock().unwrap().push(candidate.label.clone());
        if let Some(reason) = self.rejections.get(&candidate.label) {
            return Err(*reason);
        }

        let acquired = self.log.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        let live = Arc::new(AtomicBool::new(true));
        self.log.streams.lock().unwrap().push(Arc::clone(&live));

        let (width, height) = candidate
            .resolution
            .map(|r| (r.width, r.height))
            .unwrap_or((640, 480));

        Ok(FakeStream {
            id: format!("fake-stream-{acquired}"),
            granted: GrantedConstraints {
                candidate_index: index,
                candidate: candidate.clone(),
                width,
                height,
                facing: self.facing,
            },
            frames: self.frames.iter().copied().collect(),
            torch_capable: self.torch,
            torch_on: false,
            live,
        })
    }
}

pub struct FakeStream {
    id: String,
    granted: GrantedConstraints,
    frames: VecDeque<FrameScript>,
    torch_capable: bool,
    torch_on: bool,
    live: Arc<AtomicBool>,
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn granted(&self) -> &GrantedConstraints {
        &self.granted
    }

    fn grab_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if !self.is_live() {
            return Err(FrameError::Ended);
        }
        match self.frames.pop_front().unwrap_or(FrameScript::Good) {
            FrameScript::Good => Ok(Some(Frame::new(4, 4, vec![200; 64]))),
            FrameScript::NotReady => Ok(None),
            FrameScript::Malformed => Ok(Some(Frame::new(4, 4, vec![0; 5]))),
            FrameScript::Ended => Err(FrameError::Ended),
        }
    }

    fn supports_torch(&self) -> bool {
        self.torch_capable
    }

    fn set_torch(&mut self, on: bool) -> Result<(), String> {
        if !self.torch_capable {
            return Err("no torch".into());
        }
        self.torch_on = on;
        Ok(())
    }

    fn stop_tracks(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Decoded(String),
    State(ScanState),
    Failed(AcquisitionReason),
    Torch(bool),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Decoded(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn states(&self) -> Vec<ScanState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::State(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_decoded(&self, _session_id: &str, result: &DecodeResult) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Decoded(result.payload.clone()));
    }

    fn on_state_changed(&self, snapshot: &ScanSnapshot) {
        self.events.lock().unwrap().push(Recorded::State(snapshot.state));
    }

    fn on_acquisition_failed(&self, error: &AcquisitionError) {
        self.events.lock().unwrap().push(Recorded::Failed(error.reason));
    }

    fn on_torch_changed(&self, _session_id: &str, on: bool) {
        self.events.lock().unwrap().push(Recorded::Torch(on));
    }
}

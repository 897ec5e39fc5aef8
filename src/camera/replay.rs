//! A camera backed by a directory of still images.
//!
//! Every image in the directory becomes one frame, replayed in file-name
//! order. The first image fixes the "sensor" resolution used to decide
//! whether exact constraints can be honoured.

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use uuid::Uuid;

use super::{
    AcquisitionReason, CameraPlatform, ConstraintCandidate, FacingMode, Frame, FrameError,
    GrantedConstraints, MediaStream, PermissionState, Resolution,
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

pub struct ReplayCamera {
    source_dir: PathBuf,
    facing: FacingMode,
    torch: bool,
    looping: bool,
    permission: PermissionState,
    in_use: Arc<AtomicBool>,
}

impl ReplayCamera {
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            facing: FacingMode::Environment,
            torch: false,
            looping: true,
            permission: PermissionState::Granted,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_facing(mut self, facing: FacingMode) -> Self {
        self.facing = facing;
        self
    }

    pub fn with_torch(mut self, torch: bool) -> Self {
        self.torch = torch;
        self
    }

    /// When disabled the stream ends after the last image.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn with_permission(mut self, permission: PermissionState) -> Self {
        self.permission = permission;
        self
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }
}

fn load_frames(dir: &Path) -> Result<Vec<Frame>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(&path) {
            Ok(img) => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                frames.push(Frame::new(width, height, rgba.into_raw()));
            }
            Err(err) => log_warn!("skipping unreadable frame {}: {err}", path.display()),
        }
    }
    Ok(frames)
}

impl CameraPlatform for ReplayCamera {
    type Stream = ReplayStream;

    async fn query_permission(&self) -> PermissionState {
        self.permission
    }

    async fn acquire(
        &self,
        candidate: &ConstraintCandidate,
        index: usize,
    ) -> Result<ReplayStream, AcquisitionReason> {
        if self.permission == PermissionState::Denied {
            return Err(AcquisitionReason::PermissionDenied);
        }

        let dir = self.source_dir.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(&dir))
            .await
            .map_err(|_| AcquisitionReason::NoDevice)?
            .map_err(|err| {
                log_warn!("replay source unavailable: {err:#}");
                AcquisitionReason::NoDevice
            })?;

        let Some(first) = frames.first() else {
            return Err(AcquisitionReason::NoDevice);
        };
        let native = Resolution::new(first.width, first.height);

        if candidate.require_exact {
            let resolution_ok = candidate
                .resolution
                .map(|wanted| wanted.fits_within(&native))
                .unwrap_or(true);
            if !resolution_ok || !candidate.facing.admits(self.facing) {
                return Err(AcquisitionReason::ConstraintsUnsupported);
            }
        }

        if self
            .in_use
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AcquisitionReason::DeviceBusy);
        }

        let stream = ReplayStream {
            id: Uuid::new_v4().to_string(),
            granted: GrantedConstraints {
                candidate_index: index,
                candidate: candidate.clone(),
                width: native.width,
                height: native.height,
                facing: self.facing,
            },
            frames,
            cursor: 0,
            looping: self.looping,
            torch_capable: self.torch,
            torch_on: false,
            live: true,
            in_use: Arc::clone(&self.in_use),
        };

        log_info!(
            "replay camera opened {} ({} frames at {}) for candidate '{}'",
            self.source_dir.display(),
            stream.frames.len(),
            native,
            candidate.label
        );

        Ok(stream)
    }
}

pub struct ReplayStream {
    id: String,
    granted: GrantedConstraints,
    frames: Vec<Frame>,
    cursor: usize,
    looping: bool,
    torch_capable: bool,
    torch_on: bool,
    live: bool,
    in_use: Arc<AtomicBool>,
}

impl ReplayStream {
    pub fn torch_on(&self) -> bool {
        self.torch_on
    }
}

impl MediaStream for ReplayStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn granted(&self) -> &GrantedConstraints {
        &self.granted
    }

    fn grab_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        if !self.live {
            return Err(FrameError::Ended);
        }
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Err(FrameError::Ended);
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(frame))
    }

    fn supports_torch(&self) -> bool {
        self.torch_capable
    }

    fn set_torch(&mut self, on: bool) -> Result<(), String> {
        if !self.torch_capable {
            return Err("torch not available on replay source".into());
        }
        self.torch_on = on;
        Ok(())
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.torch_on = false;
            self.in_use.store(false, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

impl Drop for ReplayStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::camera::FacingMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CameraPermissionSettings {
    pub permission_granted: bool,
    pub granted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScannerPreferences {
    pub cooldown_ms: u64,
    pub frame_skip: u32,
    pub preferred_facing: FacingMode,
}

impl Default for ScannerPreferences {
    fn default() -> Self {
        Self {
            cooldown_ms: 1500,
            frame_skip: 2,
            preferred_facing: FacingMode::Environment,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    camera: CameraPermissionSettings,
    scanner: ScannerPreferences,
}

/// JSON-backed settings file shared by the CLI and the scan controller.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn camera_permission_granted(&self) -> bool {
        self.read().camera.permission_granted
    }

    pub fn camera_permission(&self) -> CameraPermissionSettings {
        self.read().camera.clone()
    }

    /// Records that the platform granted camera access.
    pub fn mark_camera_permission_granted(&self, at: DateTime<Utc>) -> Result<()> {
        let mut guard = self.write();
        guard.camera = CameraPermissionSettings {
            permission_granted: true,
            granted_at: Some(at),
        };
        self.persist(&guard)
    }

    pub fn clear_camera_permission(&self) -> Result<()> {
        let mut guard = self.write();
        guard.camera = CameraPermissionSettings::default();
        self.persist(&guard)
    }

    pub fn scanner_preferences(&self) -> ScannerPreferences {
        self.read().scanner.clone()
    }

    pub fn update_scanner_preferences(&self, preferences: ScannerPreferences) -> Result<()> {
        let mut guard = self.write();
        guard.scanner = preferences;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

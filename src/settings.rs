use anyhow::{anyhow, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard},
};

use crate::{
    cues::CueLibrary,
    engine::{CueSettings, CueSettingsPatch},
    models::{BiometricMode, OutputMode},
};

pub const DEFAULT_CUE_VOLUME: f32 = 0.3;

/// Which biometric source and cue output pair the host wires up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Demo,
    Wearable,
}

impl TransportMode {
    pub fn biometric(&self) -> BiometricMode {
        match self {
            TransportMode::Demo => BiometricMode::Demo,
            TransportMode::Wearable => BiometricMode::Wearable,
        }
    }

    /// Wearables have no audio path yet, so their cues are only logged.
    pub fn output(&self) -> OutputMode {
        match self {
            TransportMode::Demo => OutputMode::Speaker,
            TransportMode::Wearable => OutputMode::Silent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    cue: CueSettings,
    transport: TransportMode,
    cue_volume: f32,
    library: CueLibrary,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            cue: CueSettings::default(),
            transport: TransportMode::default(),
            cue_volume: DEFAULT_CUE_VOLUME,
            library: CueLibrary::starter(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };
        data.cue.clamp_sensitivities();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cue_settings(&self) -> CueSettings {
        self.read().cue.clone()
    }

    pub fn transport(&self) -> TransportMode {
        self.read().transport
    }

    pub fn cue_volume(&self) -> f32 {
        self.read().cue_volume
    }

    pub fn library(&self) -> CueLibrary {
        self.read().library.clone()
    }

    /// Applies `patch` and returns the resulting settings.
    pub fn update_cue_settings(&self, patch: &CueSettingsPatch) -> Result<CueSettings> {
        self.update(|data| {
            data.cue.apply(patch);
            Ok(data.cue.clone())
        })
    }

    pub fn set_transport(&self, transport: TransportMode) -> Result<()> {
        self.update(|data| {
            data.transport = transport;
            Ok(())
        })
    }

    pub fn set_cue_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(anyhow!("cue volume must be a finite number"));
        }
        self.update(|data| {
            data.cue_volume = volume.clamp(0.0, 1.0);
            Ok(())
        })
    }

    /// Edits the cue library in place; the edit is persisted only if it succeeds.
    pub fn update_library<T>(&self, edit: impl FnOnce(&mut CueLibrary) -> Result<T>) -> Result<T> {
        self.update(|data| edit(&mut data.library))
    }

    fn update<T>(&self, edit: impl FnOnce(&mut UserSettings) -> Result<T>) -> Result<T> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut next = guard.clone();
        let value = edit(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(value)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

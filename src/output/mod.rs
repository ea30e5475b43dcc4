//! Cue output sinks. The engine never calls these; the host plays a cue and
//! then records it on the engine.

#[cfg(feature = "speaker")]
mod speaker;
#[cfg(feature = "speaker")]
mod tone;

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::{cues::AudioCue, models::OutputMode};

#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    pub available: bool,
    pub device: Option<String>,
    pub last_error: Option<String>,
}

pub trait CueOutput: Send + Sync {
    /// Plays `cue` at `volume` (0.0 to 1.0). May block until the device accepted the cue.
    fn play_cue(&self, cue: &AudioCue, volume: f32) -> Result<()>;
    fn stop_cue(&self) -> Result<()>;
    fn status(&self) -> OutputStatus;
    fn mode(&self) -> OutputMode;
}

/// Logs cue triggers instead of producing sound.
#[derive(Debug, Default)]
pub struct SilentOutput;

impl CueOutput for SilentOutput {
    fn play_cue(&self, cue: &AudioCue, volume: f32) -> Result<()> {
        log::info!("[silent] cue {} ({}) at volume {:.2}", cue.name, cue.id, volume);
        Ok(())
    }

    fn stop_cue(&self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> OutputStatus {
        OutputStatus {
            available: true,
            device: Some("silent".into()),
            last_error: None,
        }
    }

    fn mode(&self) -> OutputMode {
        OutputMode::Silent
    }
}

pub fn for_mode(mode: OutputMode) -> Arc<dyn CueOutput> {
    match mode {
        #[cfg(feature = "speaker")]
        OutputMode::Speaker => Arc::new(SpeakerOutput::new()),
        #[cfg(not(feature = "speaker"))]
        OutputMode::Speaker => {
            log::warn!("built without the `speaker` feature; cues will only be logged");
            Arc::new(SilentOutput)
        }
        OutputMode::Silent => Arc::new(SilentOutput),
    }
}

use anyhow::Result;
use log::warn;
use tokio::sync::mpsc;

use super::{BiometricSource, SourceStatus};
use crate::models::{BiometricMode, Sample};

/// Placeholder for a paired wearable. No transport exists yet, so it never
/// produces samples.
pub struct WearableSource {
    status: SourceStatus,
}

impl WearableSource {
    pub fn new() -> Self {
        Self {
            status: SourceStatus::Idle,
        }
    }
}

impl Default for WearableSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BiometricSource for WearableSource {
    fn start(&mut self, _tx: mpsc::Sender<Sample>) -> Result<()> {
        warn!("wearable transport is not available; no samples will be produced");
        self.status = SourceStatus::Disconnected;
        Ok(())
    }

    fn stop(&mut self) {
        self.status = SourceStatus::Idle;
    }

    fn status(&self) -> SourceStatus {
        self.status
    }

    fn mode(&self) -> BiometricMode {
        BiometricMode::Wearable
    }

    fn device_name(&self) -> Option<String> {
        Some("wearable (unpaired)".into())
    }
}

//! Biometric sample producers. Every source pushes already-staged samples
//! into the channel handed to `start`.

mod demo;
mod wearable;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::models::{BiometricMode, Sample};

pub use demo::{DemoBiometricSource, DemoSimulator};
pub use wearable::WearableSource;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum SourceStatus {
    Idle,
    Streaming,
    Disconnected,
}

pub trait BiometricSource: Send {
    /// Begins producing samples. Must be called from within a tokio runtime.
    fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<()>;
    fn stop(&mut self);
    fn status(&self) -> SourceStatus;
    fn mode(&self) -> BiometricMode;
    fn device_name(&self) -> Option<String> {
        None
    }
}

pub fn for_mode(mode: BiometricMode, debug: bool) -> Box<dyn BiometricSource> {
    match mode {
        BiometricMode::Demo => {
            let source = if debug {
                DemoBiometricSource::with_tick(std::time::Duration::from_millis(200))
            } else {
                DemoBiometricSource::new()
            };
            Box::new(source)
        }
        BiometricMode::Wearable => Box::new(WearableSource::new()),
    }
}

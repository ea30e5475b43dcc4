use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{BiometricSource, SourceStatus};
use crate::models::{BiometricMode, Sample, SleepStage};
use crate::utils::clock::now_ms;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Simulated seconds per stage, repeated for the whole night.
const STAGE_CYCLE: [(SleepStage, u64); 5] = [
    (SleepStage::Awake, 300),
    (SleepStage::Light, 600),
    (SleepStage::Deep, 900),
    (SleepStage::Light, 600),
    (SleepStage::Rem, 600),
];
const SIMULATED_STEP_SECS: u64 = 2;
const SPIKE_PROBABILITY: f64 = 0.05;

/// Deterministic part of the demo source: advances a simulated night and
/// turns the current stage into a plausible reading.
pub struct DemoSimulator {
    elapsed_secs: u64,
}

impl DemoSimulator {
    pub fn new() -> Self {
        Self { elapsed_secs: 0 }
    }

    pub fn stage(&self) -> SleepStage {
        let cycle_len: u64 = STAGE_CYCLE.iter().map(|(_, secs)| secs).sum();
        let mut offset = self.elapsed_secs % cycle_len;
        for (stage, secs) in STAGE_CYCLE {
            if offset < secs {
                return stage;
            }
            offset -= secs;
        }
        SleepStage::Awake
    }

    pub fn next_sample<R: Rng + ?Sized>(&mut self, rng: &mut R, timestamp: i64) -> Sample {
        let stage = self.stage();
        let (base_hr, base_movement) = match stage {
            SleepStage::Awake => (75.0, 50.0),
            SleepStage::Light => (65.0, 20.0),
            SleepStage::Deep => (55.0, 5.0),
            SleepStage::Rem => (70.0, 30.0),
        };

        let mut heart_rate = base_hr + rng.gen_range(-5.0..=5.0);
        let mut movement: f64 = base_movement + rng.gen_range(-10.0..=10.0);
        if rng.gen_bool(SPIKE_PROBABILITY) {
            heart_rate += 20.0;
            movement += 40.0;
        }

        self.elapsed_secs += SIMULATED_STEP_SECS;

        Sample {
            heart_rate,
            movement: movement.max(0.0),
            temperature: 36.5 + rng.gen_range(-0.25..=0.25),
            sleep_stage: stage,
            timestamp,
        }
    }
}

impl Default for DemoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DemoBiometricSource {
    tick: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl DemoBiometricSource {
    pub fn new() -> Self {
        Self::with_tick(Duration::from_secs(SIMULATED_STEP_SECS))
    }

    /// Same simulated night, delivered at a different wall-clock cadence.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            tick,
            handle: None,
            cancel_token: None,
        }
    }
}

impl Default for DemoBiometricSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BiometricSource for DemoBiometricSource {
    fn start(&mut self, tx: mpsc::Sender<Sample>) -> Result<()> {
        if self.handle.is_some() {
            bail!("demo source already streaming");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(demo_loop(self.tick, tx, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        log_info!("demo biometric source started ({:?} per sample)", self.tick);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.handle.take();
    }

    fn status(&self) -> SourceStatus {
        match &self.handle {
            Some(handle) if !handle.is_finished() => SourceStatus::Streaming,
            Some(_) => SourceStatus::Disconnected,
            None => SourceStatus::Idle,
        }
    }

    fn mode(&self) -> BiometricMode {
        BiometricMode::Demo
    }

    fn device_name(&self) -> Option<String> {
        Some("demo simulator".into())
    }
}

async fn demo_loop(tick: Duration, tx: mpsc::Sender<Sample>, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut simulator = DemoSimulator::new();
    let mut rng = StdRng::from_entropy();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = simulator.next_sample(&mut rng, now_ms());
                if tx.send(sample).await.is_err() {
                    log_warn!("sample receiver dropped; demo source exiting");
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("demo source shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_the_night_cycle() {
        let mut sim = DemoSimulator::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut stages = Vec::new();
        // one full 3000 s cycle plus one step
        for _ in 0..1501 {
            stages.push(sim.next_sample(&mut rng, 0).sleep_stage);
        }

        assert_eq!(stages[0], SleepStage::Awake);
        assert_eq!(stages[149], SleepStage::Awake);
        assert_eq!(stages[150], SleepStage::Light);
        assert_eq!(stages[450], SleepStage::Deep);
        assert_eq!(stages[900], SleepStage::Light);
        assert_eq!(stages[1200], SleepStage::Rem);
        assert_eq!(stages[1499], SleepStage::Rem);
        assert_eq!(stages[1500], SleepStage::Awake);
    }

    #[test]
    fn readings_stay_in_plausible_ranges() {
        let mut sim = DemoSimulator::new();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..3000 {
            let sample = sim.next_sample(&mut rng, i);
            assert!(sample.movement >= 0.0);
            assert!((36.25..=36.75).contains(&sample.temperature));
            assert!((50.0..=100.0).contains(&sample.heart_rate));
            assert_eq!(sample.timestamp, i);
        }
    }

    #[tokio::test]
    async fn streams_until_stopped() {
        let mut source = DemoBiometricSource::with_tick(Duration::from_millis(10));
        assert_eq!(source.status(), SourceStatus::Idle);

        let (tx, mut rx) = mpsc::channel(8);
        source.start(tx).unwrap();
        assert_eq!(source.status(), SourceStatus::Streaming);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sleep_stage, SleepStage::Awake);
        rx.recv().await.unwrap();

        source.stop();
        assert_eq!(source.status(), SourceStatus::Idle);
        while rx.recv().await.is_some() {}
    }
}

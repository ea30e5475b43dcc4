//! Host side of a session: wires a biometric source into the engine and
//! plays cues on the output whenever the engine opens a window.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::{
    cues::AudioCue,
    engine::{AdaptiveState, CueSettings, CueSettingsPatch, EngineSnapshot, SessionEngine},
    models::{HardwareProvenance, Sample, Session, SleepStage},
    output::CueOutput,
    settings::SettingsStore,
    sources::BiometricSource,
    utils::clock::now_ms,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const SAMPLE_BUFFER: usize = 64;

#[derive(Clone)]
pub struct SessionController {
    engine: Arc<Mutex<SessionEngine>>,
    settings: Arc<SettingsStore>,
    source: Arc<Mutex<Box<dyn BiometricSource>>>,
    output: Arc<dyn CueOutput>,
    ingest: Arc<Mutex<Option<JoinHandle<()>>>>,
    cue_in_flight: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        engine: SessionEngine,
        settings: Arc<SettingsStore>,
        source: Box<dyn BiometricSource>,
        output: Arc<dyn CueOutput>,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            settings,
            source: Arc::new(Mutex::new(source)),
            output,
            ingest: Arc::new(Mutex::new(None)),
            cue_in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn start_session(&self, notes: Option<String>) -> Result<Session> {
        let mut source = self.source.lock().await;
        let hardware = HardwareProvenance {
            biometric: source.mode(),
            biometric_device: source.device_name(),
            cue_output: self.output.mode(),
            cue_output_device: self.output.status().device,
        };

        let session = self
            .engine
            .lock()
            .await
            .start_session(notes, None, Some(hardware))?;

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        if let Err(err) = source.start(tx) {
            log_error!("biometric source failed to start: {err:#}");
            drop(source);
            self.finalize().await?;
            return Err(err.context("failed to start biometric source"));
        }
        drop(source);

        self.spawn_ingest(rx).await;
        Ok(session)
    }

    pub async fn pause_session(&self) -> bool {
        self.engine.lock().await.pause_session(None)
    }

    pub async fn resume_session(&self) -> bool {
        self.engine.lock().await.resume_session(None)
    }

    /// Stops sample intake and finalizes the session. `None` when nothing was running.
    pub async fn end_session(&self) -> Result<Option<Session>> {
        self.source.lock().await.stop();
        if let Some(handle) = self.ingest.lock().await.take() {
            handle.abort();
        }
        if let Err(err) = self.output.stop_cue() {
            log_warn!("failed to stop cue output: {err:#}");
        }
        self.finalize().await
    }

    /// Persists the patch and forwards it to the engine.
    pub async fn update_settings(&self, patch: CueSettingsPatch) -> Result<CueSettings> {
        self.settings.update_cue_settings(&patch)?;
        let mut engine = self.engine.lock().await;
        engine.update_settings(&patch);
        Ok(engine.settings().clone())
    }

    pub async fn adaptive_state(&self) -> AdaptiveState {
        self.engine.lock().await.adaptive_state().clone()
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.engine.lock().await.current_session().cloned()
    }

    pub async fn snapshot(&self) -> EngineSnapshot {
        self.engine.lock().await.snapshot()
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.blocking_lock().list_sessions())
            .await
            .context("session listing task failed to join")?
    }

    // The store write is blocking, so the engine is driven from the blocking pool.
    async fn finalize(&self) -> Result<Option<Session>> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.blocking_lock().end_session(None))
            .await
            .context("session finalization task failed to join")
    }

    async fn spawn_ingest(&self, rx: mpsc::Receiver<Sample>) {
        let mut ingest_guard = self.ingest.lock().await;
        if let Some(handle) = ingest_guard.take() {
            handle.abort();
        }

        let handle = tokio::spawn(ingest_loop(
            rx,
            self.engine.clone(),
            self.settings.clone(),
            self.output.clone(),
            self.cue_in_flight.clone(),
        ));
        *ingest_guard = Some(handle);
    }
}

async fn ingest_loop(
    mut rx: mpsc::Receiver<Sample>,
    engine: Arc<Mutex<SessionEngine>>,
    settings: Arc<SettingsStore>,
    output: Arc<dyn CueOutput>,
    cue_in_flight: Arc<AtomicBool>,
) {
    while let Some(sample) = rx.recv().await {
        let (outcome, session_id) = {
            let mut engine = engine.lock().await;
            let outcome = engine.log_sample(&sample, Some(now_ms()));
            (outcome, engine.current_session().map(|s| s.id.clone()))
        };
        if !outcome.cue_allowed() {
            continue;
        }
        let Some(session_id) = session_id else {
            continue;
        };
        if cue_in_flight.swap(true, Ordering::AcqRel) {
            log::debug!("cue window at {} skipped; previous cue still playing", sample.timestamp);
            continue;
        }

        let Some(cue) = pick_cue(&settings) else {
            log_warn!("cue window open but the active set has no enabled cues");
            cue_in_flight.store(false, Ordering::Release);
            continue;
        };

        tokio::spawn(play_and_record(
            session_id,
            cue,
            settings.cue_volume(),
            sample.sleep_stage,
            engine.clone(),
            output.clone(),
            cue_in_flight.clone(),
        ));
    }
    log_info!("sample stream closed; ingest loop exiting");
}

fn pick_cue(settings: &SettingsStore) -> Option<AudioCue> {
    settings.library().pick(&mut rand::thread_rng()).cloned()
}

/// Plays `cue` and records it, but only on the session that opened the window.
async fn play_and_record(
    session_id: String,
    cue: AudioCue,
    volume: f32,
    stage: SleepStage,
    engine: Arc<Mutex<SessionEngine>>,
    output: Arc<dyn CueOutput>,
    cue_in_flight: Arc<AtomicBool>,
) {
    let played = {
        let cue = cue.clone();
        tokio::task::spawn_blocking(move || output.play_cue(&cue, volume)).await
    };

    match played {
        Ok(Ok(())) => {
            let mut engine = engine.lock().await;
            if engine
                .current_session()
                .is_some_and(|session| session.id == session_id)
            {
                engine.record_cue_play(&cue.id, &cue.name, stage, None);
            } else {
                log_warn!(
                    "cue {} finished after session {session_id} ended; not recorded",
                    cue.name
                );
            }
        }
        Ok(Err(err)) => log_error!("cue {} failed to play: {err:#}", cue.name),
        Err(join_err) => log_error!("cue playback task failed to join: {join_err}"),
    }
    cue_in_flight.store(false, Ordering::Release);
}

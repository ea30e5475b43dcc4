pub mod controller;
pub mod cues;
pub mod db;
pub mod engine;
pub mod models;
pub mod output;
pub mod settings;
pub mod sources;
pub mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use log::{info, warn};

use controller::SessionController;
use db::Database;
use engine::SessionEngine;
use models::SleepStage;
use settings::SettingsStore;

const DEFAULT_DATA_DIR: &str = "./somnicue-data";
const DEFAULT_RUN_SECS: u64 = 60;
const STATUS_EVERY: Duration = Duration::from_secs(10);

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub run_for: Duration,
    pub debug: bool,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("SOMNICUE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));
        let run_secs = std::env::var("SOMNICUE_RUN_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RUN_SECS);
        let debug = std::env::var("SOMNICUE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            data_dir,
            run_for: Duration::from_secs(run_secs),
            debug,
        }
    }
}

/// Runs one session with the configured transport until the run length
/// elapses or Ctrl-C arrives, then prints the stored history.
pub fn run() -> Result<()> {
    utils::logging::init();
    info!("SomniCue starting up...");

    let config = RuntimeConfig::from_env();
    let runtime = tokio::runtime::Runtime::new().context("failed to build tokio runtime")?;
    runtime.block_on(run_session(config))
}

async fn run_session(config: RuntimeConfig) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("failed to create data directory {}", config.data_dir.display())
    })?;

    let database = Database::new(config.data_dir.join("somnicue.sqlite3"))?;
    let settings = Arc::new(SettingsStore::new(config.data_dir.join("settings.json"))?);

    let transport = settings.transport();
    let engine = SessionEngine::new(settings.cue_settings(), Box::new(database.clone()));
    let controller = SessionController::new(
        engine,
        settings.clone(),
        sources::for_mode(transport.biometric(), config.debug),
        output::for_mode(transport.output()),
    );

    let session = controller.start_session(Some("cli session".into())).await?;
    info!(
        "session {} running for {:?} ({:?} transport)",
        session.id, config.run_for, transport
    );

    let deadline = tokio::time::sleep(config.run_for);
    tokio::pin!(deadline);
    let mut status = tokio::time::interval(STATUS_EVERY);
    status.tick().await;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!("failed to listen for Ctrl-C: {err}");
                }
                info!("interrupted; ending session early");
                break;
            }
            _ = status.tick() => {
                let snapshot = controller.snapshot().await;
                if let Some(session) = snapshot.session {
                    info!(
                        "stage {} | {} cue windows | {} cues played | adaptive paused: {}",
                        snapshot.current_stage,
                        session.cue_allowed_count,
                        session.cues_played.len(),
                        snapshot.adaptive.cues_paused
                    );
                }
            }
        }
    }

    if let Some(session) = controller.end_session().await? {
        info!(
            "session {} finished with {} cues",
            session.id,
            session.cues_played.len()
        );
        for stage in SleepStage::ALL {
            info!("  {stage}: {} ms", session.stage_timings.get(stage));
        }
        if database.get_session(&session.id).await?.is_none() {
            warn!("session {} was not persisted", session.id);
        }
    }

    for past in database.list_recent_sessions(5).await? {
        info!(
            "history: {} started {} ({} cues, {} ms)",
            past.id,
            past.start_time,
            past.cues_played.len(),
            past.stage_timings.total()
        );
    }

    Ok(())
}

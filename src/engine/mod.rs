//! Cue decision engine: session lifecycle, stage-time ledger and the
//! throttle/gate pipeline every incoming sample goes through.

pub mod config;
pub mod gate;
pub mod store;
pub mod throttle;
pub mod window;

pub use config::{CueSettings, CueSettingsPatch};
pub use gate::{CueDecision, DenyReason};
pub use store::{MemorySessionStore, SessionStore};
pub use throttle::{AdaptiveState, AdaptiveThrottle, ThrottleReason};
pub use window::SampleWindow;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::{CuePlayEvent, HardwareProvenance, Sample, Session, SessionStatus, SleepStage},
    utils::clock::now_ms,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Heart rate assumed before the first sample of a session arrives.
pub const BASELINE_HEART_RATE: f64 = 70.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("session {id} is still {status}; end it before starting another")]
    SessionAlreadyActive { id: String, status: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    NonFiniteReading,
    /// The sample's time is earlier than the last accepted sample or the current stage start.
    OutOfOrder { timestamp: i64, floor: i64 },
}

/// What `log_sample` did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SampleOutcome {
    /// No session, or the session is paused.
    Inactive,
    Rejected(RejectReason),
    Evaluated(CueDecision),
}

impl SampleOutcome {
    pub fn cue_allowed(&self) -> bool {
        matches!(self, SampleOutcome::Evaluated(CueDecision::Allowed))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub session: Option<Session>,
    pub current_stage: SleepStage,
    pub adaptive: AdaptiveState,
    pub settings: CueSettings,
}

pub struct SessionEngine {
    settings: CueSettings,
    throttle: AdaptiveThrottle,
    store: Box<dyn SessionStore>,
    current: Option<Session>,
    current_stage: SleepStage,
    stage_started_at: i64,
    last_heart_rate: f64,
    last_cue_timestamp: i64,
    last_sample_at: Option<i64>,
}

impl SessionEngine {
    pub fn new(settings: CueSettings, store: Box<dyn SessionStore>) -> Self {
        Self {
            throttle: AdaptiveThrottle::new(&settings),
            settings,
            store,
            current: None,
            current_stage: SleepStage::Awake,
            stage_started_at: 0,
            last_heart_rate: BASELINE_HEART_RATE,
            last_cue_timestamp: 0,
            last_sample_at: None,
        }
    }

    pub fn start_session(
        &mut self,
        notes: Option<String>,
        start_time: Option<i64>,
        hardware: Option<HardwareProvenance>,
    ) -> Result<Session, EngineError> {
        if let Some(existing) = &self.current {
            return Err(EngineError::SessionAlreadyActive {
                id: existing.id.clone(),
                status: existing.status.as_str(),
            });
        }

        let start_time = start_time.unwrap_or_else(now_ms);
        let session = Session::new(Uuid::new_v4().to_string(), start_time, notes, hardware);

        self.current_stage = SleepStage::Awake;
        self.stage_started_at = start_time;
        self.last_heart_rate = BASELINE_HEART_RATE;
        self.last_cue_timestamp = 0;
        self.last_sample_at = None;
        self.throttle.reset(&self.settings);

        log_info!("session {} started at {}", session.id, start_time);
        self.current = Some(session.clone());
        Ok(session)
    }

    /// Feeds one sample through the stage ledger, the adaptive throttle and the cue gate.
    ///
    /// `now` defaults to the sample's own timestamp.
    pub fn log_sample(&mut self, sample: &Sample, now: Option<i64>) -> SampleOutcome {
        let Some(session) = self.current.as_mut() else {
            return SampleOutcome::Inactive;
        };
        if session.status != SessionStatus::Active {
            return SampleOutcome::Inactive;
        }

        if !sample.has_finite_readings() {
            log_warn!("dropping sample at {} with non-finite readings", sample.timestamp);
            return SampleOutcome::Rejected(RejectReason::NonFiniteReading);
        }

        let now = now.unwrap_or(sample.timestamp);
        let floor = self
            .last_sample_at
            .map_or(self.stage_started_at, |last| last.max(self.stage_started_at));
        if now < floor {
            log_warn!("dropping out-of-order sample at {now} (floor {floor})");
            return SampleOutcome::Rejected(RejectReason::OutOfOrder {
                timestamp: now,
                floor,
            });
        }
        self.last_sample_at = Some(now);

        if sample.sleep_stage != self.current_stage {
            session
                .stage_timings
                .add(self.current_stage, now.saturating_sub(self.stage_started_at));
            log::debug!(
                "stage {} -> {} at {now}",
                self.current_stage,
                sample.sleep_stage
            );
            self.current_stage = sample.sleep_stage;
            self.stage_started_at = now;
        }

        self.throttle.update(sample, &self.settings, now);

        let decision = gate::evaluate(
            sample,
            session,
            self.last_heart_rate,
            self.last_cue_timestamp,
            self.throttle.state(),
            &self.settings,
            now,
        );
        match decision {
            CueDecision::Allowed => session.cue_allowed_count += 1,
            CueDecision::Denied(reason) => log::debug!("cue denied at {now}: {reason}"),
        }

        self.last_heart_rate = sample.heart_rate;
        SampleOutcome::Evaluated(decision)
    }

    /// Gate decision for `sample` without touching any state. `None` when no
    /// session is running. `now` defaults to the wall clock.
    pub fn evaluate_cue(&self, sample: &Sample, now: Option<i64>) -> Option<CueDecision> {
        let session = self
            .current
            .as_ref()
            .filter(|session| session.status == SessionStatus::Active)?;
        if !sample.has_finite_readings() {
            return None;
        }

        Some(gate::evaluate(
            sample,
            session,
            self.last_heart_rate,
            self.last_cue_timestamp,
            self.throttle.state(),
            &self.settings,
            now.unwrap_or_else(now_ms),
        ))
    }

    pub fn is_cue_allowed(&self, sample: &Sample, now: Option<i64>) -> bool {
        matches!(self.evaluate_cue(sample, now), Some(CueDecision::Allowed))
    }

    /// Appends a played cue to the ledger. Refused when there is no session or
    /// the per-session cap is already reached.
    pub fn record_cue_play(
        &mut self,
        cue_id: &str,
        cue_name: &str,
        stage: SleepStage,
        timestamp: Option<i64>,
    ) -> bool {
        let Some(session) = self.current.as_mut() else {
            log_warn!("cue {cue_id} played with no session in progress; not recorded");
            return false;
        };
        if session.cues_played.len() >= self.settings.max_cues_per_session as usize {
            log_warn!(
                "session {} already has {} cues; not recording {cue_id}",
                session.id,
                session.cues_played.len()
            );
            return false;
        }

        let timestamp = timestamp.unwrap_or_else(now_ms);
        session.cues_played.push(CuePlayEvent {
            timestamp,
            cue_id: cue_id.to_string(),
            cue_name: cue_name.to_string(),
            sleep_stage_at_play: stage,
        });
        self.last_cue_timestamp = timestamp;
        log_info!("cue {cue_name} ({cue_id}) recorded during {stage}");
        true
    }

    pub fn pause_session(&mut self, now: Option<i64>) -> bool {
        let Some(session) = self.current.as_mut() else {
            return false;
        };
        if session.status != SessionStatus::Active {
            return false;
        }

        let now = now.unwrap_or_else(now_ms);
        session
            .stage_timings
            .add(self.current_stage, now.saturating_sub(self.stage_started_at).max(0));
        session.status = SessionStatus::Paused;
        log_info!("session {} paused", session.id);
        true
    }

    pub fn resume_session(&mut self, now: Option<i64>) -> bool {
        let Some(session) = self.current.as_mut() else {
            return false;
        };
        if session.status != SessionStatus::Paused {
            return false;
        }

        self.stage_started_at = now.unwrap_or_else(now_ms);
        session.status = SessionStatus::Active;
        log_info!("session {} resumed", session.id);
        true
    }

    /// Finalizes the current session and hands it to the store.
    pub fn end_session(&mut self, now: Option<i64>) -> Option<Session> {
        let mut session = self.current.take()?;
        let now = now.unwrap_or_else(now_ms);

        if session.status == SessionStatus::Active {
            session
                .stage_timings
                .add(self.current_stage, now.saturating_sub(self.stage_started_at).max(0));
        }
        session.end_time = Some(now);
        session.status = SessionStatus::Completed;

        if let Err(err) = self.store.append(&session) {
            log_error!("failed to store session {}: {err:#}", session.id);
        }

        log_info!(
            "session {} completed: {} ms, {} cues played, {} cue windows",
            session.id,
            session.duration_ms(now),
            session.cues_played.len(),
            session.cue_allowed_count
        );
        Some(session)
    }

    /// Merges `patch` into the settings. Takes effect from the next evaluation.
    pub fn update_settings(&mut self, patch: &CueSettingsPatch) {
        self.settings.apply(patch);
        self.throttle.apply_settings(&self.settings);
    }

    pub fn adaptive_state(&self) -> &AdaptiveState {
        self.throttle.state()
    }

    pub fn settings(&self) -> &CueSettings {
        &self.settings
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn current_stage(&self) -> SleepStage {
        self.current_stage
    }

    pub fn list_sessions(&self) -> anyhow::Result<Vec<Session>> {
        self.store.list_all()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            session: self.current.clone(),
            current_stage: self.current_stage,
            adaptive: self.throttle.state().clone(),
            settings: self.settings.clone(),
        }
    }
}

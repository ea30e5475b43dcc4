use serde::{Deserialize, Serialize};

use super::SleepStage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "Active",
            SessionStatus::Paused => "Paused",
            SessionStatus::Completed => "Completed",
        }
    }
}

/// Cumulative milliseconds spent in each sleep stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTimings {
    #[serde(rename = "Awake")]
    pub awake: i64,
    #[serde(rename = "Light")]
    pub light: i64,
    #[serde(rename = "Deep")]
    pub deep: i64,
    #[serde(rename = "REM")]
    pub rem: i64,
}

impl StageTimings {
    pub fn get(&self, stage: SleepStage) -> i64 {
        match stage {
            SleepStage::Awake => self.awake,
            SleepStage::Light => self.light,
            SleepStage::Deep => self.deep,
            SleepStage::Rem => self.rem,
        }
    }

    pub fn add(&mut self, stage: SleepStage, elapsed_ms: i64) {
        let slot = match stage {
            SleepStage::Awake => &mut self.awake,
            SleepStage::Light => &mut self.light,
            SleepStage::Deep => &mut self.deep,
            SleepStage::Rem => &mut self.rem,
        };
        *slot = slot.saturating_add(elapsed_ms);
    }

    pub fn total(&self) -> i64 {
        self.awake
            .saturating_add(self.light)
            .saturating_add(self.deep)
            .saturating_add(self.rem)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CuePlayEvent {
    pub timestamp: i64,
    pub cue_id: String,
    pub cue_name: String,
    #[serde(rename = "sleepStage")]
    pub sleep_stage_at_play: SleepStage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BiometricMode {
    Demo,
    Wearable,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutputMode {
    Speaker,
    Silent,
}

/// Which devices produced the samples and played the cues for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProvenance {
    pub biometric: BiometricMode,
    pub biometric_device: Option<String>,
    pub cue_output: OutputMode,
    pub cue_output_device: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub hardware: Option<HardwareProvenance>,
    pub stage_timings: StageTimings,
    /// Samples for which a cue could have been played, whether or not one was.
    pub cue_allowed_count: u32,
    pub cues_played: Vec<CuePlayEvent>,
}

impl Session {
    pub fn new(
        id: String,
        start_time: i64,
        notes: Option<String>,
        hardware: Option<HardwareProvenance>,
    ) -> Self {
        Self {
            id,
            start_time,
            end_time: None,
            status: SessionStatus::Active,
            notes,
            hardware,
            stage_timings: StageTimings::default(),
            cue_allowed_count: 0,
            cues_played: Vec::new(),
        }
    }

    pub fn duration_ms(&self, now: i64) -> i64 {
        self.end_time.unwrap_or(now).saturating_sub(self.start_time)
    }
}

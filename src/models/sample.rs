use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SleepStage {
    #[default]
    Awake,
    Light,
    Deep,
    #[serde(rename = "REM")]
    Rem,
}

impl SleepStage {
    pub const ALL: [SleepStage; 4] = [
        SleepStage::Awake,
        SleepStage::Light,
        SleepStage::Deep,
        SleepStage::Rem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::Awake => "Awake",
            SleepStage::Light => "Light",
            SleepStage::Deep => "Deep",
            SleepStage::Rem => "REM",
        }
    }

    /// Only NREM light and deep sleep are windows for cue delivery.
    pub fn is_cue_safe(&self) -> bool {
        matches!(self, SleepStage::Light | SleepStage::Deep)
    }
}

impl fmt::Display for SleepStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physiological reading with an already-classified sleep stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Beats per minute.
    pub heart_rate: f64,
    /// Unitless movement intensity.
    pub movement: f64,
    /// Degrees Celsius.
    pub temperature: f64,
    pub sleep_stage: SleepStage,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Sample {
    pub fn has_finite_readings(&self) -> bool {
        self.heart_rate.is_finite() && self.movement.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_default_to_awake_and_use_wire_names() {
        assert_eq!(SleepStage::default(), SleepStage::Awake);
        assert_eq!(serde_json::to_string(&SleepStage::Rem).unwrap(), "\"REM\"");
        assert!(SleepStage::ALL.iter().filter(|s| s.is_cue_safe()).eq([
            &SleepStage::Light,
            &SleepStage::Deep
        ]));
    }
}

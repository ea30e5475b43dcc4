use serde::{Deserialize, Serialize};

/// Cue safety and adaptive throttling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CueSettings {
    /// Base cooldown between two cues, in seconds.
    pub min_seconds_between_cues: f64,
    pub max_cues_per_session: u32,
    /// Movement intensity above which a cue is never played.
    pub movement_threshold: f64,
    /// Largest tolerated heart-rate change between consecutive samples (bpm).
    pub hr_spike_threshold: f64,
    pub adaptive_mode_enabled: bool,
    /// 0.0 (strict) to 1.0 (tolerant).
    pub adaptive_movement_sensitivity: f64,
    /// 0.0 (strict) to 1.0 (tolerant).
    pub adaptive_hr_sensitivity: f64,
}

impl Default for CueSettings {
    fn default() -> Self {
        Self {
            min_seconds_between_cues: 120.0,
            max_cues_per_session: 10,
            movement_threshold: 30.0,
            hr_spike_threshold: 20.0,
            adaptive_mode_enabled: false,
            adaptive_movement_sensitivity: 0.5,
            adaptive_hr_sensitivity: 0.5,
        }
    }
}

impl CueSettings {
    /// Merges the fields present in `patch`; sensitivities are clamped into `[0, 1]`.
    pub fn apply(&mut self, patch: &CueSettingsPatch) {
        if let Some(value) = patch.min_seconds_between_cues {
            self.min_seconds_between_cues = value;
        }
        if let Some(value) = patch.max_cues_per_session {
            self.max_cues_per_session = value;
        }
        if let Some(value) = patch.movement_threshold {
            self.movement_threshold = value;
        }
        if let Some(value) = patch.hr_spike_threshold {
            self.hr_spike_threshold = value;
        }
        if let Some(value) = patch.adaptive_mode_enabled {
            self.adaptive_mode_enabled = value;
        }
        if let Some(value) = patch.adaptive_movement_sensitivity {
            self.adaptive_movement_sensitivity = clamp_unit(value);
        }
        if let Some(value) = patch.adaptive_hr_sensitivity {
            self.adaptive_hr_sensitivity = clamp_unit(value);
        }
    }

    /// Forces both sensitivities into `[0, 1]`, for values that bypassed `apply`.
    pub fn clamp_sensitivities(&mut self) {
        self.adaptive_movement_sensitivity = clamp_unit(self.adaptive_movement_sensitivity);
        self.adaptive_hr_sensitivity = clamp_unit(self.adaptive_hr_sensitivity);
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.5
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueSettingsPatch {
    pub min_seconds_between_cues: Option<f64>,
    pub max_cues_per_session: Option<u32>,
    pub movement_threshold: Option<f64>,
    pub hr_spike_threshold: Option<f64>,
    pub adaptive_mode_enabled: Option<bool>,
    pub adaptive_movement_sensitivity: Option<f64>,
    pub adaptive_hr_sensitivity: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_touches_present_fields() {
        let mut settings = CueSettings::default();
        settings.apply(&CueSettingsPatch {
            max_cues_per_session: Some(3),
            adaptive_mode_enabled: Some(true),
            ..Default::default()
        });

        assert_eq!(settings.max_cues_per_session, 3);
        assert!(settings.adaptive_mode_enabled);
        assert_eq!(settings.min_seconds_between_cues, 120.0);
        assert_eq!(settings.movement_threshold, 30.0);
    }

    #[test]
    fn sensitivities_are_clamped() {
        let mut settings = CueSettings::default();
        settings.apply(&CueSettingsPatch {
            adaptive_movement_sensitivity: Some(3.0),
            adaptive_hr_sensitivity: Some(-1.0),
            ..Default::default()
        });

        assert_eq!(settings.adaptive_movement_sensitivity, 1.0);
        assert_eq!(settings.adaptive_hr_sensitivity, 0.0);
    }

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let settings: CueSettings =
            serde_json::from_str(r#"{"maxCuesPerSession": 4}"#).unwrap();
        assert_eq!(settings.max_cues_per_session, 4);
        assert_eq!(settings.hr_spike_threshold, 20.0);
    }
}

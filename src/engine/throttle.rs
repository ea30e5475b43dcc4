//! Adaptive throttling of cue delivery from biometric volatility.
//!
//! Two rolling windows (movement, heart rate) feed a volatility figure per
//! metric. Crossing 1.2x the sensitivity-scaled threshold opens a timed pause
//! during which no cue may play; crossing the plain threshold only lengthens
//! the cooldown ("watch-list").

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Sample;

use super::{config::CueSettings, window::SampleWindow};

const MOVEMENT_BASE_THRESHOLD: f64 = 8.0;
const HR_BASE_THRESHOLD: f64 = 5.0;
const SENSITIVITY_SPAN: f64 = 20.0;
const HARD_TRIGGER_FACTOR: f64 = 1.2;
const PAUSE_BASE_MS: f64 = 30_000.0;
const PAUSE_SENSITIVITY_MS: f64 = 20_000.0;
const PAUSED_COOLDOWN_FACTOR: f64 = 3.0;
const WATCHLIST_COOLDOWN_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ThrottleReason {
    MovementVolatility,
    HeartRateVolatility,
    /// Paused, but the metric that opened the pause is no longer known.
    ElevatedVariability,
    Watchlist,
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ThrottleReason::MovementVolatility => "cues paused: elevated movement variability",
            ThrottleReason::HeartRateVolatility => "cues paused: elevated heart rate variability",
            ThrottleReason::ElevatedVariability => {
                "cues paused due to elevated movement or heart rate variability"
            }
            ThrottleReason::Watchlist => "adaptive cooling: biometrics slightly elevated",
        };
        f.write_str(message)
    }
}

/// Derived throttle state, consistent with the last processed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveState {
    pub enabled: bool,
    pub cues_paused: bool,
    pub reason: Option<ThrottleReason>,
    pub effective_cooldown_seconds: f64,
    pub movement_volatility: f64,
    pub hr_volatility: f64,
}

impl AdaptiveState {
    pub fn disabled(settings: &CueSettings) -> Self {
        Self {
            enabled: false,
            cues_paused: false,
            reason: None,
            effective_cooldown_seconds: settings.min_seconds_between_cues,
            movement_volatility: 0.0,
            hr_volatility: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveThrottle {
    movement: SampleWindow,
    heart_rate: SampleWindow,
    /// Epoch ms until which cues stay paused; `0` when no pause is open.
    paused_until: i64,
    state: AdaptiveState,
}

impl AdaptiveThrottle {
    pub fn new(settings: &CueSettings) -> Self {
        Self {
            movement: SampleWindow::new(),
            heart_rate: SampleWindow::new(),
            paused_until: 0,
            state: AdaptiveState::disabled(settings),
        }
    }

    pub fn state(&self) -> &AdaptiveState {
        &self.state
    }

    pub fn paused_until(&self) -> i64 {
        self.paused_until
    }

    /// Drops all history; used when a new session begins.
    pub fn reset(&mut self, settings: &CueSettings) {
        self.movement.clear();
        self.heart_rate.clear();
        self.paused_until = 0;
        self.state = AdaptiveState::disabled(settings);
        self.state.enabled = settings.adaptive_mode_enabled;
    }

    /// Reflects a settings change that switched adaptive mode off.
    pub fn disable(&mut self, settings: &CueSettings) {
        self.paused_until = 0;
        self.state = AdaptiveState::disabled(settings);
    }

    /// Re-derives the effective cooldown from changed settings, keeping the
    /// current tier (open, watch-list or paused) until the next sample.
    pub fn apply_settings(&mut self, settings: &CueSettings) {
        if !settings.adaptive_mode_enabled {
            self.disable(settings);
            return;
        }

        let factor = if self.state.cues_paused {
            PAUSED_COOLDOWN_FACTOR
        } else if self.state.reason == Some(ThrottleReason::Watchlist) {
            WATCHLIST_COOLDOWN_FACTOR
        } else {
            1.0
        };
        self.state.enabled = true;
        self.state.effective_cooldown_seconds = settings.min_seconds_between_cues * factor;
    }

    pub fn update(&mut self, sample: &Sample, settings: &CueSettings, now: i64) -> &AdaptiveState {
        if !settings.adaptive_mode_enabled {
            self.disable(settings);
            return &self.state;
        }

        self.movement.push(sample.movement);
        self.heart_rate.push(sample.heart_rate);

        let movement_volatility = self.movement.volatility();
        let hr_volatility = self.heart_rate.volatility();

        let movement_threshold =
            MOVEMENT_BASE_THRESHOLD + settings.adaptive_movement_sensitivity * SENSITIVITY_SPAN;
        let hr_threshold = HR_BASE_THRESHOLD + settings.adaptive_hr_sensitivity * SENSITIVITY_SPAN;

        let excessive_movement = movement_volatility > movement_threshold * HARD_TRIGGER_FACTOR;
        let excessive_hr = hr_volatility > hr_threshold * HARD_TRIGGER_FACTOR;
        let base_cooldown = settings.min_seconds_between_cues;

        let (cues_paused, reason, cooldown) = if excessive_movement || excessive_hr {
            let mean_sensitivity =
                (settings.adaptive_movement_sensitivity + settings.adaptive_hr_sensitivity) / 2.0;
            let pause_ms = PAUSE_BASE_MS + PAUSE_SENSITIVITY_MS * mean_sensitivity;
            self.paused_until = now.saturating_add(pause_ms.round() as i64);

            let reason = if excessive_movement {
                ThrottleReason::MovementVolatility
            } else {
                ThrottleReason::HeartRateVolatility
            };
            log::info!(
                "adaptive pause until {} ({reason}; movement σ={movement_volatility:.2}, hr σ={hr_volatility:.2})",
                self.paused_until
            );
            (true, Some(reason), base_cooldown * PAUSED_COOLDOWN_FACTOR)
        } else if now < self.paused_until {
            let reason = match self.state.reason {
                Some(ThrottleReason::Watchlist) | None => ThrottleReason::ElevatedVariability,
                Some(prior) => prior,
            };
            (true, Some(reason), base_cooldown * PAUSED_COOLDOWN_FACTOR)
        } else if movement_volatility > movement_threshold || hr_volatility > hr_threshold {
            (
                false,
                Some(ThrottleReason::Watchlist),
                base_cooldown * WATCHLIST_COOLDOWN_FACTOR,
            )
        } else {
            (false, None, base_cooldown)
        };

        self.state = AdaptiveState {
            enabled: true,
            cues_paused,
            reason,
            effective_cooldown_seconds: cooldown,
            movement_volatility,
            hr_volatility,
        };
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SleepStage;

    fn sample(movement: f64, heart_rate: f64, timestamp: i64) -> Sample {
        Sample {
            heart_rate,
            movement,
            temperature: 36.5,
            sleep_stage: SleepStage::Light,
            timestamp,
        }
    }

    fn adaptive_settings() -> CueSettings {
        CueSettings {
            adaptive_mode_enabled: true,
            ..CueSettings::default()
        }
    }

    #[test]
    fn disabled_mode_reports_base_cooldown() {
        let settings = CueSettings::default();
        let mut throttle = AdaptiveThrottle::new(&settings);

        let state = throttle.update(&sample(100.0, 60.0, 1_000), &settings, 1_000).clone();
        assert_eq!(state, AdaptiveState::disabled(&settings));
        assert_eq!(state.effective_cooldown_seconds, 120.0);
        assert_eq!(throttle.paused_until(), 0);
    }

    #[test]
    fn calm_readings_leave_cues_open() {
        let settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);

        for i in 0..10 {
            throttle.update(&sample(5.0, 60.0, i * 2_000), &settings, i * 2_000);
        }

        let state = throttle.state();
        assert!(state.enabled);
        assert!(!state.cues_paused);
        assert_eq!(state.reason, None);
        assert_eq!(state.effective_cooldown_seconds, 120.0);
    }

    #[test]
    fn volatile_movement_opens_a_timed_pause() {
        // Sensitivity 0.5 gives a movement threshold of 18, hard trigger above 21.6.
        let settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);

        throttle.update(&sample(0.0, 60.0, 0), &settings, 0);
        let state = throttle.update(&sample(100.0, 60.0, 2_000), &settings, 2_000).clone();

        assert!(state.movement_volatility > 21.6);
        assert!(state.cues_paused);
        assert_eq!(state.reason, Some(ThrottleReason::MovementVolatility));
        assert_eq!(state.effective_cooldown_seconds, 360.0);
        assert_eq!(throttle.paused_until(), 2_000 + 40_000);
    }

    #[test]
    fn pause_holds_until_deadline_passes() {
        let settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);

        throttle.update(&sample(0.0, 60.0, 0), &settings, 0);
        throttle.update(&sample(100.0, 60.0, 1_000), &settings, 1_000);

        // Flood the window with calm readings so volatility drops back under the threshold.
        let mut t = 2_000;
        for _ in 0..20 {
            throttle.update(&sample(5.0, 60.0, t), &settings, t);
            t += 1_000;
        }
        let deadline = throttle.paused_until();
        assert!(t < deadline);
        let state = throttle.state();
        assert!(state.cues_paused);
        assert_eq!(state.reason, Some(ThrottleReason::MovementVolatility));
        assert_eq!(state.effective_cooldown_seconds, 360.0);

        let state = throttle.update(&sample(5.0, 60.0, deadline), &settings, deadline);
        assert!(!state.cues_paused);
        assert_eq!(state.effective_cooldown_seconds, 120.0);
    }

    #[test]
    fn moderate_volatility_puts_cues_on_watchlist() {
        // Heart-rate threshold at sensitivity 0.5 is 15 (hard trigger 18).
        let settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);

        throttle.update(&sample(5.0, 50.0, 0), &settings, 0);
        let state = throttle.update(&sample(5.0, 82.0, 1_000), &settings, 1_000).clone();

        assert!((state.hr_volatility - 16.0).abs() < 1e-9);
        assert!(!state.cues_paused);
        assert_eq!(state.reason, Some(ThrottleReason::Watchlist));
        assert_eq!(state.effective_cooldown_seconds, 180.0);
    }

    #[test]
    fn heart_rate_trigger_is_named_when_movement_is_calm() {
        let settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);

        throttle.update(&sample(5.0, 40.0, 0), &settings, 0);
        let state = throttle.update(&sample(5.0, 100.0, 1_000), &settings, 1_000);

        assert!(state.cues_paused);
        assert_eq!(state.reason, Some(ThrottleReason::HeartRateVolatility));
    }

    #[test]
    fn new_base_cooldown_keeps_the_current_tier() {
        let mut settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);
        throttle.update(&sample(5.0, 60.0, 0), &settings, 0);

        settings.min_seconds_between_cues = 10.0;
        throttle.apply_settings(&settings);
        assert_eq!(throttle.state().effective_cooldown_seconds, 10.0);

        throttle.update(&sample(5.0, 92.0, 1_000), &settings, 1_000);
        assert_eq!(throttle.state().reason, Some(ThrottleReason::Watchlist));
        settings.min_seconds_between_cues = 40.0;
        throttle.apply_settings(&settings);
        assert_eq!(throttle.state().effective_cooldown_seconds, 60.0);

        throttle.update(&sample(100.0, 60.0, 2_000), &settings, 2_000);
        assert!(throttle.state().cues_paused);
        settings.min_seconds_between_cues = 20.0;
        throttle.apply_settings(&settings);
        assert!(throttle.state().cues_paused);
        assert_eq!(throttle.state().effective_cooldown_seconds, 60.0);
    }

    #[test]
    fn disabling_clears_an_open_pause() {
        let mut settings = adaptive_settings();
        let mut throttle = AdaptiveThrottle::new(&settings);
        throttle.update(&sample(0.0, 60.0, 0), &settings, 0);
        throttle.update(&sample(100.0, 60.0, 1_000), &settings, 1_000);
        assert!(throttle.paused_until() > 0);

        settings.adaptive_mode_enabled = false;
        let state = throttle.update(&sample(5.0, 60.0, 2_000), &settings, 2_000);
        assert!(!state.cues_paused);
        assert!(!state.enabled);
        assert_eq!(throttle.paused_until(), 0);
    }
}

//! Safety rules that decide whether a cue may play for a given sample.

use serde::Serialize;
use thiserror::Error;

use crate::models::{Sample, Session, SleepStage};

use super::{config::CueSettings, throttle::AdaptiveState};

/// Samples older than this must not drive a cue decision.
pub const MAX_SAMPLE_AGE_MS: i64 = 15_000;

/// Rule that blocked a cue. Checked in declaration order; the first failing rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum DenyReason {
    #[error("adaptive pause is active")]
    AdaptivePause,
    #[error("sample is older than 15 seconds")]
    StaleSample,
    #[error("sleep stage {0} is not a cue window")]
    UnsafeStage(SleepStage),
    #[error("movement above threshold")]
    Movement,
    #[error("heart rate spike")]
    HeartRateSpike,
    #[error("cooldown has not elapsed")]
    Cooldown,
    #[error("session cue limit reached")]
    SessionCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CueDecision {
    Allowed,
    Denied(DenyReason),
}

impl CueDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CueDecision::Allowed)
    }
}

/// Pure decision over the current sample and session counters.
pub fn evaluate(
    sample: &Sample,
    session: &Session,
    last_heart_rate: f64,
    last_cue_timestamp: i64,
    adaptive: &AdaptiveState,
    settings: &CueSettings,
    now: i64,
) -> CueDecision {
    use CueDecision::Denied;

    if adaptive.cues_paused {
        return Denied(DenyReason::AdaptivePause);
    }

    if now.saturating_sub(sample.timestamp) > MAX_SAMPLE_AGE_MS {
        return Denied(DenyReason::StaleSample);
    }

    if !sample.sleep_stage.is_cue_safe() {
        return Denied(DenyReason::UnsafeStage(sample.sleep_stage));
    }

    if sample.movement > settings.movement_threshold {
        return Denied(DenyReason::Movement);
    }

    if (sample.heart_rate - last_heart_rate).abs() > settings.hr_spike_threshold {
        return Denied(DenyReason::HeartRateSpike);
    }

    if last_cue_timestamp > 0 {
        let seconds_since_cue = now.saturating_sub(last_cue_timestamp) as f64 / 1000.0;
        if seconds_since_cue < adaptive.effective_cooldown_seconds {
            return Denied(DenyReason::Cooldown);
        }
    }

    if session.cues_played.len() >= settings.max_cues_per_session as usize {
        return Denied(DenyReason::SessionCap);
    }

    CueDecision::Allowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CuePlayEvent;

    fn light_sample(timestamp: i64) -> Sample {
        Sample {
            heart_rate: 62.0,
            movement: 10.0,
            temperature: 36.4,
            sleep_stage: SleepStage::Light,
            timestamp,
        }
    }

    fn session() -> Session {
        Session::new("s".into(), 0, None, None)
    }

    fn check(sample: &Sample, session: &Session, last_cue: i64, now: i64) -> CueDecision {
        let settings = CueSettings::default();
        let adaptive = AdaptiveState::disabled(&settings);
        evaluate(sample, session, 60.0, last_cue, &adaptive, &settings, now)
    }

    fn capped_session() -> Session {
        let mut session = session();
        for i in 0..10 {
            session.cues_played.push(CuePlayEvent {
                timestamp: 0,
                cue_id: format!("cue-{i}"),
                cue_name: "tone".into(),
                sleep_stage_at_play: SleepStage::Deep,
            });
        }
        session
    }

    #[test]
    fn awake_and_rem_are_always_denied() {
        let now = 500_000;
        for stage in [SleepStage::Awake, SleepStage::Rem] {
            for movement in [0.0, 10.0, 95.0] {
                for heart_rate in [60.0, 62.0, 120.0] {
                    for last_cue in [0, 1, now - 1_000] {
                        for ledger in [session(), capped_session()] {
                            let sample = Sample {
                                sleep_stage: stage,
                                movement,
                                heart_rate,
                                ..light_sample(now)
                            };
                            assert_eq!(
                                check(&sample, &ledger, last_cue, now),
                                CueDecision::Denied(DenyReason::UnsafeStage(stage)),
                                "movement {movement}, hr {heart_rate}, last cue {last_cue}"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn extreme_timestamps_do_not_wrap() {
        assert_eq!(
            check(&light_sample(i64::MIN), &session(), 0, 1_700_000_005_000),
            CueDecision::Denied(DenyReason::StaleSample)
        );

        // Wrapping subtraction would put this cue 200 s in the past.
        let now = i64::MIN + 200_000;
        assert_eq!(
            check(&light_sample(now), &session(), i64::MAX, now),
            CueDecision::Denied(DenyReason::Cooldown)
        );
    }

    #[test]
    fn cooldown_window_from_last_cue() {
        // Cue at t=1ms (a zero timestamp means "never").
        let last_cue = 1;
        let early = light_sample(100_000);
        assert_eq!(
            check(&early, &session(), last_cue, 100_000),
            CueDecision::Denied(DenyReason::Cooldown)
        );

        let later = light_sample(130_000);
        assert_eq!(check(&later, &session(), last_cue, 130_000), CueDecision::Allowed);
    }

    #[test]
    fn stale_samples_are_denied() {
        let sample = light_sample(0);
        assert_eq!(
            check(&sample, &session(), 0, MAX_SAMPLE_AGE_MS + 1),
            CueDecision::Denied(DenyReason::StaleSample)
        );
        assert!(check(&sample, &session(), 0, MAX_SAMPLE_AGE_MS).is_allowed());
    }

    #[test]
    fn movement_and_heart_rate_spikes_block() {
        let restless = Sample {
            movement: 31.0,
            ..light_sample(0)
        };
        assert_eq!(
            check(&restless, &session(), 0, 0),
            CueDecision::Denied(DenyReason::Movement)
        );

        let spiking = Sample {
            heart_rate: 81.0,
            ..light_sample(0)
        };
        assert_eq!(
            check(&spiking, &session(), 0, 0),
            CueDecision::Denied(DenyReason::HeartRateSpike)
        );
    }

    #[test]
    fn session_cap_blocks_further_cues() {
        assert_eq!(
            check(&light_sample(0), &capped_session(), 0, 0),
            CueDecision::Denied(DenyReason::SessionCap)
        );
    }

    #[test]
    fn adaptive_pause_is_reported_first() {
        let settings = CueSettings::default();
        let adaptive = AdaptiveState {
            cues_paused: true,
            ..AdaptiveState::disabled(&settings)
        };
        let awake = Sample {
            sleep_stage: SleepStage::Awake,
            ..light_sample(0)
        };
        let decision = evaluate(&awake, &session(), 60.0, 0, &adaptive, &settings, 50_000);
        assert_eq!(decision, CueDecision::Denied(DenyReason::AdaptivePause));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let sample = light_sample(5_000);
        let session = session();
        let first = check(&sample, &session, 0, 6_000);
        let second = check(&sample, &session, 0, 6_000);
        assert_eq!(first, second);
    }
}

use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;
const FADE_SECS: f32 = 0.15;

/// Short mono sine burst with linear fade in/out, so a cue never clicks.
pub struct CueTone {
    freq: f32,
    total_samples: usize,
    fade_samples: usize,
    num_sample: usize,
}

impl CueTone {
    pub fn new(freq: f32, duration: Duration) -> Self {
        let total_samples = (duration.as_secs_f32() * SAMPLE_RATE as f32) as usize;
        Self {
            freq,
            total_samples,
            fade_samples: ((FADE_SECS * SAMPLE_RATE as f32) as usize).min(total_samples / 2),
            num_sample: 0,
        }
    }

    fn envelope(&self) -> f32 {
        let from_end = self.total_samples - self.num_sample;
        let edge = self.num_sample.min(from_end);
        if self.fade_samples == 0 || edge >= self.fade_samples {
            1.0
        } else {
            edge as f32 / self.fade_samples as f32
        }
    }
}

impl Iterator for CueTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }

        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        let sample = (2.0 * PI * self.freq * t).sin() * self.envelope();
        self.num_sample += 1;

        Some(sample * 0.5)
    }
}

impl Source for CueTone {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / SAMPLE_RATE as f32,
        ))
    }
}

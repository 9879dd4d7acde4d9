//! Feedback Delay
//!
//! Interpolated delay line with a smoothed delay time, a one-pole tone filter
//! in the feedback path and a soft clip on the recirculated signal.
//!
//! The line is read before it is written, so a delay of `D` samples returns
//! exactly `x[n - D]` when `D` is an integer and feedback is zero.

use crate::dsp::ring_buffer::RingBuffer;
use crate::dsp::utils::{one_pole_coeff, soft_clip};

// Longest delay time (s).
pub const MAX_DELAY_S: f32 = 2.0;
// Largest feedback gain at 100 %.
// Must not change: keeps the loop below unity before the tone filter.
const FEEDBACK_CEILING: f32 = 0.95;
// Delay-time glide coefficient per sample.
// Increasing: slower glide (less pitch wobble); decreasing: snappier changes.
const TIME_SMOOTHING: f32 = 0.999;
// Glide distance (samples) under which the delay time locks onto its target.
const TIME_SNAP: f32 = 1e-3;
// Tone filter cutoff at which the feedback path is left unfiltered (Hz).
const TONE_BYPASS_HZ: f32 = 20000.0;

#[derive(Debug, Clone, Copy)]
pub struct DelaySettings {
    pub time_s: f32,
    /// 0..100 %
    pub feedback: f32,
    /// 0..100 %
    pub mix: f32,
    pub lowpass_hz: f32,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            time_s: 0.25,
            feedback: 30.0,
            mix: 30.0,
            lowpass_hz: 20000.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Delay {
    target_samples: f32,
    feedback: f32,
    mix: f32,
    tone: f32,
}

#[derive(Debug, Clone)]
pub struct DelayState {
    line: RingBuffer,
    current: f32,
    snapped: bool,
    tone_z: f32,
}

impl DelayState {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            line: RingBuffer::new((MAX_DELAY_S * sample_rate) as usize + 4),
            current: 0.0,
            snapped: false,
            tone_z: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.current = 0.0;
        self.snapped = false;
        self.tone_z = 0.0;
    }
}

impl Delay {
    pub fn new(settings: &DelaySettings, sample_rate: f32) -> Self {
        let max = MAX_DELAY_S * sample_rate;
        Self {
            target_samples: (settings.time_s * sample_rate).clamp(1.0, max),
            feedback: settings.feedback.clamp(0.0, 100.0) * FEEDBACK_CEILING / 100.0,
            mix: (settings.mix / 100.0).clamp(0.0, 1.0),
            tone: if settings.lowpass_hz >= TONE_BYPASS_HZ.min(0.49 * sample_rate) {
                0.0
            } else {
                one_pole_coeff(settings.lowpass_hz, sample_rate)
            },
        }
    }

    #[inline]
    pub fn process(&self, state: &mut DelayState, input: f32) -> f32 {
        if state.snapped {
            state.current =
                TIME_SMOOTHING * state.current + (1.0 - TIME_SMOOTHING) * self.target_samples;
            if (state.current - self.target_samples).abs() < TIME_SNAP {
                state.current = self.target_samples;
            }
        } else {
            state.current = self.target_samples;
            state.snapped = true;
        }

        // The newest stored sample is already one sample old when read here
        let delayed = state.line.read_interpolated(state.current - 1.0);

        state.tone_z = delayed + self.tone * (state.tone_z - delayed);
        let recirculated = soft_clip(state.tone_z * self.feedback);
        state.line.write(input + recirculated);

        input * (1.0 - self.mix) + delayed * self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_zero_feedback_is_pure_delay() {
        let settings = DelaySettings {
            time_s: 100.0 / SR,
            feedback: 0.0,
            mix: 40.0,
            lowpass_hz: 20000.0,
        };
        let d = Delay::new(&settings, SR);
        let mut st = DelayState::new(SR);
        let x: Vec<f32> = (0..1000).map(|n| ((n * 7919) % 101) as f32 / 101.0 - 0.5).collect();
        for (n, &xn) in x.iter().enumerate() {
            let y = d.process(&mut st, xn);
            let past = if n >= 100 { x[n - 100] } else { 0.0 };
            let expected = xn * 0.6 + past * 0.4;
            assert!((y - expected).abs() < 1e-5, "n={n} {y} {expected}");
        }
    }

    #[test]
    fn test_fractional_delay_tracks_shifted_sine() {
        // 10.37 ms is 497.76 samples at 48 kHz
        let settings = DelaySettings {
            time_s: 0.01037,
            feedback: 0.0,
            mix: 100.0,
            lowpass_hz: 20000.0,
        };
        let d = Delay::new(&settings, SR);
        let mut st = DelayState::new(SR);
        let delay = 0.01037 * SR;
        let w = 2.0 * std::f32::consts::PI * 1000.0 / SR;
        let mut max_err = 0.0f32;
        for n in 0..4000 {
            let y = d.process(&mut st, (w * n as f32).sin());
            if n as f32 > delay + 3.0 {
                let expected = (w * (n as f32 - delay)).sin();
                max_err = max_err.max((y - expected).abs());
            }
        }
        assert!(max_err < 1e-3, "max error {max_err}");
    }

    #[test]
    fn test_short_fractional_delay_interpolates() {
        // 1.5 samples: the read sits between the two newest stored samples
        let settings = DelaySettings {
            time_s: 1.5 / SR,
            feedback: 0.0,
            mix: 100.0,
            lowpass_hz: 20000.0,
        };
        let d = Delay::new(&settings, SR);
        let mut st = DelayState::new(SR);
        let x: Vec<f32> = (0..64).map(|n| n as f32 * 0.01).collect();
        for (n, &xn) in x.iter().enumerate() {
            let y = d.process(&mut st, xn);
            if n >= 2 {
                let expected = (n as f32 - 1.5) * 0.01;
                assert!((y - expected).abs() < 1e-5, "n={n} {y} {expected}");
            }
        }
    }

    #[test]
    fn test_feedback_echoes_decay() {
        let settings = DelaySettings {
            time_s: 0.01,
            feedback: 100.0,
            mix: 100.0,
            lowpass_hz: 20000.0,
        };
        let d = Delay::new(&settings, SR);
        let mut st = DelayState::new(SR);
        let period = (0.01 * SR) as usize;
        let mut echoes = Vec::new();
        for n in 0..(period * 6 + 1) {
            let y = d.process(&mut st, if n == 0 { 1.0 } else { 0.0 });
            if n > 0 && n % period == 0 {
                echoes.push(y);
            }
        }
        for pair in echoes.windows(2) {
            assert!(pair[1] < pair[0]);
            assert!((pair[1] / pair[0] - FEEDBACK_CEILING).abs() < 1e-3);
        }
    }

    #[test]
    fn test_runaway_input_stays_bounded() {
        let settings = DelaySettings {
            time_s: 0.001,
            feedback: 100.0,
            mix: 100.0,
            lowpass_hz: 2000.0,
        };
        let d = Delay::new(&settings, SR);
        let mut st = DelayState::new(SR);
        for _ in 0..(SR as usize) {
            let y = d.process(&mut st, 1.0);
            assert!(y.is_finite() && y.abs() < 50.0);
        }
    }
}

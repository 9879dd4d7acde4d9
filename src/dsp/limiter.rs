//! True-Peak Limiter
//!
//! # Perceptual Contract
//! - **Target Source**: Final output signal.
//! - **Intended Effect**: Hold sample and inter-sample peaks under the ceiling.
//! - **Failure Modes**:
//!   - Audible crunch if driven far past the ceiling (>6 dB gain reduction).
//! - **Will Not Do**:
//!   - Color the sound (only gain changes).
//!   - Provide "glue" compression (this is purely for safety).
//!
//! # Algorithm
//! 1. Each input sample enters a lookahead delay line.
//! 2. The sidechain peak is the larger of `|x[n]|` and a 4-point cubic estimate
//!    of the midpoint between `x[n-2]` and `x[n-1]`.
//! 3. A per-sample target gain (`ceiling / peak`, or 1) goes into a parallel ring.
//! 4. The minimum target over the lookahead window becomes the envelope
//!    instantly when it is lower; otherwise the envelope releases toward it.
//! 5. The delayed sample is scaled by the envelope, so gain reduction is fully
//!    in place before the peak leaves the line.

use crate::dsp::ring_buffer::RingBuffer;
use crate::dsp::utils::{db_to_lin, lin_to_db, time_constant_coeff};

/// Longest lookahead (ms); sizes the rings at reset.
pub const MAX_LOOKAHEAD_MS: f32 = 5.0;
// Release time constant (ms).
// Increasing: smoother recovery; decreasing: faster, more pumping.
const RELEASE_MS: f32 = 50.0;

#[derive(Debug, Clone, Copy)]
pub struct LimiterSettings {
    pub ceiling_db: f32,
    pub lookahead_ms: f32,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            ceiling_db: -0.1,
            lookahead_ms: 2.0,
        }
    }
}

/// Lookahead in samples for `ms` at `sample_rate`, at least one.
pub fn lookahead_samples(ms: f32, sample_rate: f32) -> usize {
    ((ms.clamp(0.0, MAX_LOOKAHEAD_MS) * sample_rate / 1000.0).round() as usize).max(1)
}

#[derive(Debug, Clone, Copy)]
pub struct TruePeakLimiter {
    ceiling: f32,
    lookahead: usize,
    release: f32,
}

#[derive(Debug, Clone)]
pub struct LimiterState {
    audio: RingBuffer,
    targets: RingBuffer,
    envelope: f32,
}

impl LimiterState {
    pub fn new(sample_rate: f32) -> Self {
        let len = lookahead_samples(MAX_LOOKAHEAD_MS, sample_rate) + 4;
        let mut targets = RingBuffer::new(len);
        targets.fill(1.0);
        Self {
            audio: RingBuffer::new(len),
            targets,
            envelope: 1.0,
        }
    }

    /// Applied gain in dB (≤ 0).
    #[inline]
    pub fn gain_reduction_db(&self) -> f32 {
        lin_to_db(self.envelope)
    }

    pub fn reset(&mut self) {
        self.audio.clear();
        self.targets.fill(1.0);
        self.envelope = 1.0;
    }
}

impl TruePeakLimiter {
    pub fn new(settings: &LimiterSettings, sample_rate: f32) -> Self {
        Self {
            ceiling: db_to_lin(settings.ceiling_db.min(0.0)),
            lookahead: lookahead_samples(settings.lookahead_ms, sample_rate),
            release: time_constant_coeff(RELEASE_MS, sample_rate),
        }
    }

    /// Delay through the lookahead line, in samples.
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.lookahead
    }

    #[inline]
    fn window_min_gain(&self, state: &LimiterState) -> f32 {
        let mut min = 1.0_f32;
        for k in 0..=self.lookahead {
            min = min.min(state.targets.read_at(k));
        }
        min
    }

    #[inline]
    pub fn process(&self, state: &mut LimiterState, input: f32) -> f32 {
        state.audio.write(input);

        let mid = -0.0625 * state.audio.read_at(3)
            + 0.5625 * state.audio.read_at(2)
            + 0.5625 * state.audio.read_at(1)
            - 0.0625 * input;
        let peak = input.abs().max(mid.abs());
        let target = if peak > self.ceiling {
            self.ceiling / peak
        } else {
            1.0
        };
        state.targets.write(target);

        let min_gain = self.window_min_gain(state);
        state.envelope = if min_gain < state.envelope {
            min_gain
        } else {
            self.release * (state.envelope - min_gain) + min_gain
        };

        state.audio.read_at(self.lookahead) * state.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: f32 = 48000.0;

    #[test]
    fn test_below_ceiling_is_pure_delay() {
        let lim = TruePeakLimiter::new(&LimiterSettings::default(), SR);
        let mut st = LimiterState::new(SR);
        let l = lim.latency_samples();
        assert_eq!(l, 96);
        let x: Vec<f32> = (0..2000).map(|n| 0.5 * (n as f32 * 0.013).sin()).collect();
        for (n, &xn) in x.iter().enumerate() {
            let y = lim.process(&mut st, xn);
            let expected = if n >= l { x[n - l] } else { 0.0 };
            assert_eq!(y, expected);
        }
    }

    #[test]
    fn test_output_never_exceeds_ceiling() {
        let settings = LimiterSettings {
            ceiling_db: -1.0,
            lookahead_ms: 2.0,
        };
        let ceiling = db_to_lin(-1.0);
        let lim = TruePeakLimiter::new(&settings, SR);
        for &amp in &[1.1f32, 1.5, 2.0] {
            let mut st = LimiterState::new(SR);
            let mut out = Vec::new();
            for n in 0..(SR as usize / 2) {
                // Gated bursts so attack and release are both exercised
                let burst = if (n / 4800) % 2 == 0 { 1.0 } else { 0.2 };
                let x = amp * ceiling * burst * (2.0 * PI * 997.0 * n as f32 / SR).sin();
                let y = lim.process(&mut st, x);
                assert!(y.abs() <= ceiling + 1e-6, "amp={amp} n={n} y={y}");
                out.push(y);
            }
            // Inter-sample estimate of the steady-state output
            let tail = &out[out.len() - 2400..];
            for w in tail.windows(4) {
                let mid = -0.0625 * w[0] + 0.5625 * w[1] + 0.5625 * w[2] - 0.0625 * w[3];
                assert!(mid.abs() <= ceiling * 1.001);
            }
        }
    }

    #[test]
    fn test_releases_after_peak() {
        let lim = TruePeakLimiter::new(&LimiterSettings::default(), SR);
        let mut st = LimiterState::new(SR);
        lim.process(&mut st, 4.0);
        assert!(st.gain_reduction_db() < -10.0);
        for _ in 0..(SR as usize) {
            lim.process(&mut st, 0.0);
        }
        assert!(st.gain_reduction_db() > -0.01);
    }
}

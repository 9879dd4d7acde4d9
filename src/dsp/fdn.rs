//! Reverb (Feedback Delay Network)
//!
//! Eight delay lines mixed through a normalized 8x8 Walsh-Hadamard matrix.
//! The matrix is orthogonal, so with unity feedback and no damping the loop
//! neither gains nor loses energy; `size` pulls feedback below one and
//! lengthens the lines together.
//!
//! # Design Notes
//! - Line lengths are mutually prime at 44.1 kHz and scaled by
//!   `(0.3 + 0.7·size)` and the sample rate, capped at `MAX_LINE_MS`.
//! - Each line has a one-pole damping filter before the mix.
//! - Re-injection is soft-clipped so a runaway loop saturates instead of diverging.

use crate::dsp::reverb::{predelay, predelay_line, predelay_samples, ReverbSettings};
use crate::dsp::ring_buffer::RingBuffer;
use crate::dsp::utils::soft_clip;

pub const LINES: usize = 8;
const BASE_LENGTHS: [usize; LINES] = [1031, 1327, 1523, 1801, 2053, 2311, 2591, 2903];
const TUNING_RATE: f32 = 44100.0;
/// Longest line (ms).
pub const MAX_LINE_MS: f32 = 90.0;
// Extra samples per channel index.
const STEREO_SPREAD: usize = 17;
// Loop feedback at size 0 and the span added by size 100.
const FEEDBACK_BASE: f32 = 0.80;
const FEEDBACK_SPAN: f32 = 0.19;
// Damping pole at 100 %.
// Increasing: darker tail; decreasing: brighter tail.
const DAMP_SCALE: f32 = 0.5;
// Input gain into each line.
const INPUT_GAIN: f32 = 0.35;
// Output sum normalization.
const OUTPUT_GAIN: f32 = 1.0 / LINES as f32;

/// In-place normalized Walsh-Hadamard transform of order 8.
#[inline]
pub fn hadamard8(v: &mut [f32; LINES]) {
    let mut h = 1;
    while h < LINES {
        let mut i = 0;
        while i < LINES {
            for j in i..i + h {
                let a = v[j];
                let b = v[j + h];
                v[j] = a + b;
                v[j + h] = a - b;
            }
            i += h * 2;
        }
        h *= 2;
    }
    let norm = 1.0 / (LINES as f32).sqrt();
    for x in v.iter_mut() {
        *x *= norm;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FdnReverb {
    lengths: [usize; LINES],
    feedback: f32,
    damp: f32,
    mix: f32,
    predelay: usize,
}

#[derive(Debug, Clone)]
pub struct FdnState {
    lines: Vec<RingBuffer>,
    damp_z: [f32; LINES],
    spread: usize,
    max_len: usize,
    predelay: RingBuffer,
}

impl FdnState {
    pub fn new(sample_rate: f32, channel: usize) -> Self {
        let spread = STEREO_SPREAD * channel;
        let max_len = (MAX_LINE_MS * 0.001 * sample_rate) as usize + spread;
        Self {
            lines: (0..LINES).map(|_| RingBuffer::new(max_len + 1)).collect(),
            damp_z: [0.0; LINES],
            spread,
            max_len,
            predelay: predelay_line(sample_rate),
        }
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.damp_z = [0.0; LINES];
        self.predelay.clear();
    }

    /// Sum of squares of everything stored in the loop.
    #[cfg(test)]
    fn line_energy(&self, lengths: &[usize; LINES]) -> f32 {
        let mut e = 0.0;
        for (line, &len) in self.lines.iter().zip(lengths) {
            let len = (len + self.spread).min(self.max_len);
            for k in 0..len {
                let s = line.read_at(k);
                e += s * s;
            }
        }
        e
    }
}

impl FdnReverb {
    pub fn new(settings: &ReverbSettings, sample_rate: f32) -> Self {
        let size = (settings.size / 100.0).clamp(0.0, 1.0);
        let scale = (0.3 + 0.7 * size) * sample_rate / TUNING_RATE;
        let cap = (MAX_LINE_MS * 0.001 * sample_rate) as usize;
        let mut lengths = [1; LINES];
        for (len, &base) in lengths.iter_mut().zip(BASE_LENGTHS.iter()) {
            *len = ((base as f32 * scale).round() as usize).clamp(1, cap);
        }
        Self {
            lengths,
            feedback: FEEDBACK_BASE + FEEDBACK_SPAN * size,
            damp: (settings.damp / 100.0).clamp(0.0, 1.0) * DAMP_SCALE,
            mix: (settings.mix / 100.0).clamp(0.0, 1.0),
            predelay: predelay_samples(settings.predelay_ms, sample_rate),
        }
    }

    #[inline]
    pub fn lengths(&self) -> &[usize; LINES] {
        &self.lengths
    }

    /// Override the loop gain.
    pub fn set_feedback_gain(&mut self, gain: f32) {
        self.feedback = gain;
    }

    pub fn set_damping(&mut self, damp: f32) {
        self.damp = damp.clamp(0.0, 0.99);
    }

    #[inline]
    pub fn process(&self, state: &mut FdnState, input: f32) -> f32 {
        let x = predelay(&mut state.predelay, self.predelay, input);

        let mut taps = [0.0f32; LINES];
        let mut wet = 0.0;
        for i in 0..LINES {
            let len = (self.lengths[i] + state.spread).min(state.max_len);
            let delayed = state.lines[i].read_at(len - 1);
            state.damp_z[i] = delayed * (1.0 - self.damp) + state.damp_z[i] * self.damp;
            taps[i] = state.damp_z[i];
            wet += delayed;
        }

        hadamard8(&mut taps);

        let injected = x * INPUT_GAIN;
        for (line, &m) in state.lines.iter_mut().zip(taps.iter()) {
            line.write(soft_clip(injected + self.feedback * m));
        }

        input * (1.0 - self.mix) + wet * OUTPUT_GAIN * self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_hadamard_is_orthonormal() {
        let mut v = [0.3, -0.1, 0.7, 0.2, -0.5, 0.05, 0.0, 0.9];
        let before: f32 = v.iter().map(|x| x * x).sum();
        hadamard8(&mut v);
        let after: f32 = v.iter().map(|x| x * x).sum();
        assert!((before - after).abs() < 1e-5);
        // Self-inverse once normalized
        hadamard8(&mut v);
        assert!((v[2] - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_lossless_loop_conserves_energy() {
        let settings = ReverbSettings {
            mix: 100.0,
            predelay_ms: 0.0,
            ..ReverbSettings::default()
        };
        let mut fdn = FdnReverb::new(&settings, SR);
        fdn.set_feedback_gain(1.0);
        fdn.set_damping(0.0);
        let mut st = FdnState::new(SR, 0);

        fdn.process(&mut st, 0.1);
        let initial = st.line_energy(fdn.lengths());
        assert!(initial > 0.0);
        for _ in 0..(SR as usize) {
            fdn.process(&mut st, 0.0);
        }
        let later = st.line_energy(fdn.lengths());
        assert!((later / initial - 1.0).abs() < 1e-3, "{initial} -> {later}");
    }

    #[test]
    fn test_tail_decays_with_default_feedback() {
        let settings = ReverbSettings {
            mix: 100.0,
            predelay_ms: 0.0,
            ..ReverbSettings::default()
        };
        let fdn = FdnReverb::new(&settings, SR);
        let mut st = FdnState::new(SR, 0);
        fdn.process(&mut st, 1.0);
        for _ in 0..(SR as usize * 4) {
            fdn.process(&mut st, 0.0);
        }
        assert!(st.line_energy(fdn.lengths()) < 1e-6);
    }

    #[test]
    fn test_lengths_capped() {
        let settings = ReverbSettings {
            size: 100.0,
            ..ReverbSettings::default()
        };
        let fdn = FdnReverb::new(&settings, 192000.0);
        let cap = (MAX_LINE_MS * 0.001 * 192000.0) as usize;
        assert!(fdn.lengths().iter().all(|&l| l <= cap));
    }
}

//! Reverb (Schroeder)
//!
//! Classic parallel-comb / series-allpass room: eight damped feedback combs
//! summed and diffused through four allpasses. Kept as the lighter of the two
//! selectable algorithms; `fdn` holds the denser one.
//!
//! # Design Notes
//! - Comb lengths follow the Freeverb tunings at 44.1 kHz, scaled to the
//!   running sample rate. Each channel is detuned by `STEREO_SPREAD` samples
//!   per channel index so left and right decorrelate.
//! - Size only changes feedback; the lines themselves are fixed at reset.

use crate::dsp::ring_buffer::RingBuffer;

const COMB_TUNING: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_TUNING: [usize; 4] = [556, 441, 341, 225];
const TUNING_RATE: f32 = 44100.0;
// Extra samples per channel index.
const STEREO_SPREAD: usize = 23;
// Comb feedback at size 0 and the span added by size 100.
const FEEDBACK_BASE: f32 = 0.7;
const FEEDBACK_SPAN: f32 = 0.28;
// Damping at 100 %.
// Increasing: darker tail; decreasing: brighter tail.
const DAMP_SCALE: f32 = 0.4;
// Comb sum normalization.
// Must not change: 1 / comb count.
const COMB_SUM_GAIN: f32 = 0.125;
const ALLPASS_GAIN: f32 = 0.5;
/// Longest predelay (ms), shared with the FDN.
pub const MAX_PREDELAY_MS: f32 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbAlgorithm {
    Schroeder,
    Fdn,
}

impl ReverbAlgorithm {
    pub fn from_index(index: i32) -> Self {
        match index {
            0 => Self::Schroeder,
            _ => Self::Fdn,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReverbSettings {
    /// 0..100
    pub size: f32,
    /// 0..100
    pub damp: f32,
    /// 0..100 %
    pub mix: f32,
    pub predelay_ms: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            size: 50.0,
            damp: 50.0,
            mix: 40.0,
            predelay_ms: 20.0,
        }
    }
}

/// Predelay length in samples for `ms`, capped at `MAX_PREDELAY_MS`.
pub(crate) fn predelay_samples(ms: f32, sample_rate: f32) -> usize {
    (ms.clamp(0.0, MAX_PREDELAY_MS) * 0.001 * sample_rate).round() as usize
}

pub(crate) fn predelay_line(sample_rate: f32) -> RingBuffer {
    RingBuffer::new((MAX_PREDELAY_MS * 0.001 * sample_rate) as usize + 2)
}

/// Write `input` into the predelay line and return the sample `samples` old.
#[inline]
pub(crate) fn predelay(line: &mut RingBuffer, samples: usize, input: f32) -> f32 {
    if samples == 0 {
        return input;
    }
    let out = line.read_at(samples - 1);
    line.write(input);
    out
}

#[derive(Debug, Clone, Copy)]
pub struct SchroederReverb {
    feedback: f32,
    damp: f32,
    mix: f32,
    predelay: usize,
}

#[derive(Debug, Clone)]
struct Comb {
    line: RingBuffer,
    len: usize,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            line: RingBuffer::new(len + 1),
            len,
            store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let out = self.line.read_at(self.len - 1);
        self.store = out * (1.0 - damp) + self.store * damp;
        self.line.write(input + self.store * feedback);
        out
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    line: RingBuffer,
    len: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            line: RingBuffer::new(len + 1),
            len,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.line.read_at(self.len - 1);
        let v = input + ALLPASS_GAIN * delayed;
        self.line.write(v);
        delayed - ALLPASS_GAIN * v
    }
}

/// One channel's combs, allpasses and predelay line.
#[derive(Debug, Clone)]
pub struct SchroederState {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    predelay: RingBuffer,
}

impl SchroederState {
    pub fn new(sample_rate: f32, channel: usize) -> Self {
        let scale = sample_rate / TUNING_RATE;
        let spread = STEREO_SPREAD * channel;
        let scaled = |len: usize| (((len + spread) as f32 * scale).round() as usize).max(1);
        Self {
            combs: COMB_TUNING.iter().map(|&l| Comb::new(scaled(l))).collect(),
            allpasses: ALLPASS_TUNING.iter().map(|&l| Allpass::new(scaled(l))).collect(),
            predelay: predelay_line(sample_rate),
        }
    }

    pub fn reset(&mut self) {
        for c in &mut self.combs {
            c.line.clear();
            c.store = 0.0;
        }
        for a in &mut self.allpasses {
            a.line.clear();
        }
        self.predelay.clear();
    }
}

impl SchroederReverb {
    pub fn new(settings: &ReverbSettings, sample_rate: f32) -> Self {
        let size = (settings.size / 100.0).clamp(0.0, 1.0);
        Self {
            feedback: FEEDBACK_BASE + FEEDBACK_SPAN * size,
            damp: (settings.damp / 100.0).clamp(0.0, 1.0) * DAMP_SCALE,
            mix: (settings.mix / 100.0).clamp(0.0, 1.0),
            predelay: predelay_samples(settings.predelay_ms, sample_rate),
        }
    }

    #[inline]
    pub fn process(&self, state: &mut SchroederState, input: f32) -> f32 {
        let x = predelay(&mut state.predelay, self.predelay, input);

        let mut sum = 0.0;
        for comb in &mut state.combs {
            sum += comb.process(x, self.feedback, self.damp);
        }
        let mut wet = sum * COMB_SUM_GAIN;
        for ap in &mut state.allpasses {
            wet = ap.process(wet);
        }

        input * (1.0 - self.mix) + wet * self.mix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn wet_only() -> ReverbSettings {
        ReverbSettings {
            mix: 100.0,
            predelay_ms: 0.0,
            ..ReverbSettings::default()
        }
    }

    #[test]
    fn test_impulse_tail_decays() {
        let rv = SchroederReverb::new(&wet_only(), SR);
        let mut st = SchroederState::new(SR, 0);
        let window = SR as usize / 4;
        let mut energies = Vec::new();
        let mut acc = 0.0f32;
        for n in 0..(window * 12) {
            let y = rv.process(&mut st, if n == 0 { 1.0 } else { 0.0 });
            acc += y * y;
            if (n + 1) % window == 0 {
                energies.push(acc);
                acc = 0.0;
            }
        }
        assert!(energies[0] > 0.0);
        assert!(energies[11] < energies[1]);
        assert!(energies[11] < 1e-4 * energies[0]);
    }

    #[test]
    fn test_predelay_holds_back_the_tail() {
        let settings = ReverbSettings {
            predelay_ms: 50.0,
            ..wet_only()
        };
        let rv = SchroederReverb::new(&settings, SR);
        let mut st = SchroederState::new(SR, 0);
        let hold = predelay_samples(50.0, SR);
        for n in 0..hold {
            let y = rv.process(&mut st, if n == 0 { 1.0 } else { 0.0 });
            assert_eq!(y, 0.0);
        }
    }

    #[test]
    fn test_channels_are_detuned() {
        let a = SchroederState::new(SR, 0);
        let b = SchroederState::new(SR, 1);
        assert!(a.combs[0].len < b.combs[0].len);
    }

    #[test]
    fn test_zero_mix_is_dry() {
        let settings = ReverbSettings {
            mix: 0.0,
            ..ReverbSettings::default()
        };
        let rv = SchroederReverb::new(&settings, SR);
        let mut st = SchroederState::new(SR, 0);
        for n in 0..2000 {
            let x = (n as f32 * 0.1).sin();
            assert_eq!(rv.process(&mut st, x), x);
        }
    }
}

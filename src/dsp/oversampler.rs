//! 4x Oversampler
//!
//! Polyphase windowed-sinc interpolator and decimator bracketing the nonlinear
//! stages of the chain (gate through saturator).
//!
//! # Design Notes
//! - One 64-tap Blackman-windowed sinc, cutoff at 1/8 of the oversampled rate
//!   (the base-rate Nyquist), normalized to unity DC. Shared by both directions.
//! - Upsampling: the four phases are strided dot products of 16 taps each over
//!   the base-rate history, scaled by the factor to restore gain.
//! - Downsampling: one full 64-tap convolution per base-rate output over the
//!   oversampled history; the other three outputs are never computed.
//! - Each direction is linear phase with a 31.5-sample group delay at the
//!   oversampled rate. Decimating on the last phase of each group puts the round
//!   trip at 15 base-rate samples; the upsampler reads its history one sample
//!   late so it lands on a whole `LATENCY`.

use std::f64::consts::PI;

use crate::dsp::ring_buffer::RingBuffer;

pub const FACTOR: usize = 4;
pub const TAPS: usize = 64;
const PHASE_TAPS: usize = TAPS / FACTOR;
// Normalized cutoff (cycles per oversampled sample).
const CUTOFF: f64 = 0.125;
// Base-rate padding applied on the way up.
const ALIGN: usize = 1;
/// Round-trip latency in base-rate samples.
pub const LATENCY: usize = 16;

#[derive(Debug, Clone)]
pub struct Oversampler {
    taps: [f32; TAPS],
}

#[derive(Debug, Clone)]
pub struct OversamplerState {
    up_history: RingBuffer,
    down_history: RingBuffer,
}

impl Default for OversamplerState {
    fn default() -> Self {
        Self {
            up_history: RingBuffer::new(PHASE_TAPS + ALIGN),
            down_history: RingBuffer::new(TAPS),
        }
    }
}

impl OversamplerState {
    pub fn reset(&mut self) {
        self.up_history.clear();
        self.down_history.clear();
    }
}

impl Default for Oversampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Oversampler {
    pub fn new() -> Self {
        let mut taps = [0.0f64; TAPS];
        let center = (TAPS - 1) as f64 / 2.0;
        let m = (TAPS - 1) as f64;
        for (n, tap) in taps.iter_mut().enumerate() {
            let t = n as f64 - center;
            let arg = 2.0 * CUTOFF * t;
            let sinc = if arg.abs() < 1e-12 {
                1.0
            } else {
                (PI * arg).sin() / (PI * arg)
            };
            let w = 0.42 - 0.5 * (2.0 * PI * n as f64 / m).cos()
                + 0.08 * (4.0 * PI * n as f64 / m).cos();
            *tap = 2.0 * CUTOFF * sinc * w;
        }
        let sum: f64 = taps.iter().sum();
        let mut out = [0.0f32; TAPS];
        for (o, t) in out.iter_mut().zip(taps.iter()) {
            *o = (t / sum) as f32;
        }
        Self { taps: out }
    }

    #[inline]
    pub fn taps(&self) -> &[f32; TAPS] {
        &self.taps
    }

    /// Produce `FACTOR` oversampled samples from one base-rate sample.
    #[inline]
    pub fn upsample(&self, state: &mut OversamplerState, input: f32) -> [f32; FACTOR] {
        state.up_history.write(input);
        let mut out = [0.0f32; FACTOR];
        for (p, o) in out.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in 0..PHASE_TAPS {
                acc += self.taps[FACTOR * k + p] * state.up_history.read_at(k + ALIGN);
            }
            *o = acc * FACTOR as f32;
        }
        out
    }

    /// Collapse `FACTOR` oversampled samples back into one base-rate sample.
    #[inline]
    pub fn downsample(&self, state: &mut OversamplerState, input: &[f32; FACTOR]) -> f32 {
        for &x in input {
            state.down_history.write(x);
        }
        let mut acc = 0.0;
        for (k, &h) in self.taps.iter().enumerate() {
            acc += h * state.down_history.read_at(k);
        }
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taps_normalized_and_symmetric() {
        let os = Oversampler::new();
        let sum: f32 = os.taps().iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for n in 0..TAPS / 2 {
            assert!((os.taps()[n] - os.taps()[TAPS - 1 - n]).abs() < 1e-7);
        }
    }

    #[test]
    fn test_dc_round_trip_unity() {
        let os = Oversampler::new();
        let mut st = OversamplerState::default();
        let mut y = 0.0;
        for _ in 0..256 {
            let up = os.upsample(&mut st, 0.5);
            y = os.downsample(&mut st, &up);
        }
        assert!((y - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_round_trip_latency() {
        let os = Oversampler::new();
        let mut st = OversamplerState::default();
        let mut out = Vec::new();
        for n in 0..64 {
            let up = os.upsample(&mut st, if n == 0 { 1.0 } else { 0.0 });
            out.push(os.downsample(&mut st, &up));
        }
        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(LATENCY));
    }

    #[test]
    fn test_passband_sine_survives() {
        let os = Oversampler::new();
        let mut st = OversamplerState::default();
        let mut peak = 0.0f32;
        for n in 0..4800 {
            let x = (2.0 * std::f32::consts::PI * 1000.0 * n as f32 / 48000.0).sin();
            let up = os.upsample(&mut st, x);
            let y = os.downsample(&mut st, &up);
            if n > 100 {
                peak = peak.max(y.abs());
            }
        }
        assert!((peak - 1.0).abs() < 0.01);
    }
}

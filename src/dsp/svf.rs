//! ZDF/TPT State-Variable Filter
//!
//! Trapezoidal-integration two-pole filter (Zavalishin topology). Unlike the
//! cookbook biquad it keeps its amplitude and phase response near Nyquist, which
//! matters for the de-esser crossover and the input tone filter when the
//! oversampler is bypassed.
//!
//! # Design Notes
//! - `SvfCoeffs` holds the prewarped `g`, damping `R` and peaking gain; shared
//!   across channels.
//! - `SvfState` holds the two integrator states `s1`, `s2`.

use std::f64::consts::PI;

use crate::dsp::biquad::MIN_Q;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvfKind {
    HighPass,
    Peaking,
    LowPass,
}

#[derive(Debug, Clone, Copy)]
pub struct SvfCoeffs {
    kind: SvfKind,
    g: f32,
    two_r: f32,
    // 1 / (1 + 2Rg + g²)
    norm: f32,
    // (A² - 1) for the peaking output
    peak_gain: f32,
}

impl SvfCoeffs {
    pub fn new(kind: SvfKind, freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let nyquist_guard = sample_rate as f64 * 0.4999;
        let freq = (freq as f64).clamp(1.0, nyquist_guard);
        let g = (PI * freq / sample_rate as f64).tan();
        let r = 1.0 / (2.0 * q.max(MIN_Q) as f64);
        let a = 10.0_f64.powf(gain_db as f64 / 40.0);

        Self {
            kind,
            g: g as f32,
            two_r: (2.0 * r) as f32,
            norm: (1.0 / (1.0 + 2.0 * r * g + g * g)) as f32,
            peak_gain: (a * a - 1.0) as f32,
        }
    }

    #[inline]
    pub fn process(&self, state: &mut SvfState, x: f32) -> f32 {
        let hp = (x - (self.two_r + self.g) * state.s1 - state.s2) * self.norm;
        let bp = self.g * hp + state.s1;
        let lp = self.g * bp + state.s2;

        state.s1 = 2.0 * bp - state.s1;
        state.s2 = 2.0 * lp - state.s2;

        match self.kind {
            SvfKind::HighPass => hp,
            SvfKind::LowPass => lp,
            SvfKind::Peaking => x + self.peak_gain * bp * self.two_r,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvfState {
    s1: f32,
    s2: f32,
}

impl SvfState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

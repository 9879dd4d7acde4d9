//! Biquad Filter Implementation (IIR 2nd Order, RBJ cookbook)
//!
//! Second-order recursive filter used for the EQ bands, the saturator tone
//! shelves and the normalizer mud band.
//!
//! # Design Notes
//! - Coefficients (`BiquadCoeffs`) are shared across channels; delay taps
//!   (`BiquadState`) live in each channel's state arena.
//! - Coefficients are only recomputed when a parameter changes.
//! - Q is floored at `MIN_Q` so narrow settings can never go unstable.
//! - Coefficients and taps are kept in double precision: low cutoffs at the
//!   4x oversampled rate put the poles very close to z = 1.
//! - All operations are safe for the audio thread (no allocations).

use std::f64::consts::PI;

/// Smallest Q accepted by the coefficient design.
pub const MIN_Q: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    LowShelf,
    HighShelf,
    Peaking,
    LowPass,
    HighPass,
}

/// Normalized coefficients (a0 divided out).
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::identity()
    }
}

impl BiquadCoeffs {
    /// Pass-through filter.
    pub const fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    pub fn new(kind: BiquadKind, freq: f32, q: f32, gain_db: f32, sample_rate: f32) -> Self {
        let sample_rate = sample_rate as f64;
        let freq = (freq as f64).clamp(1.0, sample_rate * 0.499);
        let q = q.max(MIN_Q) as f64;

        let a = 10.0_f64.powf(gain_db as f64 / 40.0);
        let w0 = 2.0 * PI * freq / sample_rate;
        let cw0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadKind::LowPass => (
                (1.0 - cw0) * 0.5,
                1.0 - cw0,
                (1.0 - cw0) * 0.5,
                1.0 + alpha,
                -2.0 * cw0,
                1.0 - alpha,
            ),
            BiquadKind::HighPass => (
                (1.0 + cw0) * 0.5,
                -(1.0 + cw0),
                (1.0 + cw0) * 0.5,
                1.0 + alpha,
                -2.0 * cw0,
                1.0 - alpha,
            ),
            BiquadKind::Peaking => (
                1.0 + alpha * a,
                -2.0 * cw0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cw0,
                1.0 - alpha / a,
            ),
            BiquadKind::LowShelf => {
                let sqrt_a2 = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cw0 + sqrt_a2),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cw0),
                    a * ((a + 1.0) - (a - 1.0) * cw0 - sqrt_a2),
                    (a + 1.0) + (a - 1.0) * cw0 + sqrt_a2,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cw0),
                    (a + 1.0) + (a - 1.0) * cw0 - sqrt_a2,
                )
            }
            BiquadKind::HighShelf => {
                let sqrt_a2 = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cw0 + sqrt_a2),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cw0),
                    a * ((a + 1.0) + (a - 1.0) * cw0 - sqrt_a2),
                    (a + 1.0) - (a - 1.0) * cw0 + sqrt_a2,
                    2.0 * ((a - 1.0) - (a + 1.0) * cw0),
                    (a + 1.0) - (a - 1.0) * cw0 - sqrt_a2,
                )
            }
        };

        let inv_a0 = 1.0 / a0;
        Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
        }
    }

    /// Process a single sample through `state`.
    #[inline]
    pub fn process(&self, state: &mut BiquadState, x: f32) -> f32 {
        let x = x as f64;
        let y = self.b0 * x + self.b1 * state.x1 + self.b2 * state.x2
            - self.a1 * state.y1
            - self.a2 * state.y2;

        state.x2 = state.x1;
        state.x1 = x;
        state.y2 = state.y1;
        // Anti-denormal: tiny DC offset
        state.y1 = y + 1e-25;

        y as f32
    }

    /// Magnitude response at DC (z = 1).
    pub fn dc_gain(&self) -> f32 {
        ((self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)) as f32
    }
}

/// Per-channel delay taps.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Explicitly clear filter delay state.
    ///
    /// This is NOT called automatically by coefficient updates.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

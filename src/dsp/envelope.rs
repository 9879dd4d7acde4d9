//! Envelope Follower
//!
//! The single level detector shared by every dynamics module in the chain
//! (gate, auto-level, de-esser, compressors, breath control).
//!
//! # Design Notes
//! - Asymmetric one-pole: separate attack and release coefficients.
//! - Coefficients are computed in `set_times`, never per sample.
//! - No clamping; callers treat values under `SILENCE_FLOOR` as silence.

use crate::dsp::utils::time_constant_coeff;

/// Envelope level below which consumers treat the input as silent.
pub const SILENCE_FLOOR: f32 = 1e-6;

/// Attack/release coefficient pair, shared by all channels of a module.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCoeffs {
    pub attack: f32,
    pub release: f32,
}

impl EnvelopeCoeffs {
    pub fn new(attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        Self {
            attack: time_constant_coeff(attack_ms, sample_rate),
            release: time_constant_coeff(release_ms, sample_rate),
        }
    }

    /// Advance an envelope value by one rectified sample.
    #[inline]
    pub fn follow(&self, envelope: f32, input_abs: f32) -> f32 {
        if input_abs > envelope {
            self.attack * envelope + (1.0 - self.attack) * input_abs
        } else {
            self.release * envelope + (1.0 - self.release) * input_abs
        }
    }
}

/// Stand-alone follower that owns its state.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeFollower {
    coeffs: EnvelopeCoeffs,
    envelope: f32,
}

impl EnvelopeFollower {
    pub fn new(attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        Self {
            coeffs: EnvelopeCoeffs::new(attack_ms, release_ms, sample_rate),
            envelope: 0.0,
        }
    }

    pub fn set_times(&mut self, attack_ms: f32, release_ms: f32, sample_rate: f32) {
        self.coeffs = EnvelopeCoeffs::new(attack_ms, release_ms, sample_rate);
    }

    /// Feed `|x|` and return the updated envelope.
    #[inline]
    pub fn process(&mut self, input_abs: f32) -> f32 {
        self.envelope = self.coeffs.follow(self.envelope, input_abs);
        self.envelope
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

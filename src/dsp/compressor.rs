//! Compressor (Soft-knee and FET)
//!
//! # Perceptual Contract
//! - **Target Source**: Vocals with inconsistent phrase-to-phrase level.
//! - **Intended Effect**: Reduce dynamic range above threshold by `ratio`.
//! - **Failure Modes**:
//!   - "Pumping" if release is too fast for the amount of reduction.
//!   - Dulled transients when attack is very short.
//! - **Will Not Do**:
//!   - Brickwall limiting (handled by the true-peak limiter).
//!
//! # Variants
//! - `SoftKnee`: gain computer in the dB domain with a quadratic knee, then the
//!   linear gain is smoothed with the attack/release coefficients.
//! - `Fet`: input drive into a fixed -20 dBFS threshold (offset by the
//!   CrossNormalizer), power-law gain on the linear envelope, optional automatic
//!   makeup. The envelope alone provides the ballistics.

use crate::dsp::envelope::EnvelopeCoeffs;
use crate::dsp::utils::{db_to_lin, lin_to_db};

// Constants: unless marked "Must not change", these are tunable for behavior.
// Fixed FET threshold before the supervisor offset (dBFS).
// Increasing (less negative): less compression; decreasing: more compression.
const FET_BASE_THRESHOLD_DB: f32 = -20.0;
// Half scalar used in knee computation.
// Must not change: knee math relies on 0.5.
const HALF: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorMode {
    SoftKnee,
    Fet,
}

#[derive(Debug, Clone, Copy)]
pub struct CompressorSettings {
    pub mode: CompressorMode,
    /// Soft-knee threshold (dBFS).
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub knee_db: f32,
    pub makeup_db: f32,
    /// FET input drive (dB).
    pub input_db: f32,
    pub auto_makeup: bool,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            mode: CompressorMode::Fet,
            threshold_db: -12.0,
            ratio: 4.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            knee_db: 3.0,
            makeup_db: 0.0,
            input_db: 0.0,
            auto_makeup: true,
        }
    }
}

/// Shared coefficients for every channel.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    settings: CompressorSettings,
    env: EnvelopeCoeffs,
    // 1/ratio - 1 (≤ 0). Zero means the ratio disabled compression.
    slope: f32,
    input_gain: f32,
    fet_threshold_db: f32,
    fet_threshold: f32,
    makeup: f32,
}

/// Per-channel detector and gain state.
#[derive(Debug, Clone, Copy)]
pub struct CompressorState {
    envelope: f32,
    gain: f32,
}

impl Default for CompressorState {
    fn default() -> Self {
        Self {
            envelope: 0.0,
            gain: 1.0,
        }
    }
}

impl CompressorState {
    /// Current gain reduction in dB (≤ 0), excluding makeup.
    #[inline]
    pub fn gain_reduction_db(&self) -> f32 {
        lin_to_db(self.gain)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Compressor {
    pub fn new(settings: &CompressorSettings, sample_rate: f32) -> Self {
        let slope = if settings.ratio <= 0.0 {
            0.0
        } else {
            1.0 / settings.ratio.max(1.0) - 1.0
        };
        let mut comp = Self {
            settings: *settings,
            env: EnvelopeCoeffs::new(settings.attack_ms, settings.release_ms, sample_rate),
            slope,
            input_gain: db_to_lin(settings.input_db),
            fet_threshold_db: FET_BASE_THRESHOLD_DB,
            fet_threshold: db_to_lin(FET_BASE_THRESHOLD_DB),
            makeup: 1.0,
        };
        comp.set_threshold_offset_db(0.0);
        comp
    }

    #[inline]
    pub fn mode(&self) -> CompressorMode {
        self.settings.mode
    }

    /// Shift the FET threshold by the supervisor's offset and refresh makeup.
    pub fn set_threshold_offset_db(&mut self, offset_db: f32) {
        self.fet_threshold_db = FET_BASE_THRESHOLD_DB + offset_db;
        self.fet_threshold = db_to_lin(self.fet_threshold_db);
        self.makeup = match self.settings.mode {
            CompressorMode::Fet if self.settings.auto_makeup => {
                // slope = 1/r - 1, so (0 - thr)(1 - 1/r) = thr * slope
                db_to_lin(self.fet_threshold_db * self.slope)
            }
            _ => db_to_lin(self.settings.makeup_db),
        };
    }

    #[inline]
    fn soft_knee(over_db: f32, slope: f32, knee_db: f32) -> f32 {
        if knee_db <= 0.0 {
            return if over_db > 0.0 { over_db * slope } else { 0.0 };
        }
        let half = HALF * knee_db;
        if over_db <= -half {
            0.0
        } else if over_db >= half {
            over_db * slope
        } else {
            let x = over_db + half;
            slope * (x * x) / (2.0 * knee_db)
        }
    }

    #[inline]
    pub fn process(&self, state: &mut CompressorState, input: f32) -> f32 {
        match self.settings.mode {
            CompressorMode::SoftKnee => {
                state.envelope = self.env.follow(state.envelope, input.abs());
                let over = lin_to_db(state.envelope) - self.settings.threshold_db;
                let target = db_to_lin(Self::soft_knee(over, self.slope, self.settings.knee_db));
                // Falling gain is the attack phase
                state.gain = if target < state.gain {
                    self.env.attack * state.gain + (1.0 - self.env.attack) * target
                } else {
                    self.env.release * state.gain + (1.0 - self.env.release) * target
                };
                input * state.gain * self.makeup
            }
            CompressorMode::Fet => {
                let driven = input * self.input_gain;
                state.envelope = self.env.follow(state.envelope, driven.abs());
                state.gain = if self.slope < 0.0 && state.envelope > self.fet_threshold {
                    (state.envelope / self.fet_threshold).powf(self.slope)
                } else {
                    1.0
                };
                driven * state.gain * self.makeup
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn settle(comp: &Compressor, level_db: f32) -> (f32, CompressorState) {
        let mut st = CompressorState::default();
        let x = db_to_lin(level_db);
        let mut y = 0.0;
        for _ in 0..SR as usize {
            y = comp.process(&mut st, x);
        }
        (y, st)
    }

    fn hard_knee(ratio: f32) -> CompressorSettings {
        CompressorSettings {
            mode: CompressorMode::SoftKnee,
            threshold_db: -12.0,
            ratio,
            knee_db: 0.0,
            ..CompressorSettings::default()
        }
    }

    #[test]
    fn test_no_reduction_at_threshold() {
        let comp = Compressor::new(&hard_knee(4.0), SR);
        let (_, st) = settle(&comp, -12.0);
        assert!(st.gain_reduction_db().abs() < 0.01);
    }

    #[test]
    fn test_ten_db_over_at_four_to_one() {
        let comp = Compressor::new(&hard_knee(4.0), SR);
        let (y, st) = settle(&comp, -2.0);
        assert!((st.gain_reduction_db() - -7.5).abs() < 0.05);
        assert!((lin_to_db(y) - -9.5).abs() < 0.05);
    }

    #[test]
    fn test_knee_is_continuous() {
        let slope = 1.0 / 4.0 - 1.0;
        let k = 6.0;
        let below = Compressor::soft_knee(-3.0 - 1e-4, slope, k);
        let inside_lo = Compressor::soft_knee(-3.0 + 1e-4, slope, k);
        let inside_hi = Compressor::soft_knee(3.0 - 1e-4, slope, k);
        let above = Compressor::soft_knee(3.0 + 1e-4, slope, k);
        assert!((below - inside_lo).abs() < 1e-3);
        assert!((inside_hi - above).abs() < 1e-3);
    }

    #[test]
    fn test_fet_power_law_and_auto_makeup() {
        let comp = Compressor::new(&CompressorSettings::default(), SR);
        let (y, st) = settle(&comp, -10.0);
        // 10 dB over -20 dBFS at 4:1
        assert!((st.gain_reduction_db() - -7.5).abs() < 0.05);
        // Auto makeup of 20 * (1 - 1/4) = 15 dB
        assert!((lin_to_db(y) - -2.5).abs() < 0.05);
    }

    #[test]
    fn test_fet_threshold_offset() {
        let mut comp = Compressor::new(&CompressorSettings::default(), SR);
        comp.set_threshold_offset_db(10.0);
        let (_, st) = settle(&comp, -10.0);
        assert!(st.gain_reduction_db().abs() < 0.01);
    }

    #[test]
    fn test_non_positive_ratio_disables_compression() {
        let settings = CompressorSettings {
            ratio: 0.0,
            auto_makeup: false,
            ..CompressorSettings::default()
        };
        let comp = Compressor::new(&settings, SR);
        let (y, _) = settle(&comp, -3.0);
        assert!((lin_to_db(y) - -3.0).abs() < 1e-3);
    }
}

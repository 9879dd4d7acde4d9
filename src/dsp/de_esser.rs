//! Split-band De-esser
//!
//! # Perceptual Contract
//! - **Target Source**: Sibilant vocals ("s", "sh", "t" bursts).
//! - **Intended Effect**: Duck only the band above the crossover when it exceeds
//!   threshold; everything below is untouched.
//! - **Will Not Do**:
//!   - Broadband gain riding (that belongs to the compressor).
//!
//! The crossover is a ZDF lowpass; the high band is the exact complement
//! (`x - low`), so with no reduction the band sum reconstructs the input.

use crate::dsp::envelope::EnvelopeCoeffs;
use crate::dsp::svf::{SvfCoeffs, SvfKind, SvfState};
use crate::dsp::utils::db_to_lin;

// Detector attack (ms). Fast enough to catch the onset of a sibilant.
const DETECT_ATTACK_MS: f32 = 0.5;
// Detector release (ms). Roughly the length of a sibilant burst.
const DETECT_RELEASE_MS: f32 = 60.0;
// Crossover Q (Butterworth).
const CROSSOVER_Q: f32 = 0.707;

#[derive(Debug, Clone, Copy)]
pub struct DeEsserSettings {
    pub threshold_db: f32,
    pub freq_hz: f32,
    pub ratio: f32,
    /// Maximum attenuation in dB (negative).
    pub range_db: f32,
}

impl Default for DeEsserSettings {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            freq_hz: 5000.0,
            ratio: 5.0,
            range_db: -6.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DeEsser {
    crossover: SvfCoeffs,
    threshold: f32,
    exponent: f32,
    floor: f32,
    env: EnvelopeCoeffs,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeEsserState {
    crossover: SvfState,
    envelope: f32,
    last_gain_db: f32,
}

impl DeEsserState {
    /// Reduction applied to the high band on the last sample (dB, ≤ 0).
    pub fn gain_reduction_db(&self) -> f32 {
        self.last_gain_db
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl DeEsser {
    pub fn new(settings: &DeEsserSettings, sample_rate: f32) -> Self {
        let ratio = settings.ratio.max(1.0);
        Self {
            crossover: SvfCoeffs::new(
                SvfKind::LowPass,
                settings.freq_hz,
                CROSSOVER_Q,
                0.0,
                sample_rate,
            ),
            threshold: db_to_lin(settings.threshold_db),
            exponent: 1.0 / ratio - 1.0,
            floor: db_to_lin(settings.range_db.min(0.0)),
            env: EnvelopeCoeffs::new(DETECT_ATTACK_MS, DETECT_RELEASE_MS, sample_rate),
        }
    }

    #[inline]
    pub fn process(&self, state: &mut DeEsserState, input: f32) -> f32 {
        let low = self.crossover.process(&mut state.crossover, input);
        let high = input - low;

        state.envelope = self.env.follow(state.envelope, high.abs());

        let gain = if state.envelope > self.threshold {
            (state.envelope / self.threshold)
                .powf(self.exponent)
                .max(self.floor)
        } else {
            1.0
        };
        state.last_gain_db = 20.0 * gain.log10();

        low + high * gain
    }
}

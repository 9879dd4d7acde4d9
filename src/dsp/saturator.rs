//! Saturator
//!
//! Pre-emphasis/de-emphasis waveshaper. The top end is shelved down before the
//! shaper and restored afterwards, so harmonics are generated mostly from the
//! body of the voice and sibilance does not fizz.
//!
//! Runs inside the oversampled section; aliasing is handled there.

use crate::dsp::biquad::{BiquadCoeffs, BiquadKind, BiquadState};

// Emphasis shelf corner (Hz).
const EMPHASIS_FREQ_HZ: f32 = 4000.0;
// Emphasis shelf depth (dB); applied negatively before the shaper.
const EMPHASIS_DB: f32 = 6.0;
const EMPHASIS_Q: f32 = 0.707;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaturationType {
    /// Hard clamp to ±1 followed by the cubic `x - x³/3`.
    Cubic,
    Tanh,
}

impl SaturationType {
    pub fn from_index(index: i32) -> Self {
        match index {
            1 => Self::Tanh,
            _ => Self::Cubic,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SaturatorSettings {
    /// 0..100
    pub drive: f32,
    pub kind: SaturationType,
    /// 0..100 %
    pub mix: f32,
}

impl Default for SaturatorSettings {
    fn default() -> Self {
        Self {
            drive: 20.0,
            kind: SaturationType::Cubic,
            mix: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Saturator {
    pre: BiquadCoeffs,
    post: BiquadCoeffs,
    drive: f32,
    kind: SaturationType,
    mix: f32,
    base_drive: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SaturatorState {
    pre: BiquadState,
    post: BiquadState,
}

impl SaturatorState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Saturator {
    pub fn new(settings: &SaturatorSettings, sample_rate: f32) -> Self {
        let base_drive = 1.0 + settings.drive.max(0.0) / 10.0;
        Self {
            pre: BiquadCoeffs::new(
                BiquadKind::HighShelf,
                EMPHASIS_FREQ_HZ,
                EMPHASIS_Q,
                -EMPHASIS_DB,
                sample_rate,
            ),
            post: BiquadCoeffs::new(
                BiquadKind::HighShelf,
                EMPHASIS_FREQ_HZ,
                EMPHASIS_Q,
                EMPHASIS_DB,
                sample_rate,
            ),
            drive: base_drive,
            kind: settings.kind,
            mix: (settings.mix / 100.0).clamp(0.0, 1.0),
            base_drive,
        }
    }

    /// Scale drive by the supervisor's screech guard (0.25..1).
    pub fn set_drive_scale(&mut self, scale: f32) {
        self.drive = self.base_drive * scale;
    }

    #[inline]
    fn shape(kind: SaturationType, x: f32) -> f32 {
        match kind {
            SaturationType::Cubic => {
                let c = x.clamp(-1.0, 1.0);
                c - c * c * c / 3.0
            }
            SaturationType::Tanh => x.tanh(),
        }
    }

    #[inline]
    pub fn process(&self, state: &mut SaturatorState, input: f32) -> f32 {
        let emphasized = self.pre.process(&mut state.pre, input);
        let shaped = Self::shape(self.kind, emphasized * self.drive);
        let wet = self.post.process(&mut state.post, shaped);
        input + (wet - input) * self.mix
    }
}

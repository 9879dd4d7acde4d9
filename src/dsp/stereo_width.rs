//! Stereo Widener
//!
//! Mid/side width control with an optional mono-bass cutoff. Below the cutoff the
//! side channel is removed so low end stays centered; above it the side is
//! scaled by `width` (0 = mono, 1 = untouched, 2 = double side).

use crate::dsp::utils::one_pole_coeff;

#[derive(Debug, Clone, Copy)]
pub struct StereoWidthSettings {
    /// 0..200 %
    pub width: f32,
    /// 0 disables the mono-bass split.
    pub mono_bass_hz: f32,
}

impl Default for StereoWidthSettings {
    fn default() -> Self {
        Self {
            width: 100.0,
            mono_bass_hz: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StereoWidener {
    width: f32,
    // Side lowpass pole; `None` when the bass is left alone.
    bass_pole: Option<f32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StereoWidthState {
    side_low: f32,
}

impl StereoWidthState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl StereoWidener {
    pub fn new(settings: &StereoWidthSettings, sample_rate: f32) -> Self {
        Self {
            width: (settings.width / 100.0).clamp(0.0, 2.0),
            bass_pole: (settings.mono_bass_hz > 0.0)
                .then(|| one_pole_coeff(settings.mono_bass_hz, sample_rate)),
        }
    }

    /// Process one stereo frame.
    #[inline]
    pub fn process(&self, state: &mut StereoWidthState, left: f32, right: f32) -> (f32, f32) {
        let mid = (left + right) * 0.5;
        let mut side = (left - right) * 0.5;

        if let Some(pole) = self.bass_pole {
            state.side_low = side + pole * (state.side_low - side);
            side -= state.side_low;
        }

        let side = side * self.width;
        (mid + side, mid - side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_zero_width_collapses_to_mono() {
        let w = StereoWidener::new(
            &StereoWidthSettings {
                width: 0.0,
                mono_bass_hz: 0.0,
            },
            SR,
        );
        let mut st = StereoWidthState::default();
        let (l, r) = w.process(&mut st, 0.8, -0.2);
        assert_eq!(l, r);
        assert!((l - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_unity_width_is_transparent() {
        let w = StereoWidener::new(&StereoWidthSettings::default(), SR);
        let mut st = StereoWidthState::default();
        let (l, r) = w.process(&mut st, 0.8, -0.2);
        assert!((l - 0.8).abs() < 1e-6 && (r + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_mono_bass_removes_low_side() {
        let w = StereoWidener::new(
            &StereoWidthSettings {
                width: 200.0,
                mono_bass_hz: 200.0,
            },
            SR,
        );
        let mut st = StereoWidthState::default();
        let (mut l, mut r) = (0.0, 0.0);
        // DC side content is entirely bass
        for _ in 0..SR as usize {
            (l, r) = w.process(&mut st, 0.5, 0.1);
        }
        assert!((l - r).abs() < 1e-4);
    }
}

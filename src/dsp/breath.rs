use crate::dsp::envelope::EnvelopeCoeffs;
use crate::dsp::utils::{db_to_lin, one_pole_coeff};

#[derive(Debug, Clone, Copy)]
pub struct BreathSettings {
    /// 0..100
    pub sensitivity: f32,
    /// 0..24 dB
    pub reduction_db: f32,
}

impl Default for BreathSettings {
    fn default() -> Self {
        Self {
            sensitivity: 50.0,
            reduction_db: 12.0,
        }
    }
}

/// Breath Control
///
/// Breaths carry high-frequency energy with little low end and sit at a
/// moderate level. When the high/low band ratio exceeds a sensitivity-derived
/// threshold on such material, the whole frame is softly attenuated.
/// Stereo-linked: one gain for every channel.
#[derive(Debug, Clone, Copy)]
pub struct BreathControl {
    low_pole: f32,
    high_pole: f32,
    band_env: EnvelopeCoeffs,
    gain_env: EnvelopeCoeffs,
    threshold: f32,
    reduction: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct BreathState {
    lowpass: f32,
    highpass: f32,
    low_env: f32,
    high_env: f32,
    gain: f32,
}

impl Default for BreathState {
    fn default() -> Self {
        Self {
            lowpass: 0.0,
            highpass: 0.0,
            low_env: 0.0,
            high_env: 0.0,
            gain: 1.0,
        }
    }
}

impl BreathState {
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl BreathControl {
    // Band split
    const LOW_BAND_HZ: f32 = 500.0;
    const HIGH_BAND_HZ: f32 = 2000.0;

    // Band envelope smoothing
    const BAND_ENV_MS: f32 = 22.7;

    // Gain ballistics
    const GAIN_ATTACK_MS: f32 = 22.7;
    const GAIN_RELEASE_MS: f32 = 22.7;

    // Level window in which a frame can be a breath
    const MIN_LEVEL: f32 = 0.01;
    const MAX_LEVEL: f32 = 0.3;

    // Keeps the band ratio finite on silence
    const RATIO_EPS: f32 = 1e-6;

    pub fn new(settings: &BreathSettings, sample_rate: f32) -> Self {
        let sensitivity = 0.1 + 0.9 * (settings.sensitivity / 100.0).clamp(0.0, 1.0);
        Self {
            low_pole: one_pole_coeff(Self::LOW_BAND_HZ, sample_rate),
            high_pole: one_pole_coeff(Self::HIGH_BAND_HZ, sample_rate),
            band_env: EnvelopeCoeffs::new(Self::BAND_ENV_MS, Self::BAND_ENV_MS, sample_rate),
            gain_env: EnvelopeCoeffs::new(Self::GAIN_ATTACK_MS, Self::GAIN_RELEASE_MS, sample_rate),
            threshold: 3.0 / sensitivity,
            reduction: db_to_lin(-settings.reduction_db.clamp(0.0, 24.0)),
        }
    }

    /// Advance the detector by one mono sample and return the linked gain.
    #[inline]
    pub fn next_gain(&self, state: &mut BreathState, mono: f32) -> f32 {
        let abs_in = mono.abs();

        // 1. Band estimates
        state.lowpass = self.low_pole * state.lowpass + (1.0 - self.low_pole) * mono;
        state.highpass = self.high_pole * state.highpass + (1.0 - self.high_pole) * mono;
        let low = state.lowpass.abs();
        let high = (mono - state.highpass).abs();

        state.low_env = self.band_env.follow(state.low_env, low);
        state.high_env = self.band_env.follow(state.high_env, high);

        // 2. Breath-likeness
        let ratio = (state.high_env + Self::RATIO_EPS) / (state.low_env + Self::RATIO_EPS);

        let target = if ratio > self.threshold && abs_in > Self::MIN_LEVEL && abs_in < Self::MAX_LEVEL
        {
            let amount = ((ratio - self.threshold) / self.threshold).min(1.0);
            1.0 - (1.0 - self.reduction) * amount
        } else {
            1.0
        };

        // 3. Smooth gain
        state.gain = self.gain_env.follow(state.gain, target);
        state.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: f32 = 48000.0;

    #[test]
    fn test_hissy_moderate_material_is_reduced() {
        let bc = BreathControl::new(&BreathSettings::default(), SR);
        let mut st = BreathState::default();
        for n in 0..SR as usize {
            let x = if n % 2 == 0 { 0.1 } else { -0.1 };
            bc.next_gain(&mut st, x);
        }
        assert!((st.gain() - db_to_lin(-12.0)).abs() < 0.01);
    }

    #[test]
    fn test_voiced_material_untouched() {
        let bc = BreathControl::new(&BreathSettings::default(), SR);
        let mut st = BreathState::default();
        for n in 0..SR as usize {
            let x = 0.2 * (2.0 * PI * 150.0 * n as f32 / SR).sin();
            bc.next_gain(&mut st, x);
        }
        assert!((st.gain() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_loud_material_untouched() {
        let bc = BreathControl::new(&BreathSettings::default(), SR);
        let mut st = BreathState::default();
        for n in 0..SR as usize {
            let x = if n % 2 == 0 { 0.6 } else { -0.6 };
            bc.next_gain(&mut st, x);
        }
        assert!((st.gain() - 1.0).abs() < 1e-6);
    }
}

//! AutoLevel (AGC)
//!
//! Target-seeking gain control. In its own mode it follows the input envelope
//! and applies `target - level` dB, clamped to ±range. When the CrossNormalizer
//! drives it externally, it instead glides toward the supervisor's gain and
//! ignores its own detector.

use crate::dsp::envelope::EnvelopeCoeffs;
use crate::dsp::utils::{db_to_lin, lin_to_db};

// Envelope level under which the input passes unchanged.
// Must not change: keeps log10 away from zero on silence.
const AGC_SILENCE_FLOOR: f32 = 1e-4;
// Response time at speed 0 (ms).
// Increasing: lazier leveling; decreasing: faster leveling.
const SLOWEST_RESPONSE_MS: f32 = 500.0;
// Response time at speed 100 (ms).
const FASTEST_RESPONSE_MS: f32 = 50.0;
// Release time relative to attack.
const RELEASE_MULT: f32 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct AutoLevelSettings {
    pub target_db: f32,
    pub range_db: f32,
    /// 0..100
    pub speed: f32,
}

impl Default for AutoLevelSettings {
    fn default() -> Self {
        Self {
            target_db: -10.0,
            range_db: 12.0,
            speed: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AutoLevel {
    target_db: f32,
    range_db: f32,
    env: EnvelopeCoeffs,
    /// Supervisor gain in dB; `Some` switches to external mode.
    external_gain_db: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoLevelState {
    envelope: f32,
    gain: f32,
}

impl Default for AutoLevelState {
    fn default() -> Self {
        Self {
            envelope: 0.0,
            gain: 1.0,
        }
    }
}

impl AutoLevelState {
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AutoLevel {
    pub fn new(settings: &AutoLevelSettings, sample_rate: f32) -> Self {
        let speed = (settings.speed / 100.0).clamp(0.0, 1.0);
        let response_ms =
            SLOWEST_RESPONSE_MS - speed * (SLOWEST_RESPONSE_MS - FASTEST_RESPONSE_MS);
        Self {
            target_db: settings.target_db,
            range_db: settings.range_db.max(0.0),
            env: EnvelopeCoeffs::new(response_ms, response_ms * RELEASE_MULT, sample_rate),
            external_gain_db: None,
        }
    }

    /// Hand control to (or take it back from) the block-rate supervisor.
    pub fn set_external_gain_db(&mut self, gain_db: Option<f32>) {
        self.external_gain_db = gain_db;
    }

    #[inline]
    pub fn process(&self, state: &mut AutoLevelState, input: f32) -> f32 {
        if let Some(ext_db) = self.external_gain_db {
            let target = db_to_lin(ext_db);
            state.gain = self.env.attack * state.gain + (1.0 - self.env.attack) * target;
            return input * state.gain;
        }

        state.envelope = self.env.follow(state.envelope, input.abs());
        if state.envelope < AGC_SILENCE_FLOOR {
            return input;
        }

        let gain_db =
            (self.target_db - lin_to_db(state.envelope)).clamp(-self.range_db, self.range_db);
        state.gain = db_to_lin(gain_db);
        input * state.gain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_levels_toward_target() {
        let agc = AutoLevel::new(&AutoLevelSettings::default(), SR);
        let mut st = AutoLevelState::default();
        let input = db_to_lin(-16.0);
        let mut out = 0.0;
        for _ in 0..(SR as usize * 3) {
            out = agc.process(&mut st, input);
        }
        assert!((lin_to_db(out) - -10.0).abs() < 0.1);
    }

    #[test]
    fn test_gain_clamped_to_range() {
        let settings = AutoLevelSettings {
            range_db: 6.0,
            ..AutoLevelSettings::default()
        };
        let agc = AutoLevel::new(&settings, SR);
        let mut st = AutoLevelState::default();
        let input = db_to_lin(-40.0);
        for _ in 0..(SR as usize * 3) {
            agc.process(&mut st, input);
        }
        assert!((lin_to_db(st.gain()) - 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_silence_passes_unchanged() {
        let agc = AutoLevel::new(&AutoLevelSettings::default(), SR);
        let mut st = AutoLevelState::default();
        for _ in 0..1000 {
            assert_eq!(agc.process(&mut st, 1e-6), 1e-6);
        }
    }

    #[test]
    fn test_external_mode_glides_to_supervisor_gain() {
        let mut agc = AutoLevel::new(&AutoLevelSettings::default(), SR);
        agc.set_external_gain_db(Some(-6.0));
        let mut st = AutoLevelState::default();
        for _ in 0..(SR as usize * 4) {
            agc.process(&mut st, 0.5);
        }
        assert!((lin_to_db(st.gain()) - -6.0).abs() < 0.01);
    }
}

//! Parametric EQ
//!
//! Three user bands (low shelf, peaking, high shelf) in series, followed by the
//! mud band owned by the CrossNormalizer. Bands at 0 dB are skipped outright,
//! so a flat EQ is bit-transparent.

use crate::dsp::biquad::{BiquadCoeffs, BiquadKind, BiquadState};

pub const USER_BANDS: usize = 3;
const BAND_KINDS: [BiquadKind; USER_BANDS] =
    [BiquadKind::LowShelf, BiquadKind::Peaking, BiquadKind::HighShelf];
// Supervisor mud band.
const MUD_FREQ_HZ: f32 = 300.0;
const MUD_Q: f32 = 1.0;
// Gains closer to zero than this leave a band out of the path (dB).
const FLAT_EPS_DB: f32 = 1e-4;

#[derive(Debug, Clone, Copy)]
pub struct EqBand {
    pub freq_hz: f32,
    pub gain_db: f32,
    pub q: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct EqSettings {
    pub bands: [EqBand; USER_BANDS],
}

impl Default for EqSettings {
    fn default() -> Self {
        let band = |freq_hz| EqBand {
            freq_hz,
            gain_db: 0.0,
            q: 0.707,
        };
        Self {
            bands: [band(100.0), band(1000.0), band(5000.0)],
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Eq {
    bands: [Option<BiquadCoeffs>; USER_BANDS],
    mud: Option<BiquadCoeffs>,
    sample_rate: f32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EqState {
    bands: [BiquadState; USER_BANDS],
    mud: BiquadState,
}

impl EqState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Eq {
    pub fn new(settings: &EqSettings, sample_rate: f32) -> Self {
        let mut bands = [None; USER_BANDS];
        for ((slot, band), kind) in bands.iter_mut().zip(settings.bands.iter()).zip(BAND_KINDS) {
            if band.gain_db.abs() > FLAT_EPS_DB {
                *slot = Some(BiquadCoeffs::new(
                    kind,
                    band.freq_hz,
                    band.q,
                    band.gain_db,
                    sample_rate,
                ));
            }
        }
        Self {
            bands,
            mud: None,
            sample_rate,
        }
    }

    /// Set the supervisor's mud cut (dB, ≤ 0).
    pub fn set_mud_cut_db(&mut self, gain_db: f32) {
        self.mud = (gain_db.abs() > FLAT_EPS_DB).then(|| {
            BiquadCoeffs::new(
                BiquadKind::Peaking,
                MUD_FREQ_HZ,
                MUD_Q,
                gain_db,
                self.sample_rate,
            )
        });
    }

    #[inline]
    pub fn process(&self, state: &mut EqState, input: f32) -> f32 {
        let mut x = input;
        for (coeffs, st) in self.bands.iter().zip(state.bands.iter_mut()) {
            if let Some(c) = coeffs {
                x = c.process(st, x);
            }
        }
        if let Some(c) = &self.mud {
            x = c.process(&mut state.mud, x);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_flat_eq_is_transparent() {
        let eq = Eq::new(&EqSettings::default(), SR);
        let mut st = EqState::default();
        for n in 0..1000 {
            let x = (n as f32 * 0.21).sin();
            assert_eq!(eq.process(&mut st, x), x);
        }
    }

    #[test]
    fn test_low_shelf_boosts_bass() {
        let mut settings = EqSettings::default();
        settings.bands[0].gain_db = 6.0;
        let eq = Eq::new(&settings, SR);
        let mut st = EqState::default();
        let mut y = 0.0;
        for _ in 0..48000 {
            y = eq.process(&mut st, 0.25);
        }
        assert!((y - 0.25 * 10f32.powf(6.0 / 20.0)).abs() < 0.01);
    }

    #[test]
    fn test_mud_band_cuts_at_300hz() {
        let mut eq = Eq::new(&EqSettings::default(), SR);
        eq.set_mud_cut_db(-6.0);
        let mut st = EqState::default();
        let mut peak = 0.0f32;
        for n in 0..48000 {
            let x = (2.0 * std::f32::consts::PI * MUD_FREQ_HZ * n as f32 / SR).sin();
            let y = eq.process(&mut st, x);
            if n > 24000 {
                peak = peak.max(y.abs());
            }
        }
        assert!((peak - 10f32.powf(-6.0 / 20.0)).abs() < 0.02);
        eq.set_mud_cut_db(0.0);
        assert!(eq.mud.is_none());
    }
}

//! CrossNormalizer (block-rate supervisor)
//!
//! # Perceptual Contract
//! - **Target Source**: Any input level, from whispered takes to hot, clipping sources.
//! - **Intended Effect**: Keep the downstream chain working at a predictable
//!   operating point so presets behave the same regardless of input gain.
//! - **Will Not Do**:
//!   - Touch audio directly. It only produces control values, once per block.
//!
//! # Control Outputs
//! - `safety_gain`: fast-attack/slow-release pre-gain against a -1 dBFS peak.
//! - `auto_gain_db`: `target - rms_db`, clamped to ±12 dB, held on silence.
//! - `comp_threshold_offset_db`: mirrors `auto_gain_db` so the FET compressor
//!   sees the same amount of signal over threshold after leveling.
//! - `mud_cut_db`: proportional to the mud/core excess over 1.2, down to -9 dB.
//! - `drive_scale`: pulls saturation drive back when screech/core exceeds 0.8.
//!
//! # Band Analysis
//! Each band is the difference of two one-pole lowpasses run on the mono input:
//! mud = LP500 - LP150, core = LP2k - LP500, screech = LP10k - LP4k.
//!
//! Samples are fed one at a time with `observe`, then `finish_block` turns the
//! accumulated block statistics into smoothed controls. No buffers are held.

use crate::dsp::utils::{db_to_lin, lin_to_db, one_pole_coeff};

// Band edges (Hz), in the order of the lowpass bank.
const BAND_EDGES_HZ: [f32; BANK] = [150.0, 500.0, 2000.0, 4000.0, 10000.0];
const LP150: usize = 0;
const LP500: usize = 1;
const LP2K: usize = 2;
const LP4K: usize = 3;
const LP10K: usize = 4;
const BANK: usize = 5;

// Peak the safety pre-gain protects against (dBFS).
const SAFETY_CEILING_DB: f32 = -1.0;
const SAFETY_RELEASE_MS: f32 = 500.0;
// Auto gain window and smoothing.
const AUTO_GAIN_RANGE_DB: f32 = 12.0;
const AUTO_GAIN_SMOOTH_MS: f32 = 300.0;
// Input below this is treated as a pause; auto gain holds (dBFS).
const SILENCE_DB: f32 = -60.0;
// Mud detector: ratio threshold, slope (dB per unit ratio) and floor (dB).
const MUD_RATIO_THRESHOLD: f32 = 1.2;
const MUD_SLOPE_DB: f32 = 6.0;
const MUD_MAX_CUT_DB: f32 = -9.0;
// Screech detector: ratio threshold and scale bounds.
const SCREECH_RATIO_THRESHOLD: f32 = 0.8;
const MIN_DRIVE_SCALE: f32 = 0.25;
// Attack/release for the tonal controls (ms).
// Increasing attack: gentler engagement; increasing release: slower recovery.
const TONAL_ATTACK_MS: f32 = 50.0;
const TONAL_RELEASE_MS: f32 = 1000.0;
// Core energy floor under which band ratios are not trusted.
const CORE_FLOOR: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizerControls {
    pub safety_gain: f32,
    pub auto_gain_db: f32,
    pub comp_threshold_offset_db: f32,
    pub mud_cut_db: f32,
    pub drive_scale: f32,
}

impl Default for NormalizerControls {
    fn default() -> Self {
        Self {
            safety_gain: 1.0,
            auto_gain_db: 0.0,
            comp_threshold_offset_db: 0.0,
            mud_cut_db: 0.0,
            drive_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrossNormalizer {
    sample_rate: f32,
    target_db: f32,
    poles: [f32; BANK],
    lp: [f32; BANK],

    // Per-block accumulators
    count: usize,
    sum_sq: f32,
    peak: f32,
    mud_sq: f32,
    core_sq: f32,
    screech_sq: f32,

    controls: NormalizerControls,
}

/// Block-length smoothing coefficient for a time constant in ms.
#[inline]
fn block_coeff(time_ms: f32, block_len: usize, sample_rate: f32) -> f32 {
    let samples = time_ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        0.0
    } else {
        (-(block_len as f32) / samples).exp()
    }
}

#[inline]
fn glide(current: f32, target: f32, coeff: f32) -> f32 {
    target + (current - target) * coeff
}

impl CrossNormalizer {
    pub fn new(target_db: f32, sample_rate: f32) -> Self {
        let mut poles = [0.0; BANK];
        for (p, &hz) in poles.iter_mut().zip(BAND_EDGES_HZ.iter()) {
            *p = one_pole_coeff(hz.min(0.45 * sample_rate), sample_rate);
        }
        Self {
            sample_rate,
            target_db,
            poles,
            lp: [0.0; BANK],
            count: 0,
            sum_sq: 0.0,
            peak: 0.0,
            mud_sq: 0.0,
            core_sq: 0.0,
            screech_sq: 0.0,
            controls: NormalizerControls::default(),
        }
    }

    pub fn set_target_db(&mut self, target_db: f32) {
        self.target_db = target_db;
    }

    #[inline]
    pub fn controls(&self) -> NormalizerControls {
        self.controls
    }

    pub fn reset(&mut self) {
        self.lp = [0.0; BANK];
        self.clear_block();
        self.controls = NormalizerControls::default();
    }

    fn clear_block(&mut self) {
        self.count = 0;
        self.sum_sq = 0.0;
        self.peak = 0.0;
        self.mud_sq = 0.0;
        self.core_sq = 0.0;
        self.screech_sq = 0.0;
    }

    /// Feed one mono input sample of the current block.
    #[inline]
    pub fn observe(&mut self, mono: f32) {
        for (z, &p) in self.lp.iter_mut().zip(self.poles.iter()) {
            *z = mono + p * (*z - mono);
        }
        let mud = self.lp[LP500] - self.lp[LP150];
        let core = self.lp[LP2K] - self.lp[LP500];
        let screech = self.lp[LP10K] - self.lp[LP4K];

        self.count += 1;
        self.sum_sq += mono * mono;
        self.peak = self.peak.max(mono.abs());
        self.mud_sq += mud * mud;
        self.core_sq += core * core;
        self.screech_sq += screech * screech;
    }

    /// Close the block: update and return the smoothed controls.
    pub fn finish_block(&mut self) -> NormalizerControls {
        let n = self.count;
        if n == 0 {
            return self.controls;
        }
        let sr = self.sample_rate;
        let mut c = self.controls;

        // 1. Safety pre-gain
        let safety_target = if self.peak > 0.0 {
            (db_to_lin(SAFETY_CEILING_DB) / self.peak).min(1.0)
        } else {
            1.0
        };
        c.safety_gain = if safety_target < c.safety_gain {
            safety_target
        } else {
            glide(c.safety_gain, safety_target, block_coeff(SAFETY_RELEASE_MS, n, sr))
        };

        // 2. Auto gain (measured after the safety gain that will be applied)
        let rms_db = lin_to_db((self.sum_sq / n as f32).sqrt() * c.safety_gain);
        if rms_db > SILENCE_DB {
            let target =
                (self.target_db - rms_db).clamp(-AUTO_GAIN_RANGE_DB, AUTO_GAIN_RANGE_DB);
            c.auto_gain_db = glide(c.auto_gain_db, target, block_coeff(AUTO_GAIN_SMOOTH_MS, n, sr));
        }
        c.comp_threshold_offset_db = c.auto_gain_db;

        // 3. Tonal balance
        let attack = block_coeff(TONAL_ATTACK_MS, n, sr);
        let release = block_coeff(TONAL_RELEASE_MS, n, sr);
        let (mud_target, drive_target) = if self.core_sq > CORE_FLOOR {
            let mud_ratio = (self.mud_sq / self.core_sq).sqrt();
            let screech_ratio = (self.screech_sq / self.core_sq).sqrt();
            let mud = if mud_ratio > MUD_RATIO_THRESHOLD {
                (-MUD_SLOPE_DB * (mud_ratio - MUD_RATIO_THRESHOLD)).max(MUD_MAX_CUT_DB)
            } else {
                0.0
            };
            let drive = if screech_ratio > SCREECH_RATIO_THRESHOLD {
                (SCREECH_RATIO_THRESHOLD / screech_ratio).clamp(MIN_DRIVE_SCALE, 1.0)
            } else {
                1.0
            };
            (mud, drive)
        } else {
            (c.mud_cut_db, c.drive_scale)
        };
        let tonal_coeff = |current: f32, target: f32| {
            if target < current {
                attack
            } else {
                release
            }
        };
        c.mud_cut_db = glide(c.mud_cut_db, mud_target, tonal_coeff(c.mud_cut_db, mud_target));
        c.drive_scale = glide(
            c.drive_scale,
            drive_target,
            tonal_coeff(c.drive_scale, drive_target),
        );

        self.controls = c;
        self.clear_block();
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: f32 = 48000.0;
    const BLOCK: usize = 512;

    fn run_tone(norm: &mut CrossNormalizer, freq: f32, amp: f32, seconds: f32) -> NormalizerControls {
        let total = (seconds * SR) as usize;
        let mut c = NormalizerControls::default();
        for n in 0..total {
            norm.observe(amp * (2.0 * PI * freq * n as f32 / SR).sin());
            if (n + 1) % BLOCK == 0 {
                c = norm.finish_block();
            }
        }
        c
    }

    #[test]
    fn test_mud_detection() {
        let mut muddy = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut muddy, 250.0, 0.3, 3.0);
        assert!(c.mud_cut_db < -1.0, "{c:?}");
        assert!(c.mud_cut_db >= MUD_MAX_CUT_DB);

        let mut clear = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut clear, 1000.0, 0.3, 3.0);
        assert!(c.mud_cut_db.abs() < 1e-3, "{c:?}");
    }

    #[test]
    fn test_auto_gain_tracks_target_and_clamps() {
        // 0.1 amplitude sine: -23 dBFS RMS, needs +13 dB, clamped to +12
        let mut norm = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut norm, 1000.0, 0.1, 4.0);
        assert!((c.auto_gain_db - 12.0).abs() < 0.05, "{c:?}");
        assert_eq!(c.comp_threshold_offset_db, c.auto_gain_db);

        // 0.5 amplitude: about -9 dBFS RMS, needs about -1 dB
        let mut norm = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut norm, 1000.0, 0.5, 4.0);
        let expected = -10.0 - lin_to_db(0.5 / 2f32.sqrt());
        assert!((c.auto_gain_db - expected).abs() < 0.1, "{c:?}");
    }

    #[test]
    fn test_auto_gain_holds_on_silence() {
        let mut norm = CrossNormalizer::new(-10.0, SR);
        let loud = run_tone(&mut norm, 1000.0, 0.5, 4.0);
        let held = run_tone(&mut norm, 1000.0, 0.0, 2.0);
        assert_eq!(loud.auto_gain_db, held.auto_gain_db);
    }

    #[test]
    fn test_safety_gain_catches_hot_input() {
        let mut norm = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut norm, 1000.0, 2.0, 0.1);
        assert!((c.safety_gain * 2.0 - db_to_lin(SAFETY_CEILING_DB)).abs() < 0.01);
    }

    #[test]
    fn test_screech_reduces_drive() {
        let mut norm = CrossNormalizer::new(-10.0, SR);
        let c = run_tone(&mut norm, 7000.0, 0.2, 3.0);
        assert!(c.drive_scale < 1.0);
        assert!(c.drive_scale >= MIN_DRIVE_SCALE);
    }
}

//! Parameter registry
//!
//! Every automatable value has a stable numeric address (what hosts, saved
//! sessions and event queues refer to) and a string key (what presets and the
//! plugin parameter tree use). The declaration order of `ParamId` is the
//! persisted order, so new parameters are only ever appended.
//!
//! Each entry carries an apply hook that recomputes the coefficients of the one
//! module the parameter governs. The chain only calls it when a value changes.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use thiserror::Error;

use crate::chain::VocalChain;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("unknown parameter address {0}")]
    UnknownAddress(u32),
    #[error("unknown parameter key '{0}'")]
    UnknownKey(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    OutputGain,
    Bypass,
    PitchAmount,
    PitchSpeed,
    Eq1Freq,
    Eq1Gain,
    Eq1Q,
    Eq2Freq,
    Eq2Gain,
    Eq2Q,
    Eq3Freq,
    Eq3Gain,
    Eq3Q,
    CompInput,
    CompRatio,
    CompAttack,
    CompRelease,
    CompMakeup,
    SatDrive,
    SatType,
    DelayTime,
    DelayFeedback,
    DelayMix,
    ReverbSize,
    ReverbDamp,
    ReverbMix,
    AutoLevelTarget,
    AutoLevelRange,
    AutoLevelSpeed,
    DeEsserThreshold,
    DeEsserFreq,
    DeEsserRatio,
    DeEsserRange,
    InputGain,
    SatMix,
    PhaseInvert,
    GateThreshold,
    GateRange,
    GateAttack,
    GateHold,
    GateRelease,
    GateHysteresis,
    Cutoff,
    Resonance,
    LimiterCeiling,
    LimiterLookahead,
    CompAutoMakeup,
    CompThreshold,
    CompKnee,
    CompMode,
    ReverbPredelay,
    ReverbAlgorithm,
    DelayLowpass,
    DryWet,
    GateEnable,
    DeEsserEnable,
    EqEnable,
    CompEnable,
    SatEnable,
    DelayEnable,
    ReverbEnable,
    PitchEnable,
    LimiterEnable,
    AutoLevelEnable,
    StereoWidth,
    MonoBassFreq,
    BreathSensitivity,
    BreathReduction,
    StereoEnable,
    BreathEnable,
    NormalizerEnable,
    OversamplingEnable,
}

pub const PARAM_COUNT: usize = ParamId::OversamplingEnable as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Float { min: f32, max: f32, default: f32 },
    /// Persisted as an int32 0/1.
    Toggle { default: bool },
    /// Persisted as an int32 index.
    Choice { count: u32, default: u32 },
}

impl ParamKind {
    pub fn default_value(&self) -> f32 {
        match *self {
            ParamKind::Float { default, .. } => default,
            ParamKind::Toggle { default } => default as u32 as f32,
            ParamKind::Choice { default, .. } => default as f32,
        }
    }

    /// Toggles and choices are persisted as integers.
    pub fn is_discrete(&self) -> bool {
        !matches!(self, ParamKind::Float { .. })
    }

    /// Clamp a physical value into range, snapping discrete kinds.
    /// Non-finite input has no meaning and yields `None`.
    pub fn sanitize(&self, value: f32) -> Option<f32> {
        if !value.is_finite() {
            return None;
        }
        Some(match *self {
            ParamKind::Float { min, max, .. } => value.clamp(min, max),
            ParamKind::Toggle { .. } => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamKind::Choice { count, .. } => value.round().clamp(0.0, (count - 1) as f32),
        })
    }

    pub fn normalize(&self, value: f32) -> f32 {
        match *self {
            ParamKind::Float { min, max, .. } => ((value - min) / (max - min)).clamp(0.0, 1.0),
            ParamKind::Toggle { .. } => {
                if value >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamKind::Choice { count, .. } => {
                if count <= 1 {
                    0.0
                } else {
                    (value / (count - 1) as f32).clamp(0.0, 1.0)
                }
            }
        }
    }

    pub fn denormalize(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        match *self {
            ParamKind::Float { min, max, .. } => min + n * (max - min),
            ParamKind::Toggle { .. } => {
                if n >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamKind::Choice { count, .. } => (n * (count.max(1) - 1) as f32).round(),
        }
    }
}

/// Recomputes the coefficients governed by one parameter.
pub type ApplyFn = fn(&mut VocalChain);

#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub id: ParamId,
    pub address: u32,
    pub key: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub kind: ParamKind,
    pub apply: ApplyFn,
}

pub struct ParamRegistry {
    specs: Vec<ParamSpec>,
    by_address: HashMap<u32, usize>,
    by_key: HashMap<&'static str, usize>,
}

static REGISTRY: Lazy<ParamRegistry> = Lazy::new(ParamRegistry::build);

// =============================================================================
// TABLE
// =============================================================================

#[allow(clippy::too_many_arguments)]
fn float(
    id: ParamId,
    address: u32,
    key: &'static str,
    name: &'static str,
    unit: &'static str,
    range: (f32, f32),
    default: f32,
    apply: ApplyFn,
) -> ParamSpec {
    ParamSpec {
        id,
        address,
        key,
        name,
        unit,
        kind: ParamKind::Float {
            min: range.0,
            max: range.1,
            default,
        },
        apply,
    }
}

fn toggle(
    id: ParamId,
    address: u32,
    key: &'static str,
    name: &'static str,
    default: bool,
    apply: ApplyFn,
) -> ParamSpec {
    ParamSpec {
        id,
        address,
        key,
        name,
        unit: "",
        kind: ParamKind::Toggle { default },
        apply,
    }
}

fn choice(
    id: ParamId,
    address: u32,
    key: &'static str,
    name: &'static str,
    count: u32,
    default: u32,
    apply: ApplyFn,
) -> ParamSpec {
    ParamSpec {
        id,
        address,
        key,
        name,
        unit: "",
        kind: ParamKind::Choice { count, default },
        apply,
    }
}

fn table() -> Vec<ParamSpec> {
    use ParamId as P;
    type C = VocalChain;

    const FREQ: (f32, f32) = (20.0, 20000.0);
    const EQ_GAIN: (f32, f32) = (-20.0, 20.0);
    const EQ_Q: (f32, f32) = (0.1, 10.0);
    const PCT: (f32, f32) = (0.0, 100.0);

    vec![
        float(P::OutputGain, 0, "output_gain", "Output Gain", "", (0.0, 1.0), 1.0, C::update_io),
        toggle(P::Bypass, 1, "bypass", "Bypass", false, C::update_flags),
        float(P::PitchAmount, 2, "pitch_amount", "Pitch Amount", "", PCT, 50.0, C::update_pitch),
        float(P::PitchSpeed, 3, "pitch_speed", "Pitch Speed", "", PCT, 50.0, C::update_pitch),
        float(P::Eq1Freq, 4, "eq1_freq", "EQ Low Freq", " Hz", FREQ, 100.0, C::update_eq),
        float(P::Eq1Gain, 5, "eq1_gain", "EQ Low Gain", " dB", EQ_GAIN, 0.0, C::update_eq),
        float(P::Eq1Q, 6, "eq1_q", "EQ Low Q", "", EQ_Q, 0.707, C::update_eq),
        float(P::Eq2Freq, 7, "eq2_freq", "EQ Mid Freq", " Hz", FREQ, 1000.0, C::update_eq),
        float(P::Eq2Gain, 8, "eq2_gain", "EQ Mid Gain", " dB", EQ_GAIN, 0.0, C::update_eq),
        float(P::Eq2Q, 9, "eq2_q", "EQ Mid Q", "", EQ_Q, 0.707, C::update_eq),
        float(P::Eq3Freq, 10, "eq3_freq", "EQ High Freq", " Hz", FREQ, 5000.0, C::update_eq),
        float(P::Eq3Gain, 11, "eq3_gain", "EQ High Gain", " dB", EQ_GAIN, 0.0, C::update_eq),
        float(P::Eq3Q, 12, "eq3_q", "EQ High Q", "", EQ_Q, 0.707, C::update_eq),
        float(P::CompInput, 13, "comp_input", "Comp Input", " dB", (-48.0, 12.0), 0.0, C::update_compressor),
        float(P::CompRatio, 14, "comp_ratio", "Comp Ratio", ":1", (1.0, 20.0), 4.0, C::update_compressor),
        float(P::CompAttack, 15, "comp_attack", "Comp Attack", " ms", (0.1, 100.0), 10.0, C::update_compressor),
        float(P::CompRelease, 16, "comp_release", "Comp Release", " ms", (50.0, 1100.0), 100.0, C::update_compressor),
        float(P::CompMakeup, 17, "comp_makeup", "Comp Makeup", " dB", (0.0, 24.0), 0.0, C::update_compressor),
        float(P::SatDrive, 18, "sat_drive", "Saturation Drive", "", PCT, 20.0, C::update_saturator),
        choice(P::SatType, 19, "sat_type", "Saturation Type", 2, 0, C::update_saturator),
        float(P::DelayTime, 20, "delay_time", "Delay Time", " s", (0.0, 2.0), 0.25, C::update_delay),
        float(P::DelayFeedback, 21, "delay_feedback", "Delay Feedback", " %", PCT, 30.0, C::update_delay),
        float(P::DelayMix, 22, "delay_mix", "Delay Mix", " %", PCT, 30.0, C::update_delay),
        float(P::ReverbSize, 23, "reverb_size", "Reverb Size", " %", PCT, 50.0, C::update_reverb),
        float(P::ReverbDamp, 24, "reverb_damp", "Reverb Damping", " %", PCT, 50.0, C::update_reverb),
        float(P::ReverbMix, 25, "reverb_mix", "Reverb Mix", " %", PCT, 40.0, C::update_reverb),
        float(P::AutoLevelTarget, 26, "autolevel_target", "AutoLevel Target", " dB", (-60.0, 0.0), -10.0, C::update_auto_level),
        float(P::AutoLevelRange, 27, "autolevel_range", "AutoLevel Range", " dB", (0.0, 40.0), 12.0, C::update_auto_level),
        float(P::AutoLevelSpeed, 28, "autolevel_speed", "AutoLevel Speed", "", PCT, 50.0, C::update_auto_level),
        float(P::DeEsserThreshold, 29, "deesser_threshold", "De-esser Threshold", " dB", (-60.0, 0.0), -20.0, C::update_de_esser),
        float(P::DeEsserFreq, 30, "deesser_freq", "De-esser Freq", " Hz", (2000.0, 10000.0), 5000.0, C::update_de_esser),
        float(P::DeEsserRatio, 31, "deesser_ratio", "De-esser Ratio", ":1", (1.0, 20.0), 5.0, C::update_de_esser),
        float(P::DeEsserRange, 32, "deesser_range", "De-esser Range", " dB", (-24.0, 0.0), -6.0, C::update_de_esser),
        float(P::InputGain, 34, "input_gain", "Input Gain", " dB", (-100.0, 24.0), 0.0, C::update_io),
        float(P::SatMix, 35, "sat_mix", "Saturation Mix", " %", PCT, 100.0, C::update_saturator),
        toggle(P::PhaseInvert, 36, "phase_invert", "Phase Invert", false, C::update_flags),
        float(P::GateThreshold, 40, "gate_threshold", "Gate Threshold", " dB", (-80.0, 0.0), -40.0, C::update_gate),
        float(P::GateRange, 41, "gate_range", "Gate Range", " dB", (-80.0, 0.0), -20.0, C::update_gate),
        float(P::GateAttack, 42, "gate_attack", "Gate Attack", " ms", (0.01, 100.0), 1.0, C::update_gate),
        float(P::GateHold, 43, "gate_hold", "Gate Hold", " ms", (0.0, 1000.0), 150.0, C::update_gate),
        float(P::GateRelease, 44, "gate_release", "Gate Release", " ms", (10.0, 2000.0), 300.0, C::update_gate),
        float(P::GateHysteresis, 45, "gate_hysteresis", "Gate Hysteresis", " dB", (0.0, 12.0), 6.0, C::update_gate),
        float(P::Cutoff, 50, "cutoff", "Cutoff", " Hz", FREQ, 20000.0, C::update_tone),
        float(P::Resonance, 51, "resonance", "Resonance", " dB", (-20.0, 20.0), 0.0, C::update_tone),
        float(P::LimiterCeiling, 60, "limiter_ceiling", "Limiter Ceiling", " dB", (-6.0, 0.0), -0.1, C::update_limiter),
        float(P::LimiterLookahead, 61, "limiter_lookahead", "Limiter Lookahead", " ms", (0.1, 5.0), 2.0, C::update_limiter),
        toggle(P::CompAutoMakeup, 62, "comp_auto_makeup", "Comp Auto Makeup", true, C::update_compressor),
        float(P::CompThreshold, 63, "comp_threshold", "Comp Threshold", " dB", (-60.0, 0.0), -12.0, C::update_compressor),
        float(P::CompKnee, 64, "comp_knee", "Comp Knee", " dB", (0.0, 12.0), 3.0, C::update_compressor),
        choice(P::CompMode, 65, "comp_mode", "Comp Mode", 2, 1, C::update_compressor),
        float(P::ReverbPredelay, 66, "reverb_predelay", "Reverb Predelay", " ms", (0.0, 200.0), 20.0, C::update_reverb),
        choice(P::ReverbAlgorithm, 67, "reverb_algorithm", "Reverb Algorithm", 2, 1, C::update_reverb),
        float(P::DelayLowpass, 68, "delay_lowpass", "Delay Lowpass", " Hz", (1000.0, 20000.0), 20000.0, C::update_delay),
        float(P::DryWet, 69, "dry_wet", "Dry/Wet", " %", PCT, 100.0, C::update_io),
        toggle(P::GateEnable, 70, "gate_enable", "Gate", false, C::update_flags),
        toggle(P::DeEsserEnable, 71, "deesser_enable", "De-esser", false, C::update_flags),
        toggle(P::EqEnable, 72, "eq_enable", "EQ", true, C::update_flags),
        toggle(P::CompEnable, 73, "comp_enable", "Compressor", true, C::update_flags),
        toggle(P::SatEnable, 74, "sat_enable", "Saturator", false, C::update_flags),
        toggle(P::DelayEnable, 75, "delay_enable", "Delay", false, C::update_flags),
        toggle(P::ReverbEnable, 76, "reverb_enable", "Reverb", false, C::update_flags),
        toggle(P::PitchEnable, 77, "pitch_enable", "Pitch", false, C::update_flags),
        toggle(P::LimiterEnable, 78, "limiter_enable", "Limiter", true, C::update_flags),
        toggle(P::AutoLevelEnable, 79, "autolevel_enable", "AutoLevel", false, C::update_flags),
        float(P::StereoWidth, 80, "stereo_width", "Stereo Width", " %", (0.0, 200.0), 100.0, C::update_stereo),
        float(P::MonoBassFreq, 81, "mono_bass_freq", "Mono Bass", " Hz", (0.0, 400.0), 0.0, C::update_stereo),
        float(P::BreathSensitivity, 82, "breath_sensitivity", "Breath Sensitivity", "", PCT, 50.0, C::update_breath),
        float(P::BreathReduction, 83, "breath_reduction", "Breath Reduction", " dB", (0.0, 24.0), 12.0, C::update_breath),
        toggle(P::StereoEnable, 90, "stereo_enable", "Stereo Widener", false, C::update_flags),
        toggle(P::BreathEnable, 91, "breath_enable", "Breath Control", false, C::update_flags),
        toggle(P::NormalizerEnable, 92, "normalizer_enable", "Normalizer", false, C::update_normalizer),
        toggle(P::OversamplingEnable, 93, "oversampling_enable", "Oversampling", true, C::update_oversampling),
    ]
}

impl ParamRegistry {
    fn build() -> Self {
        let specs = table();
        debug_assert_eq!(specs.len(), PARAM_COUNT);
        let mut by_address = HashMap::with_capacity(specs.len());
        let mut by_key = HashMap::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            debug_assert_eq!(spec.id as usize, index, "{} out of order", spec.key);
            by_address.insert(spec.address, index);
            by_key.insert(spec.key, index);
        }
        Self {
            specs,
            by_address,
            by_key,
        }
    }

    /// The process-wide registry, built on first use.
    pub fn global() -> &'static ParamRegistry {
        &REGISTRY
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs in persisted order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamSpec> {
        self.specs.iter()
    }

    #[inline]
    pub fn spec(&self, id: ParamId) -> &ParamSpec {
        &self.specs[id as usize]
    }

    pub fn by_address(&self, address: u32) -> Result<&ParamSpec, ParamError> {
        self.by_address
            .get(&address)
            .map(|&i| &self.specs[i])
            .ok_or(ParamError::UnknownAddress(address))
    }

    pub fn by_key(&self, key: &str) -> Result<&ParamSpec, ParamError> {
        self.by_key
            .get(key)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| ParamError::UnknownKey(key.to_string()))
    }
}

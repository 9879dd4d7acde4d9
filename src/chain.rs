//! VocalChain
//!
//! The full per-sample processing graph. Coefficients live once in
//! `ChainCoeffs` and are shared by every channel; everything that remembers
//! past samples lives in one `ChannelState` per channel. Parameter writes go
//! through the registry and only rebuild the module they govern.
//!
//! # Order
//! 1. Input stage: normalizer safety gain, input gain, phase, tone filter.
//! 2. Pitch stabilizer.
//! 3. Gate, AutoLevel, De-esser, EQ, Compressor, Saturator (4x oversampled when enabled).
//! 4. Delay, Reverb, Stereo widener, Breath control, Limiter.
//! 5. Dry/wet against the latency-aligned dry signal, then output gain.

use std::sync::Arc;

use crate::dsp::auto_level::{AutoLevel, AutoLevelSettings, AutoLevelState};
use crate::dsp::breath::{BreathControl, BreathSettings, BreathState};
use crate::dsp::compressor::{Compressor, CompressorMode, CompressorSettings, CompressorState};
use crate::dsp::cross_normalizer::{CrossNormalizer, NormalizerControls};
use crate::dsp::de_esser::{DeEsser, DeEsserSettings, DeEsserState};
use crate::dsp::delay::{Delay, DelaySettings, DelayState};
use crate::dsp::eq::{self, EqBand, EqSettings, EqState};
use crate::dsp::fdn::{FdnReverb, FdnState};
use crate::dsp::gate::{Gate, GateSettings, GateState};
use crate::dsp::limiter::{self, LimiterSettings, LimiterState, TruePeakLimiter};
use crate::dsp::oversampler::{self, Oversampler, OversamplerState};
use crate::dsp::pitch::{PitchSettings, PitchShifter, PitchState};
use crate::dsp::reverb::{ReverbAlgorithm, ReverbSettings, SchroederReverb, SchroederState};
use crate::dsp::ring_buffer::RingBuffer;
use crate::dsp::saturator::{SaturationType, Saturator, SaturatorSettings, SaturatorState};
use crate::dsp::stereo_width::{StereoWidener, StereoWidthSettings, StereoWidthState};
use crate::dsp::svf::{SvfCoeffs, SvfKind, SvfState};
use crate::dsp::utils::{db_to_lin, lin_to_db};
use crate::events::{ParamEvent, ParamReceiver};
use crate::meters::Meters;
use crate::params::{ParamError, ParamId, ParamRegistry, ParamSpec, PARAM_COUNT};

/// Channels beyond this are passed through untouched.
pub const MAX_CHANNELS: usize = 8;
// Tone filter Q for both the lowpass and the resonance peak.
const TONE_Q: f32 = 0.707;
// Cutoffs at or above this leave the tone lowpass out of the path (Hz).
const TONE_OPEN_HZ: f32 = 20000.0;
// Resonance closer to zero than this leaves the peak out (dB).
const TONE_FLAT_DB: f32 = 1e-4;
// Default normalizer target until autolevel_target is applied (dBFS).
const NORMALIZER_DEFAULT_TARGET_DB: f32 = -10.0;

/// Enable flags, read once per block (or sub-block).
#[derive(Debug, Clone, Copy, Default)]
struct ModuleFlags {
    bypass: bool,
    phase_invert: bool,
    pitch: bool,
    gate: bool,
    auto_level: bool,
    de_esser: bool,
    eq: bool,
    compressor: bool,
    saturator: bool,
    delay: bool,
    reverb: bool,
    stereo: bool,
    breath: bool,
    limiter: bool,
    normalizer: bool,
    oversampling: bool,
}

/// Derived coefficients for every module, shared by all channels.
#[derive(Debug, Clone)]
struct ChainCoeffs {
    input_gain: f32,
    output_gain: f32,
    wet: f32,
    tone_lowpass: Option<SvfCoeffs>,
    tone_peak: Option<SvfCoeffs>,
    pitch: PitchShifter,
    oversampler: Oversampler,
    gate: Gate,
    auto_level: AutoLevel,
    de_esser: DeEsser,
    eq: eq::Eq,
    compressor: Compressor,
    saturator: Saturator,
    delay: Delay,
    reverb_algorithm: ReverbAlgorithm,
    schroeder: SchroederReverb,
    fdn: FdnReverb,
    widener: StereoWidener,
    breath: BreathControl,
    limiter: TruePeakLimiter,
}

impl ChainCoeffs {
    fn new(sample_rate: f32) -> Self {
        Self {
            input_gain: 1.0,
            output_gain: 1.0,
            wet: 1.0,
            tone_lowpass: None,
            tone_peak: None,
            pitch: PitchShifter::new(&PitchSettings::default(), sample_rate),
            oversampler: Oversampler::new(),
            gate: Gate::new(&GateSettings::default(), sample_rate),
            auto_level: AutoLevel::new(&AutoLevelSettings::default(), sample_rate),
            de_esser: DeEsser::new(&DeEsserSettings::default(), sample_rate),
            eq: eq::Eq::new(&EqSettings::default(), sample_rate),
            compressor: Compressor::new(&CompressorSettings::default(), sample_rate),
            saturator: Saturator::new(&SaturatorSettings::default(), sample_rate),
            delay: Delay::new(&DelaySettings::default(), sample_rate),
            reverb_algorithm: ReverbAlgorithm::Fdn,
            schroeder: SchroederReverb::new(&ReverbSettings::default(), sample_rate),
            fdn: FdnReverb::new(&ReverbSettings::default(), sample_rate),
            widener: StereoWidener::new(&StereoWidthSettings::default(), sample_rate),
            breath: BreathControl::new(&BreathSettings::default(), sample_rate),
            limiter: TruePeakLimiter::new(&LimiterSettings::default(), sample_rate),
        }
    }

    /// Input stage through reverb for one channel sample.
    #[inline]
    fn front(&self, flags: &ModuleFlags, st: &mut ChannelState, input: f32) -> f32 {
        let mut x = input * self.input_gain;
        if flags.phase_invert {
            x = -x;
        }
        if let Some(lp) = &self.tone_lowpass {
            x = lp.process(&mut st.tone_lowpass, x);
        }
        if let Some(peak) = &self.tone_peak {
            x = peak.process(&mut st.tone_peak, x);
        }

        if flags.pitch {
            x = self.pitch.process(&mut st.pitch, x);
        }

        if flags.oversampling {
            let up = self.oversampler.upsample(&mut st.oversampler, x);
            let mut inner = [0.0f32; oversampler::FACTOR];
            for (out, &u) in inner.iter_mut().zip(up.iter()) {
                *out = self.nonlinear(flags, st, u);
            }
            x = self.oversampler.downsample(&mut st.oversampler, &inner);
        } else {
            x = self.nonlinear(flags, st, x);
        }

        if flags.delay {
            x = self.delay.process(&mut st.delay, x);
        }
        if flags.reverb {
            x = match self.reverb_algorithm {
                ReverbAlgorithm::Schroeder => self.schroeder.process(&mut st.schroeder, x),
                ReverbAlgorithm::Fdn => self.fdn.process(&mut st.fdn, x),
            };
        }
        x
    }

    /// The oversampled section; runs at whatever rate its coefficients were built for.
    #[inline]
    fn nonlinear(&self, flags: &ModuleFlags, st: &mut ChannelState, input: f32) -> f32 {
        let mut x = input;
        if flags.gate {
            x = self.gate.process(&mut st.gate, x);
        }
        if flags.auto_level {
            x = self.auto_level.process(&mut st.auto_level, x);
        }
        if flags.de_esser {
            x = self.de_esser.process(&mut st.de_esser, x);
        }
        if flags.eq {
            x = self.eq.process(&mut st.eq, x);
        }
        if flags.compressor {
            x = self.compressor.process(&mut st.compressor, x);
        }
        if flags.saturator {
            x = self.saturator.process(&mut st.saturator, x);
        }
        x
    }
}

/// Everything one channel remembers between samples.
#[derive(Debug, Clone)]
struct ChannelState {
    tone_lowpass: SvfState,
    tone_peak: SvfState,
    pitch: PitchState,
    oversampler: OversamplerState,
    gate: GateState,
    auto_level: AutoLevelState,
    de_esser: DeEsserState,
    eq: EqState,
    compressor: CompressorState,
    saturator: SaturatorState,
    delay: DelayState,
    schroeder: SchroederState,
    fdn: FdnState,
    limiter: LimiterState,
    // Input history for the latency-aligned dry path
    dry: RingBuffer,
}

impl ChannelState {
    fn new(sample_rate: f32, channel: usize) -> Self {
        let max_latency = oversampler::LATENCY
            + limiter::lookahead_samples(limiter::MAX_LOOKAHEAD_MS, sample_rate);
        Self {
            tone_lowpass: SvfState::default(),
            tone_peak: SvfState::default(),
            pitch: PitchState::new(sample_rate),
            oversampler: OversamplerState::default(),
            gate: GateState::default(),
            auto_level: AutoLevelState::default(),
            de_esser: DeEsserState::default(),
            eq: EqState::default(),
            compressor: CompressorState::default(),
            saturator: SaturatorState::default(),
            delay: DelayState::new(sample_rate),
            schroeder: SchroederState::new(sample_rate, channel),
            fdn: FdnState::new(sample_rate, channel),
            limiter: LimiterState::new(sample_rate),
            dry: RingBuffer::new(max_latency + 1),
        }
    }

    fn reset(&mut self) {
        self.tone_lowpass.reset();
        self.tone_peak.reset();
        self.pitch.reset();
        self.oversampler.reset();
        self.reset_nonlinear();
        self.delay.reset();
        self.schroeder.reset();
        self.fdn.reset();
        self.limiter.reset();
        self.dry.clear();
    }

    fn reset_nonlinear(&mut self) {
        self.gate.reset();
        self.auto_level.reset();
        self.de_esser.reset();
        self.eq.reset();
        self.compressor.reset();
        self.saturator.reset();
    }
}

pub struct VocalChain {
    sample_rate: f32,
    num_channels: usize,
    values: [f32; PARAM_COUNT],
    flags: ModuleFlags,
    coeffs: ChainCoeffs,
    channels: Vec<ChannelState>,
    widener: StereoWidthState,
    breath: BreathState,
    normalizer: CrossNormalizer,
    controls: NormalizerControls,
    latency: usize,
    meters: Arc<Meters>,
}

impl VocalChain {
    /// Build a chain with every parameter at its default. Allocates.
    pub fn new(sample_rate: f32, channels: usize) -> Self {
        let registry = ParamRegistry::global();
        let mut values = [0.0f32; PARAM_COUNT];
        for spec in registry.iter() {
            values[spec.id as usize] = spec.kind.default_value();
        }
        let num_channels = channels.clamp(1, MAX_CHANNELS);
        let mut chain = Self {
            sample_rate,
            num_channels,
            values,
            flags: ModuleFlags::default(),
            coeffs: ChainCoeffs::new(sample_rate),
            channels: Vec::new(),
            widener: StereoWidthState::default(),
            breath: BreathState::default(),
            normalizer: CrossNormalizer::new(NORMALIZER_DEFAULT_TARGET_DB, sample_rate),
            controls: NormalizerControls::default(),
            latency: 0,
            meters: Arc::new(Meters::new()),
        };
        chain.reset(sample_rate);
        chain
    }

    /// Resize every buffer for `sample_rate` and rebuild all coefficients. Allocates.
    pub fn reset(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.channels = (0..self.num_channels)
            .map(|ch| ChannelState::new(sample_rate, ch))
            .collect();
        self.normalizer = CrossNormalizer::new(self.value(ParamId::AutoLevelTarget), sample_rate);
        self.coeffs = ChainCoeffs::new(sample_rate);
        self.rebuild_all();
        self.clear();
    }

    /// Drop all signal history without reallocating.
    pub fn clear(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        self.widener.reset();
        self.breath.reset();
        self.normalizer.reset();
        self.controls = NormalizerControls::default();
        self.apply_normalizer_controls();
        self.meters.reset();
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Total delay of the wet path, which the dry path is aligned to.
    #[inline]
    pub fn latency_samples(&self) -> usize {
        self.latency
    }

    pub fn meters(&self) -> &Arc<Meters> {
        &self.meters
    }

    // =========================================================================
    // PARAMETERS
    // =========================================================================

    #[inline]
    pub fn value(&self, id: ParamId) -> f32 {
        self.values[id as usize]
    }

    #[inline]
    fn flag(&self, id: ParamId) -> bool {
        self.value(id) >= 0.5
    }

    /// Current physical value at `address`.
    pub fn parameter(&self, address: u32) -> Result<f32, ParamError> {
        let spec = ParamRegistry::global().by_address(address)?;
        Ok(self.value(spec.id))
    }

    /// Write a physical value. Out-of-range values are clamped; non-finite ones are ignored.
    pub fn set_parameter(&mut self, address: u32, value: f32) -> Result<(), ParamError> {
        let spec = *ParamRegistry::global().by_address(address)?;
        self.write_value(&spec, value);
        Ok(())
    }

    /// Write a value given in the normalized 0..1 domain.
    pub fn set_parameter_normalized(
        &mut self,
        address: u32,
        normalized: f32,
    ) -> Result<(), ParamError> {
        let spec = *ParamRegistry::global().by_address(address)?;
        self.write_value(&spec, spec.kind.denormalize(normalized));
        Ok(())
    }

    pub fn parameter_normalized(&self, address: u32) -> Result<f32, ParamError> {
        let spec = ParamRegistry::global().by_address(address)?;
        Ok(spec.kind.normalize(self.value(spec.id)))
    }

    pub fn set_parameter_by_key(&mut self, key: &str, value: f32) -> Result<(), ParamError> {
        let spec = *ParamRegistry::global().by_key(key)?;
        self.write_value(&spec, value);
        Ok(())
    }

    /// Put every parameter back to its default.
    pub fn load_defaults(&mut self) {
        for spec in ParamRegistry::global().iter() {
            self.write_value(spec, spec.kind.default_value());
        }
    }

    /// Store a value and run its apply hook, only if it actually changed.
    pub(crate) fn write_value(&mut self, spec: &ParamSpec, value: f32) {
        let Some(value) = spec.kind.sanitize(value) else {
            return;
        };
        let slot = &mut self.values[spec.id as usize];
        if *slot == value {
            return;
        }
        *slot = value;
        (spec.apply)(self);
    }

    // =========================================================================
    // APPLY HOOKS
    // =========================================================================

    fn rebuild_all(&mut self) {
        self.update_flags();
        self.update_io();
        self.update_tone();
        self.update_pitch();
        self.update_nonlinear_section();
        self.update_delay();
        self.update_reverb();
        self.update_stereo();
        self.update_breath();
        self.update_limiter();
    }

    /// Rate of the gate..saturator section.
    #[inline]
    fn inner_rate(&self) -> f32 {
        if self.flags.oversampling {
            self.sample_rate * oversampler::FACTOR as f32
        } else {
            self.sample_rate
        }
    }

    fn update_nonlinear_section(&mut self) {
        self.update_gate();
        self.update_auto_level();
        self.update_de_esser();
        self.update_eq();
        self.update_compressor();
        self.update_saturator();
    }

    fn update_latency(&mut self) {
        let mut latency = 0;
        if self.flags.oversampling {
            latency += oversampler::LATENCY;
        }
        if self.flags.limiter {
            latency += self.coeffs.limiter.latency_samples();
        }
        self.latency = latency;
        self.meters.set_latency_samples(latency as u32);
    }

    pub(crate) fn update_flags(&mut self) {
        let old = self.flags;
        self.flags = ModuleFlags {
            bypass: self.flag(ParamId::Bypass),
            phase_invert: self.flag(ParamId::PhaseInvert),
            pitch: self.flag(ParamId::PitchEnable),
            gate: self.flag(ParamId::GateEnable),
            auto_level: self.flag(ParamId::AutoLevelEnable),
            de_esser: self.flag(ParamId::DeEsserEnable),
            eq: self.flag(ParamId::EqEnable),
            compressor: self.flag(ParamId::CompEnable),
            saturator: self.flag(ParamId::SatEnable),
            delay: self.flag(ParamId::DelayEnable),
            reverb: self.flag(ParamId::ReverbEnable),
            stereo: self.flag(ParamId::StereoEnable),
            breath: self.flag(ParamId::BreathEnable),
            limiter: self.flag(ParamId::LimiterEnable),
            normalizer: self.flag(ParamId::NormalizerEnable),
            oversampling: self.flag(ParamId::OversamplingEnable),
        };

        // Modules with long memories start clean when switched back on
        let new = self.flags;
        for ch in &mut self.channels {
            if new.pitch && !old.pitch {
                ch.pitch.reset();
            }
            if new.delay && !old.delay {
                ch.delay.reset();
            }
            if new.reverb && !old.reverb {
                ch.schroeder.reset();
                ch.fdn.reset();
            }
            if new.limiter && !old.limiter {
                ch.limiter.reset();
            }
        }
        if new.breath && !old.breath {
            self.breath.reset();
        }
        self.update_latency();
    }

    pub(crate) fn update_io(&mut self) {
        self.coeffs.input_gain = db_to_lin(self.value(ParamId::InputGain));
        self.coeffs.output_gain = self.value(ParamId::OutputGain);
        self.coeffs.wet = self.value(ParamId::DryWet) / 100.0;
    }

    pub(crate) fn update_tone(&mut self) {
        let sr = self.sample_rate;
        let cutoff = self.value(ParamId::Cutoff);
        let resonance = self.value(ParamId::Resonance);
        self.coeffs.tone_lowpass = (cutoff < TONE_OPEN_HZ)
            .then(|| SvfCoeffs::new(SvfKind::LowPass, cutoff, TONE_Q, 0.0, sr));
        self.coeffs.tone_peak = (resonance.abs() > TONE_FLAT_DB)
            .then(|| SvfCoeffs::new(SvfKind::Peaking, cutoff, TONE_Q, resonance, sr));
    }

    pub(crate) fn update_pitch(&mut self) {
        let settings = PitchSettings {
            amount: self.value(ParamId::PitchAmount),
            speed: self.value(ParamId::PitchSpeed),
        };
        self.coeffs.pitch = PitchShifter::new(&settings, self.sample_rate);
    }

    pub(crate) fn update_gate(&mut self) {
        let settings = GateSettings {
            threshold_db: self.value(ParamId::GateThreshold),
            range_db: self.value(ParamId::GateRange),
            attack_ms: self.value(ParamId::GateAttack),
            hold_ms: self.value(ParamId::GateHold),
            release_ms: self.value(ParamId::GateRelease),
            hysteresis_db: self.value(ParamId::GateHysteresis),
        };
        self.coeffs.gate = Gate::new(&settings, self.inner_rate());
    }

    pub(crate) fn update_auto_level(&mut self) {
        let settings = AutoLevelSettings {
            target_db: self.value(ParamId::AutoLevelTarget),
            range_db: self.value(ParamId::AutoLevelRange),
            speed: self.value(ParamId::AutoLevelSpeed),
        };
        self.coeffs.auto_level = AutoLevel::new(&settings, self.inner_rate());
        self.normalizer.set_target_db(settings.target_db);
        self.apply_normalizer_controls();
    }

    pub(crate) fn update_de_esser(&mut self) {
        let settings = DeEsserSettings {
            threshold_db: self.value(ParamId::DeEsserThreshold),
            freq_hz: self.value(ParamId::DeEsserFreq),
            ratio: self.value(ParamId::DeEsserRatio),
            range_db: self.value(ParamId::DeEsserRange),
        };
        self.coeffs.de_esser = DeEsser::new(&settings, self.inner_rate());
    }

    pub(crate) fn update_eq(&mut self) {
        let band = |f: ParamId, g: ParamId, q: ParamId| EqBand {
            freq_hz: self.value(f),
            gain_db: self.value(g),
            q: self.value(q),
        };
        let settings = EqSettings {
            bands: [
                band(ParamId::Eq1Freq, ParamId::Eq1Gain, ParamId::Eq1Q),
                band(ParamId::Eq2Freq, ParamId::Eq2Gain, ParamId::Eq2Q),
                band(ParamId::Eq3Freq, ParamId::Eq3Gain, ParamId::Eq3Q),
            ],
        };
        self.coeffs.eq = eq::Eq::new(&settings, self.inner_rate());
        self.apply_normalizer_controls();
    }

    pub(crate) fn update_compressor(&mut self) {
        let mode = if self.value(ParamId::CompMode) >= 0.5 {
            CompressorMode::Fet
        } else {
            CompressorMode::SoftKnee
        };
        let settings = CompressorSettings {
            mode,
            threshold_db: self.value(ParamId::CompThreshold),
            ratio: self.value(ParamId::CompRatio),
            attack_ms: self.value(ParamId::CompAttack),
            release_ms: self.value(ParamId::CompRelease),
            knee_db: self.value(ParamId::CompKnee),
            makeup_db: self.value(ParamId::CompMakeup),
            input_db: self.value(ParamId::CompInput),
            auto_makeup: self.flag(ParamId::CompAutoMakeup),
        };
        self.coeffs.compressor = Compressor::new(&settings, self.inner_rate());
        self.apply_normalizer_controls();
    }

    pub(crate) fn update_saturator(&mut self) {
        let settings = SaturatorSettings {
            drive: self.value(ParamId::SatDrive),
            kind: SaturationType::from_index(self.value(ParamId::SatType) as i32),
            mix: self.value(ParamId::SatMix),
        };
        self.coeffs.saturator = Saturator::new(&settings, self.inner_rate());
        self.apply_normalizer_controls();
    }

    pub(crate) fn update_delay(&mut self) {
        let settings = DelaySettings {
            time_s: self.value(ParamId::DelayTime),
            feedback: self.value(ParamId::DelayFeedback),
            mix: self.value(ParamId::DelayMix),
            lowpass_hz: self.value(ParamId::DelayLowpass),
        };
        self.coeffs.delay = Delay::new(&settings, self.sample_rate);
    }

    pub(crate) fn update_reverb(&mut self) {
        let settings = ReverbSettings {
            size: self.value(ParamId::ReverbSize),
            damp: self.value(ParamId::ReverbDamp),
            mix: self.value(ParamId::ReverbMix),
            predelay_ms: self.value(ParamId::ReverbPredelay),
        };
        let algorithm = ReverbAlgorithm::from_index(self.value(ParamId::ReverbAlgorithm) as i32);
        if algorithm != self.coeffs.reverb_algorithm {
            for ch in &mut self.channels {
                ch.schroeder.reset();
                ch.fdn.reset();
            }
        }
        self.coeffs.reverb_algorithm = algorithm;
        self.coeffs.schroeder = SchroederReverb::new(&settings, self.sample_rate);
        self.coeffs.fdn = FdnReverb::new(&settings, self.sample_rate);
    }

    pub(crate) fn update_stereo(&mut self) {
        let settings = StereoWidthSettings {
            width: self.value(ParamId::StereoWidth),
            mono_bass_hz: self.value(ParamId::MonoBassFreq),
        };
        self.coeffs.widener = StereoWidener::new(&settings, self.sample_rate);
    }

    pub(crate) fn update_breath(&mut self) {
        let settings = BreathSettings {
            sensitivity: self.value(ParamId::BreathSensitivity),
            reduction_db: self.value(ParamId::BreathReduction),
        };
        self.coeffs.breath = BreathControl::new(&settings, self.sample_rate);
    }

    pub(crate) fn update_limiter(&mut self) {
        let settings = LimiterSettings {
            ceiling_db: self.value(ParamId::LimiterCeiling),
            lookahead_ms: self.value(ParamId::LimiterLookahead),
        };
        self.coeffs.limiter = TruePeakLimiter::new(&settings, self.sample_rate);
        self.update_latency();
    }

    pub(crate) fn update_normalizer(&mut self) {
        self.update_flags();
        self.normalizer.reset();
        self.controls = NormalizerControls::default();
        self.apply_normalizer_controls();
    }

    pub(crate) fn update_oversampling(&mut self) {
        self.update_flags();
        self.update_nonlinear_section();
        for ch in &mut self.channels {
            ch.oversampler.reset();
            ch.reset_nonlinear();
        }
    }

    /// Push the supervisor's controls into the modules it steers, or neutral
    /// values when it is off.
    fn apply_normalizer_controls(&mut self) {
        let active = self.flags.normalizer;
        let c = if active {
            self.controls
        } else {
            NormalizerControls::default()
        };
        self.coeffs
            .auto_level
            .set_external_gain_db(active.then_some(c.auto_gain_db));
        self.coeffs
            .compressor
            .set_threshold_offset_db(c.comp_threshold_offset_db);
        self.coeffs.eq.set_mud_cut_db(c.mud_cut_db);
        self.coeffs.saturator.set_drive_scale(c.drive_scale);
    }

    // =========================================================================
    // PROCESSING
    // =========================================================================

    /// Process one block in place. Never allocates.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]]) {
        let len = block_len(channels);
        self.meter_input(channels, len);
        self.process_range(channels, 0, len);
        self.meter_output(channels, len);
    }

    /// Process one block, applying queued parameter events at their sample
    /// offsets. Events at or past the end of the block are applied after it.
    pub fn process_block_with_events(
        &mut self,
        channels: &mut [&mut [f32]],
        events: &mut ParamReceiver,
    ) {
        let len = block_len(channels);
        self.meter_input(channels, len);

        let mut pos = 0;
        while pos < len {
            while let Some(event) = events.pop_due(pos as u32) {
                self.apply_event(event);
            }
            let next = events
                .next_offset()
                .map(|offset| (offset as usize).clamp(pos + 1, len))
                .unwrap_or(len);
            self.process_range(channels, pos, next);
            pos = next;
        }
        while let Some(event) = events.pop_due(u32::MAX) {
            self.apply_event(event);
        }

        self.meter_output(channels, len);
    }

    #[inline]
    fn apply_event(&mut self, event: ParamEvent) {
        // Unknown addresses have nothing to update
        let _ = self.set_parameter(event.address, event.value);
    }

    fn process_range(&mut self, channels: &mut [&mut [f32]], start: usize, end: usize) {
        let flags = self.flags;
        if start >= end {
            return;
        }
        let num = channels.len().min(self.channels.len());
        if num == 0 {
            return;
        }
        if flags.bypass {
            // Bypassed audio still goes through the dry line so it stays at the
            // reported latency and the dry history is current on re-enable
            let latency = self.latency;
            for (ch, st) in channels.iter_mut().zip(self.channels.iter_mut()).take(num) {
                for s in &mut ch[start..end] {
                    st.dry.write(*s);
                    *s = st.dry.read_at(latency);
                }
            }
            return;
        }
        let inv_num = 1.0 / num as f32;

        let safety = if flags.normalizer {
            for i in start..end {
                let mono: f32 = channels[..num].iter().map(|ch| ch[i]).sum::<f32>() * inv_num;
                self.normalizer.observe(mono);
            }
            self.controls = self.normalizer.finish_block();
            self.apply_normalizer_controls();
            self.controls.safety_gain
        } else {
            1.0
        };

        let coeffs = &self.coeffs;
        let states = &mut self.channels;
        let latency = self.latency;
        let wet = coeffs.wet;
        let dry = 1.0 - wet;
        let stereo = flags.stereo && num == 2;

        for i in start..end {
            let mut frame = [0.0f32; MAX_CHANNELS];
            for (c, st) in states.iter_mut().enumerate().take(num) {
                let x = channels[c][i];
                st.dry.write(x);
                frame[c] = coeffs.front(&flags, st, x * safety);
            }

            if stereo {
                let (l, r) = coeffs.widener.process(&mut self.widener, frame[0], frame[1]);
                frame[0] = l;
                frame[1] = r;
            }

            if flags.breath {
                let mono = frame[..num].iter().sum::<f32>() * inv_num;
                let g = coeffs.breath.next_gain(&mut self.breath, mono);
                for s in &mut frame[..num] {
                    *s *= g;
                }
            }

            for (c, st) in states.iter_mut().enumerate().take(num) {
                let mut y = frame[c];
                if flags.limiter {
                    y = coeffs.limiter.process(&mut st.limiter, y);
                }
                let aligned = st.dry.read_at(latency);
                channels[c][i] = (y * wet + aligned * dry) * coeffs.output_gain;
            }
        }
    }

    fn meter_input(&self, channels: &[&mut [f32]], len: usize) {
        let (l, r) = stereo_peaks(channels, len);
        self.meters.set_input_peak(l, r);
    }

    fn meter_output(&self, channels: &[&mut [f32]], len: usize) {
        let (l, r) = stereo_peaks(channels, len);
        self.meters.set_output_peak(l, r);

        let flags = self.flags;
        let Some(st) = self.channels.first() else {
            return;
        };
        let active = |on: bool, db: f32| if on && !flags.bypass { db } else { 0.0 };
        self.meters
            .set_gate_gain_db(active(flags.gate, lin_to_db(st.gate.gain())));
        self.meters.set_de_esser_reduction_db(active(
            flags.de_esser,
            st.de_esser.gain_reduction_db(),
        ));
        self.meters.set_comp_reduction_db(active(
            flags.compressor,
            st.compressor.gain_reduction_db(),
        ));
        self.meters.set_limiter_reduction_db(active(
            flags.limiter,
            st.limiter.gain_reduction_db(),
        ));
    }
}

#[inline]
fn block_len(channels: &[&mut [f32]]) -> usize {
    channels.iter().map(|ch| ch.len()).min().unwrap_or(0)
}

fn stereo_peaks(channels: &[&mut [f32]], len: usize) -> (f32, f32) {
    let peak = |ch: Option<&&mut [f32]>| {
        ch.map(|c| c[..len].iter().fold(0.0f32, |m, x| m.max(x.abs())))
            .unwrap_or(0.0)
    };
    let l = peak(channels.first());
    let r = if channels.len() > 1 {
        peak(channels.get(1))
    } else {
        l
    };
    (l, r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::param_queue;
    use std::f32::consts::PI;

    const SR: f32 = 48000.0;
    const BLOCK: usize = 256;

    fn addr(id: ParamId) -> u32 {
        ParamRegistry::global().spec(id).address
    }

    fn set(chain: &mut VocalChain, id: ParamId, value: f32) {
        chain.set_parameter(addr(id), value).unwrap();
    }

    fn all_off(chain: &mut VocalChain) {
        for id in [
            ParamId::GateEnable,
            ParamId::DeEsserEnable,
            ParamId::EqEnable,
            ParamId::CompEnable,
            ParamId::SatEnable,
            ParamId::DelayEnable,
            ParamId::ReverbEnable,
            ParamId::PitchEnable,
            ParamId::LimiterEnable,
            ParamId::AutoLevelEnable,
            ParamId::StereoEnable,
            ParamId::BreathEnable,
            ParamId::NormalizerEnable,
            ParamId::OversamplingEnable,
        ] {
            set(chain, id, 0.0);
        }
    }

    fn sine(freq: f32, amp: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| amp * (2.0 * PI * freq * n as f32 / SR).sin())
            .collect()
    }

    fn run_stereo(chain: &mut VocalChain, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let mut l = left.to_vec();
        let mut r = right.to_vec();
        for (lc, rc) in l.chunks_mut(BLOCK).zip(r.chunks_mut(BLOCK)) {
            let mut bufs = [lc, rc];
            chain.process_block(&mut bufs);
        }
        (l, r)
    }

    fn run_mono(chain: &mut VocalChain, input: &[f32]) -> Vec<f32> {
        let mut x = input.to_vec();
        for chunk in x.chunks_mut(BLOCK) {
            let mut bufs = [chunk];
            chain.process_block(&mut bufs);
        }
        x
    }

    #[test]
    fn test_everything_disabled_is_identity() {
        let mut chain = VocalChain::new(SR, 2);
        all_off(&mut chain);
        assert_eq!(chain.latency_samples(), 0);
        let left: Vec<f32> = (0..4000).map(|n| ((n * 7919) % 2001) as f32 / 1000.0 - 1.0).collect();
        let right = sine(440.0, 0.7, 4000);
        let (l, r) = run_stereo(&mut chain, &left, &right);
        assert_eq!(l, left);
        assert_eq!(r, right);
    }

    #[test]
    fn test_bypass_is_delayed_by_reported_latency() {
        let mut chain = VocalChain::new(SR, 1);
        set(&mut chain, ParamId::SatEnable, 1.0);
        set(&mut chain, ParamId::Bypass, 1.0);
        let latency = chain.latency_samples();
        assert_eq!(latency, oversampler::LATENCY + 96);
        let x = sine(200.0, 0.9, 2048);
        let y = run_mono(&mut chain, &x);
        for (n, &v) in y.iter().enumerate() {
            let expected = if n >= latency { x[n - latency] } else { 0.0 };
            assert_eq!(v, expected, "n={n}");
        }
    }

    #[test]
    fn test_bypass_with_zero_latency_is_untouched() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::SatEnable, 1.0);
        set(&mut chain, ParamId::Bypass, 1.0);
        let x = sine(200.0, 0.9, 2048);
        assert_eq!(run_mono(&mut chain, &x), x);
    }

    #[test]
    fn test_bypass_keeps_dry_history() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::OversamplingEnable, 1.0);
        set(&mut chain, ParamId::DryWet, 0.0);
        assert_eq!(chain.latency_samples(), oversampler::LATENCY);

        run_mono(&mut chain, &[1.0; 1024]);
        set(&mut chain, ParamId::Bypass, 1.0);
        run_mono(&mut chain, &[0.0; 1024]);
        set(&mut chain, ParamId::Bypass, 0.0);

        // The dry line saw the silence fed during bypass
        let y = run_mono(&mut chain, &[0.0; 64]);
        assert!(y.iter().all(|&v| v == 0.0), "{:?}", &y[..16]);
    }

    #[test]
    fn test_bypass_toggle_does_not_jump_in_time() {
        // Fully dry: engaged and bypassed outputs are the same delayed input
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::LimiterEnable, 1.0);
        set(&mut chain, ParamId::DryWet, 0.0);
        let latency = chain.latency_samples();
        let x: Vec<f32> = (0..1536).map(|n| n as f32 / 1536.0).collect();
        let mut y = run_mono(&mut chain, &x[..512]);
        set(&mut chain, ParamId::Bypass, 1.0);
        y.extend(run_mono(&mut chain, &x[512..1024]));
        set(&mut chain, ParamId::Bypass, 0.0);
        y.extend(run_mono(&mut chain, &x[1024..]));
        for (n, &v) in y.iter().enumerate() {
            let expected = if n >= latency { x[n - latency] } else { 0.0 };
            assert!((v - expected).abs() < 1e-6, "n={n}");
        }
    }

    #[test]
    fn test_default_latency() {
        let chain = VocalChain::new(SR, 2);
        // Oversampler round trip plus 2 ms lookahead
        assert_eq!(chain.latency_samples(), oversampler::LATENCY + 96);
        assert_eq!(chain.meters().get_latency_samples(), 112);
    }

    #[test]
    fn test_latency_follows_flags_and_lookahead() {
        let mut chain = VocalChain::new(SR, 2);
        set(&mut chain, ParamId::OversamplingEnable, 0.0);
        assert_eq!(chain.latency_samples(), 96);
        set(&mut chain, ParamId::LimiterLookahead, 5.0);
        assert_eq!(chain.latency_samples(), 240);
        set(&mut chain, ParamId::LimiterEnable, 0.0);
        assert_eq!(chain.latency_samples(), 0);
        set(&mut chain, ParamId::OversamplingEnable, 1.0);
        assert_eq!(chain.latency_samples(), oversampler::LATENCY);
    }

    #[test]
    fn test_dry_path_is_latency_aligned() {
        // Half dry, half wet through an otherwise transparent chain: an
        // impulse must come out as a single impulse at the reported latency.
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::LimiterEnable, 1.0);
        set(&mut chain, ParamId::DryWet, 50.0);
        let latency = chain.latency_samples();
        let mut x = vec![0.0; 1024];
        x[10] = 0.5;
        let y = run_mono(&mut chain, &x);
        for (n, &v) in y.iter().enumerate() {
            if n == 10 + latency {
                assert!((v - 0.5).abs() < 1e-6);
            } else {
                assert_eq!(v, 0.0, "n={n}");
            }
        }
    }

    #[test]
    fn test_gain_stage_and_phase() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::InputGain, 6.0);
        set(&mut chain, ParamId::OutputGain, 0.5);
        set(&mut chain, ParamId::PhaseInvert, 1.0);
        let y = run_mono(&mut chain, &[0.25; 64]);
        let expected = -0.25 * db_to_lin(6.0) * 0.5;
        assert!(y.iter().all(|v| (v - expected).abs() < 1e-6));
    }

    #[test]
    fn test_tone_filter_darkens() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::Cutoff, 500.0);
        let y = run_mono(&mut chain, &sine(8000.0, 1.0, 4800));
        let peak = y[2400..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(peak < 0.01, "{peak}");
    }

    #[test]
    fn test_scenario_gate_compressor_limiter() {
        let build = || {
            let mut chain = VocalChain::new(SR, 1);
            all_off(&mut chain);
            set(&mut chain, ParamId::GateEnable, 1.0);
            set(&mut chain, ParamId::CompEnable, 1.0);
            set(&mut chain, ParamId::LimiterEnable, 1.0);
            set(&mut chain, ParamId::CompMode, 0.0);
            set(&mut chain, ParamId::CompRatio, 2.0);
            set(&mut chain, ParamId::CompThreshold, -12.0);
            set(&mut chain, ParamId::CompKnee, 0.0);
            set(&mut chain, ParamId::CompAttack, 0.1);
            set(&mut chain, ParamId::CompRelease, 1100.0);
            set(&mut chain, ParamId::LimiterCeiling, -1.0);
            chain
        };
        let x = sine(1000.0, 1.0, SR as usize);

        let mut a = build();
        let ya = run_mono(&mut a, &x);
        let mut b = build();
        let yb = run_mono(&mut b, &x);
        assert_eq!(ya, yb);

        // Peak-tracking envelope sits at 0 dBFS: 12 dB over at 2:1 is -6 dB
        let expected_gr = (0.0 - -12.0) * (1.0 / 2.0 - 1.0);
        let gr = a.meters().get_comp_reduction_db();
        assert!((gr - expected_gr).abs() < 0.5, "gr={gr}");

        let tail = &ya[ya.len() - 4800..];
        let peak = tail.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((lin_to_db(peak) - expected_gr).abs() < 0.5, "peak={peak}");

        let ceiling = db_to_lin(-1.0);
        assert!(ya.iter().all(|v| v.abs() <= ceiling + 1e-6));
    }

    #[test]
    fn test_limiter_holds_ceiling_through_chain() {
        let mut chain = VocalChain::new(SR, 2);
        set(&mut chain, ParamId::InputGain, 6.0);
        set(&mut chain, ParamId::LimiterCeiling, -1.0);
        set(&mut chain, ParamId::CompEnable, 0.0);
        let x = sine(997.0, 1.0, 24000);
        let (l, r) = run_stereo(&mut chain, &x, &x);
        let ceiling = db_to_lin(-1.0);
        assert!(l.iter().chain(r.iter()).all(|v| v.abs() <= ceiling + 1e-6));
        assert!(chain.meters().get_limiter_reduction_db() < -3.0);
    }

    #[test]
    fn test_oversampled_section_is_latency_compensated() {
        // Oversampling on with transparent stages: a delayed copy of the input
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::OversamplingEnable, 1.0);
        let x = sine(1000.0, 0.5, 4800);
        let y = run_mono(&mut chain, &x);
        let l = chain.latency_samples();
        for n in 1000..4800 {
            assert!((y[n] - x[n - l]).abs() < 0.01, "n={n}");
        }
    }

    #[test]
    fn test_events_split_block() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        let (mut tx, mut rx) = param_queue(16);
        tx.send(ParamEvent {
            address: addr(ParamId::OutputGain),
            value: 0.5,
            offset: 100,
        })
        .unwrap();
        tx.send(ParamEvent {
            address: addr(ParamId::OutputGain),
            value: 0.25,
            offset: 200,
        })
        .unwrap();
        // Unknown addresses are dropped without disturbing the rest
        tx.send(ParamEvent {
            address: 33,
            value: 1.0,
            offset: 150,
        })
        .unwrap();

        let mut buf = vec![1.0f32; BLOCK];
        chain.process_block_with_events(&mut [&mut buf[..]], &mut rx);
        assert!(buf[..100].iter().all(|&v| v == 1.0));
        assert!(buf[100..200].iter().all(|&v| v == 0.5));
        assert!(buf[200..].iter().all(|&v| v == 0.25));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_late_event_applies_after_block() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        let (mut tx, mut rx) = param_queue(4);
        tx.send(ParamEvent {
            address: addr(ParamId::OutputGain),
            value: 0.0,
            offset: 10_000,
        })
        .unwrap();
        let mut buf = vec![1.0f32; 64];
        chain.process_block_with_events(&mut [&mut buf[..]], &mut rx);
        assert!(buf.iter().all(|&v| v == 1.0));
        assert_eq!(chain.value(ParamId::OutputGain), 0.0);
    }

    #[test]
    fn test_parameter_access() {
        let mut chain = VocalChain::new(SR, 2);
        assert_eq!(chain.parameter(14), Ok(4.0));
        chain.set_parameter(14, 99.0).unwrap();
        assert_eq!(chain.parameter(14), Ok(20.0));
        chain.set_parameter_normalized(40, 0.5).unwrap();
        assert_eq!(chain.parameter(40), Ok(-40.0));
        assert!((chain.parameter_normalized(40).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(chain.set_parameter(999, 1.0), Err(ParamError::UnknownAddress(999)));
        chain.set_parameter(14, f32::NAN).unwrap();
        assert_eq!(chain.parameter(14), Ok(20.0));
        chain.set_parameter_by_key("comp_ratio", 3.0).unwrap();
        assert_eq!(chain.parameter(14), Ok(3.0));
        chain.load_defaults();
        assert_eq!(chain.parameter(14), Ok(4.0));
    }

    #[test]
    fn test_oversampling_rebuilds_at_inner_rate() {
        // A gate hold counted at 4x must last the same wall-clock time
        let mut chain = VocalChain::new(SR, 1);
        set(&mut chain, ParamId::GateHold, 100.0);
        let os_hold = chain.coeffs.gate.hold_samples();
        set(&mut chain, ParamId::OversamplingEnable, 0.0);
        let base_hold = chain.coeffs.gate.hold_samples();
        assert_eq!(os_hold, base_hold * oversampler::FACTOR as u32);
    }

    #[test]
    fn test_widener_collapses_to_mono() {
        let mut chain = VocalChain::new(SR, 2);
        all_off(&mut chain);
        set(&mut chain, ParamId::StereoEnable, 1.0);
        set(&mut chain, ParamId::StereoWidth, 0.0);
        let l = sine(300.0, 0.5, 1024);
        let r = sine(700.0, 0.3, 1024);
        let (yl, yr) = run_stereo(&mut chain, &l, &r);
        for (a, b) in yl.iter().zip(yr.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalizer_steers_autolevel() {
        let mut chain = VocalChain::new(SR, 1);
        all_off(&mut chain);
        set(&mut chain, ParamId::NormalizerEnable, 1.0);
        set(&mut chain, ParamId::AutoLevelEnable, 1.0);
        // -23 dBFS RMS sine: the normalizer asks for its full +12 dB
        let y = run_mono(&mut chain, &sine(1000.0, 0.1, 4 * SR as usize));
        let peak = y[y.len() - 4800..]
            .iter()
            .fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((lin_to_db(peak / 0.1) - 12.0).abs() < 0.5, "peak={peak}");
    }

    #[test]
    fn test_reset_clears_tails() {
        let mut chain = VocalChain::new(SR, 1);
        set(&mut chain, ParamId::ReverbEnable, 1.0);
        run_mono(&mut chain, &sine(500.0, 0.8, 4800));
        chain.clear();
        let y = run_mono(&mut chain, &[0.0; 1024]);
        assert!(y.iter().all(|&v| v == 0.0));
    }
}

pub mod chain;
pub mod dsp;
pub mod events;
pub mod meters;
pub mod params;
pub mod presets;
pub mod state;

pub use crate::chain::VocalChain;
pub use crate::events::{param_queue, ParamEvent, ParamReceiver, ParamSender};
pub use crate::params::{ParamError, ParamId, ParamKind, ParamRegistry, ParamSpec};
pub use crate::presets::{FactoryPreset, PresetError, PresetManager};
pub use crate::state::StateError;

use assert_no_alloc::permit_alloc;
use nih_plug::prelude::*;
use std::sync::Arc;

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
const DEFAULT_CHANNELS: usize = 2;

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
// Every `#[id]` is the registry key of the same parameter, which is how the
// tree is bound to the chain at initialize.

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatTypeChoice {
    #[name = "Soft Clip"]
    SoftClip,
    #[name = "Tanh"]
    Tanh,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompModeChoice {
    #[name = "Soft Knee"]
    SoftKnee,
    #[name = "FET"]
    Fet,
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbAlgorithmChoice {
    #[name = "Schroeder"]
    Schroeder,
    #[name = "FDN"]
    Fdn,
}

#[derive(Params)]
pub struct VxParams {
    #[nested(group = "Global")]
    pub io: IoParams,
    #[nested(group = "Tone")]
    pub tone: ToneParams,
    #[nested(group = "Pitch")]
    pub pitch: PitchParams,
    #[nested(group = "Gate")]
    pub gate: GateParams,
    #[nested(group = "AutoLevel")]
    pub auto_level: AutoLevelParams,
    #[nested(group = "De-esser")]
    pub de_esser: DeEsserParams,
    #[nested(group = "EQ")]
    pub eq: EqParams,
    #[nested(group = "Compressor")]
    pub comp: CompParams,
    #[nested(group = "Saturator")]
    pub sat: SatParams,
    #[nested(group = "Delay")]
    pub delay: DelayParams,
    #[nested(group = "Reverb")]
    pub reverb: ReverbParams,
    #[nested(group = "Stereo")]
    pub stereo: StereoParams,
    #[nested(group = "Breath")]
    pub breath: BreathParams,
    #[nested(group = "Limiter")]
    pub limiter: LimiterParams,
}

#[derive(Params)]
pub struct IoParams {
    #[id = "bypass"]
    pub bypass: BoolParam,
    #[id = "input_gain"]
    pub input_gain: FloatParam,
    #[id = "output_gain"]
    pub output_gain: FloatParam,
    #[id = "dry_wet"]
    pub dry_wet: FloatParam,
    #[id = "phase_invert"]
    pub phase_invert: BoolParam,
    #[id = "oversampling_enable"]
    pub oversampling: BoolParam,
    #[id = "normalizer_enable"]
    pub normalizer: BoolParam,
}

#[derive(Params)]
pub struct ToneParams {
    #[id = "cutoff"]
    pub cutoff: FloatParam,
    #[id = "resonance"]
    pub resonance: FloatParam,
}

#[derive(Params)]
pub struct PitchParams {
    #[id = "pitch_enable"]
    pub enable: BoolParam,
    #[id = "pitch_amount"]
    pub amount: FloatParam,
    #[id = "pitch_speed"]
    pub speed: FloatParam,
}

#[derive(Params)]
pub struct GateParams {
    #[id = "gate_enable"]
    pub enable: BoolParam,
    #[id = "gate_threshold"]
    pub threshold: FloatParam,
    #[id = "gate_range"]
    pub range: FloatParam,
    #[id = "gate_attack"]
    pub attack: FloatParam,
    #[id = "gate_hold"]
    pub hold: FloatParam,
    #[id = "gate_release"]
    pub release: FloatParam,
    #[id = "gate_hysteresis"]
    pub hysteresis: FloatParam,
}

#[derive(Params)]
pub struct AutoLevelParams {
    #[id = "autolevel_enable"]
    pub enable: BoolParam,
    #[id = "autolevel_target"]
    pub target: FloatParam,
    #[id = "autolevel_range"]
    pub range: FloatParam,
    #[id = "autolevel_speed"]
    pub speed: FloatParam,
}

#[derive(Params)]
pub struct DeEsserParams {
    #[id = "deesser_enable"]
    pub enable: BoolParam,
    #[id = "deesser_threshold"]
    pub threshold: FloatParam,
    #[id = "deesser_freq"]
    pub freq: FloatParam,
    #[id = "deesser_ratio"]
    pub ratio: FloatParam,
    #[id = "deesser_range"]
    pub range: FloatParam,
}

#[derive(Params)]
pub struct EqParams {
    #[id = "eq_enable"]
    pub enable: BoolParam,
    #[id = "eq1_freq"]
    pub low_freq: FloatParam,
    #[id = "eq1_gain"]
    pub low_gain: FloatParam,
    #[id = "eq1_q"]
    pub low_q: FloatParam,
    #[id = "eq2_freq"]
    pub mid_freq: FloatParam,
    #[id = "eq2_gain"]
    pub mid_gain: FloatParam,
    #[id = "eq2_q"]
    pub mid_q: FloatParam,
    #[id = "eq3_freq"]
    pub high_freq: FloatParam,
    #[id = "eq3_gain"]
    pub high_gain: FloatParam,
    #[id = "eq3_q"]
    pub high_q: FloatParam,
}

#[derive(Params)]
pub struct CompParams {
    #[id = "comp_enable"]
    pub enable: BoolParam,
    #[id = "comp_mode"]
    pub mode: EnumParam<CompModeChoice>,
    #[id = "comp_input"]
    pub input: FloatParam,
    #[id = "comp_threshold"]
    pub threshold: FloatParam,
    #[id = "comp_ratio"]
    pub ratio: FloatParam,
    #[id = "comp_attack"]
    pub attack: FloatParam,
    #[id = "comp_release"]
    pub release: FloatParam,
    #[id = "comp_knee"]
    pub knee: FloatParam,
    #[id = "comp_makeup"]
    pub makeup: FloatParam,
    #[id = "comp_auto_makeup"]
    pub auto_makeup: BoolParam,
}

#[derive(Params)]
pub struct SatParams {
    #[id = "sat_enable"]
    pub enable: BoolParam,
    #[id = "sat_type"]
    pub kind: EnumParam<SatTypeChoice>,
    #[id = "sat_drive"]
    pub drive: FloatParam,
    #[id = "sat_mix"]
    pub mix: FloatParam,
}

#[derive(Params)]
pub struct DelayParams {
    #[id = "delay_enable"]
    pub enable: BoolParam,
    #[id = "delay_time"]
    pub time: FloatParam,
    #[id = "delay_feedback"]
    pub feedback: FloatParam,
    #[id = "delay_mix"]
    pub mix: FloatParam,
    #[id = "delay_lowpass"]
    pub lowpass: FloatParam,
}

#[derive(Params)]
pub struct ReverbParams {
    #[id = "reverb_enable"]
    pub enable: BoolParam,
    #[id = "reverb_algorithm"]
    pub algorithm: EnumParam<ReverbAlgorithmChoice>,
    #[id = "reverb_size"]
    pub size: FloatParam,
    #[id = "reverb_damp"]
    pub damp: FloatParam,
    #[id = "reverb_mix"]
    pub mix: FloatParam,
    #[id = "reverb_predelay"]
    pub predelay: FloatParam,
}

#[derive(Params)]
pub struct StereoParams {
    #[id = "stereo_enable"]
    pub enable: BoolParam,
    #[id = "stereo_width"]
    pub width: FloatParam,
    #[id = "mono_bass_freq"]
    pub mono_bass: FloatParam,
}

#[derive(Params)]
pub struct BreathParams {
    #[id = "breath_enable"]
    pub enable: BoolParam,
    #[id = "breath_sensitivity"]
    pub sensitivity: FloatParam,
    #[id = "breath_reduction"]
    pub reduction: FloatParam,
}

#[derive(Params)]
pub struct LimiterParams {
    #[id = "limiter_enable"]
    pub enable: BoolParam,
    #[id = "limiter_ceiling"]
    pub ceiling: FloatParam,
    #[id = "limiter_lookahead"]
    pub lookahead: FloatParam,
}

// Helper to format gain in dB
fn format_db(v: f32) -> String {
    format!("{:.1} dB", v)
}

// Helper to format 0..100 values as "50%"
fn format_percent(v: f32) -> String {
    format!("{:.0}%", v)
}

/// FloatParam built from the registry entry for `id`.
fn float_param(id: ParamId) -> FloatParam {
    let spec = ParamRegistry::global().spec(id);
    let (min, max, default) = match spec.kind {
        ParamKind::Float { min, max, default } => (min, max, default),
        other => (0.0, 1.0, other.default_value()),
    };
    let range = if spec.unit == " Hz" && min > 0.0 {
        FloatRange::Skewed {
            min,
            max,
            factor: FloatRange::skew_factor(-2.0),
        }
    } else {
        FloatRange::Linear { min, max }
    };
    let param = FloatParam::new(spec.name, default, range);
    match spec.unit {
        " dB" => param.with_value_to_string(Arc::new(format_db)),
        " %" => param.with_value_to_string(Arc::new(format_percent)),
        unit => param
            .with_unit(unit)
            .with_value_to_string(formatters::v2s_f32_rounded(2)),
    }
}

fn bool_param(id: ParamId) -> BoolParam {
    let spec = ParamRegistry::global().spec(id);
    BoolParam::new(spec.name, spec.kind.default_value() >= 0.5)
}

fn enum_param<T: Enum + PartialEq + 'static>(id: ParamId, default: T) -> EnumParam<T> {
    EnumParam::new(ParamRegistry::global().spec(id).name, default)
}

impl Default for VxParams {
    fn default() -> Self {
        use ParamId as P;
        Self {
            io: IoParams {
                bypass: bool_param(P::Bypass).make_bypass(),
                input_gain: float_param(P::InputGain).with_smoother(SmoothingStyle::Linear(50.0)),
                output_gain: float_param(P::OutputGain)
                    .with_smoother(SmoothingStyle::Linear(50.0))
                    .with_unit(" dB")
                    .with_value_to_string(formatters::v2s_f32_gain_to_db(1))
                    .with_string_to_value(formatters::s2v_f32_gain_to_db()),
                dry_wet: float_param(P::DryWet).with_smoother(SmoothingStyle::Linear(50.0)),
                phase_invert: bool_param(P::PhaseInvert),
                oversampling: bool_param(P::OversamplingEnable),
                normalizer: bool_param(P::NormalizerEnable),
            },
            tone: ToneParams {
                cutoff: float_param(P::Cutoff),
                resonance: float_param(P::Resonance),
            },
            pitch: PitchParams {
                enable: bool_param(P::PitchEnable),
                amount: float_param(P::PitchAmount),
                speed: float_param(P::PitchSpeed),
            },
            gate: GateParams {
                enable: bool_param(P::GateEnable),
                threshold: float_param(P::GateThreshold),
                range: float_param(P::GateRange),
                attack: float_param(P::GateAttack),
                hold: float_param(P::GateHold),
                release: float_param(P::GateRelease),
                hysteresis: float_param(P::GateHysteresis),
            },
            auto_level: AutoLevelParams {
                enable: bool_param(P::AutoLevelEnable),
                target: float_param(P::AutoLevelTarget),
                range: float_param(P::AutoLevelRange),
                speed: float_param(P::AutoLevelSpeed),
            },
            de_esser: DeEsserParams {
                enable: bool_param(P::DeEsserEnable),
                threshold: float_param(P::DeEsserThreshold),
                freq: float_param(P::DeEsserFreq),
                ratio: float_param(P::DeEsserRatio),
                range: float_param(P::DeEsserRange),
            },
            eq: EqParams {
                enable: bool_param(P::EqEnable),
                low_freq: float_param(P::Eq1Freq),
                low_gain: float_param(P::Eq1Gain),
                low_q: float_param(P::Eq1Q),
                mid_freq: float_param(P::Eq2Freq),
                mid_gain: float_param(P::Eq2Gain),
                mid_q: float_param(P::Eq2Q),
                high_freq: float_param(P::Eq3Freq),
                high_gain: float_param(P::Eq3Gain),
                high_q: float_param(P::Eq3Q),
            },
            comp: CompParams {
                enable: bool_param(P::CompEnable),
                mode: enum_param(P::CompMode, CompModeChoice::Fet),
                input: float_param(P::CompInput),
                threshold: float_param(P::CompThreshold),
                ratio: float_param(P::CompRatio),
                attack: float_param(P::CompAttack),
                release: float_param(P::CompRelease),
                knee: float_param(P::CompKnee),
                makeup: float_param(P::CompMakeup),
                auto_makeup: bool_param(P::CompAutoMakeup),
            },
            sat: SatParams {
                enable: bool_param(P::SatEnable),
                kind: enum_param(P::SatType, SatTypeChoice::SoftClip),
                drive: float_param(P::SatDrive),
                mix: float_param(P::SatMix),
            },
            delay: DelayParams {
                enable: bool_param(P::DelayEnable),
                time: float_param(P::DelayTime),
                feedback: float_param(P::DelayFeedback),
                mix: float_param(P::DelayMix),
                lowpass: float_param(P::DelayLowpass),
            },
            reverb: ReverbParams {
                enable: bool_param(P::ReverbEnable),
                algorithm: enum_param(P::ReverbAlgorithm, ReverbAlgorithmChoice::Fdn),
                size: float_param(P::ReverbSize),
                damp: float_param(P::ReverbDamp),
                mix: float_param(P::ReverbMix),
                predelay: float_param(P::ReverbPredelay),
            },
            stereo: StereoParams {
                enable: bool_param(P::StereoEnable),
                width: float_param(P::StereoWidth),
                mono_bass: float_param(P::MonoBassFreq),
            },
            breath: BreathParams {
                enable: bool_param(P::BreathEnable),
                sensitivity: float_param(P::BreathSensitivity),
                reduction: float_param(P::BreathReduction),
            },
            limiter: LimiterParams {
                enable: bool_param(P::LimiterEnable),
                ceiling: float_param(P::LimiterCeiling),
                lookahead: float_param(P::LimiterLookahead),
            },
        }
    }
}

/// A host parameter tied to its registry address.
struct ParamBinding {
    address: u32,
    ptr: ParamPtr,
}

/// Parameters read through their smoothers instead of the raw atomics.
const SMOOTHED: [ParamId; 3] = [ParamId::InputGain, ParamId::OutputGain, ParamId::DryWet];

/// Advance a smoother across one block. Outside of processing the target is used as is.
fn smoothed_value(param: &FloatParam, steps: u32) -> f32 {
    if steps == 0 {
        param.value()
    } else {
        param.smoothed.next_step(steps)
    }
}

fn bind_params(params: &VxParams) -> Vec<ParamBinding> {
    let registry = ParamRegistry::global();
    params
        .param_map()
        .into_iter()
        .filter_map(|(key, ptr, _group)| {
            let spec = registry.by_key(&key).ok()?;
            (!SMOOTHED.contains(&spec.id)).then_some(ParamBinding {
                address: spec.address,
                ptr,
            })
        })
        .collect()
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
pub struct VxChainPlugin {
    params: Arc<VxParams>,
    chain: VocalChain,
    bindings: Vec<ParamBinding>,
    reported_latency: u32,
}

impl Default for VxChainPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(VxParams::default()),
            chain: VocalChain::new(DEFAULT_SAMPLE_RATE, DEFAULT_CHANNELS),
            bindings: Vec::new(),
            reported_latency: 0,
        }
    }
}

impl VxChainPlugin {
    /// Push host parameter values into the chain. The chain only rebuilds
    /// coefficients for values that changed since the last block.
    fn sync_params(&mut self, block_len: usize) {
        for binding in &self.bindings {
            // SAFETY: the pointers come from `self.params`, which outlives the bindings
            let value = unsafe { binding.ptr.modulated_plain_value() };
            let _ = self.chain.set_parameter(binding.address, value);
        }

        let steps = block_len as u32;
        let io = &self.params.io;
        let smoothed = [
            (ParamId::InputGain, smoothed_value(&io.input_gain, steps)),
            (ParamId::OutputGain, smoothed_value(&io.output_gain, steps)),
            (ParamId::DryWet, smoothed_value(&io.dry_wet, steps)),
        ];
        let registry = ParamRegistry::global();
        for (id, value) in smoothed {
            let _ = self.chain.set_parameter(registry.spec(id).address, value);
        }
    }

    fn process_internal(
        &mut self,
        buffer: &mut Buffer,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        self.sync_params(buffer.samples());

        let latency = self.chain.latency_samples() as u32;
        if latency != self.reported_latency {
            context.set_latency_samples(latency);
            self.reported_latency = latency;
        }

        self.chain.process_block(buffer.as_slice());
        ProcessStatus::Normal
    }
}

impl Plugin for VxChainPlugin {
    const NAME: &'static str = "VxChain";
    const VENDOR: &'static str = "Andrzej Marczewski";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            ..AudioIOLayout::const_default()
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            ..AudioIOLayout::const_default()
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = true;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let channels = audio_io_layout
                .main_output_channels
                .map(NonZeroU32::get)
                .unwrap_or(DEFAULT_CHANNELS as u32) as usize;
            let sample_rate = buffer_config.sample_rate;

            permit_alloc(|| {
                self.chain = VocalChain::new(sample_rate, channels);
                self.bindings = bind_params(&self.params);
            });
            if self.bindings.len() + SMOOTHED.len() != ParamRegistry::global().len() {
                nih_log!(
                    "parameter tree binds {} of {} registry entries",
                    self.bindings.len() + SMOOTHED.len(),
                    ParamRegistry::global().len()
                );
            }

            self.sync_params(0);
            self.reported_latency = self.chain.latency_samples() as u32;
            context.set_latency_samples(self.reported_latency);

            nih_log!(
                "VxChain initialized: {} Hz, {} channels, latency {} samples",
                sample_rate,
                channels,
                self.reported_latency
            );
            true
        }))
        .unwrap_or(false)
    }

    fn task_executor(&mut self) -> TaskExecutor<Self> {
        Box::new(move |_| {})
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.process_internal(buffer, context)
        }))
        .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.chain.clear();
        }))
        .unwrap_or(())
    }
}

impl ClapPlugin for VxChainPlugin {
    const CLAP_ID: &'static str = "com.andrzej.vxchain";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("Vocal Channel Strip");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Mono,
        ClapFeature::Compressor,
        ClapFeature::Reverb,
    ];
}

impl Vst3Plugin for VxChainPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"VxChainVocalStr1";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] = &[
        Vst3SubCategory::Fx,
        Vst3SubCategory::Dynamics,
        Vst3SubCategory::Reverb,
    ];
}

nih_export_clap!(VxChainPlugin);
nih_export_vst3!(VxChainPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_covers_registry() {
        let params = VxParams::default();
        let registry = ParamRegistry::global();
        let map = params.param_map();
        assert_eq!(map.len(), registry.len());
        for (key, _, _) in &map {
            assert!(registry.by_key(key).is_ok(), "{key}");
        }
        assert_eq!(
            bind_params(&params).len() + SMOOTHED.len(),
            registry.len()
        );
    }

    #[test]
    fn test_tree_defaults_match_registry() {
        let params = VxParams::default();
        let registry = ParamRegistry::global();
        for (key, ptr, _) in params.param_map() {
            let spec = registry.by_key(&key).unwrap();
            let value = unsafe { ptr.unmodulated_plain_value() };
            assert!(
                (value - spec.kind.default_value()).abs() < 1e-6,
                "{key}: {value}"
            );
        }
    }

    #[test]
    fn test_choice_indices_match_registry() {
        assert_eq!(CompModeChoice::Fet.to_index(), 1);
        assert_eq!(ReverbAlgorithmChoice::Fdn.to_index(), 1);
        assert_eq!(SatTypeChoice::Tanh.to_index(), 1);
    }
}

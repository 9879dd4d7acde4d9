pub mod auto_level;
pub mod biquad;
pub mod breath;
pub mod compressor;
pub mod cross_normalizer;
pub mod de_esser;
pub mod delay;
pub mod envelope;
pub mod eq;
pub mod fdn;
pub mod gate;
pub mod limiter;
pub mod oversampler;
pub mod pitch;
pub mod reverb;
pub mod ring_buffer;
pub mod saturator;
pub mod stereo_width;
pub mod svf;
pub mod utils;

pub use auto_level::{AutoLevel, AutoLevelSettings, AutoLevelState};
pub use biquad::{BiquadCoeffs, BiquadKind, BiquadState};
pub use breath::{BreathControl, BreathSettings, BreathState};
pub use compressor::{Compressor, CompressorMode, CompressorSettings, CompressorState};
pub use cross_normalizer::{CrossNormalizer, NormalizerControls};
pub use de_esser::{DeEsser, DeEsserSettings, DeEsserState};
pub use delay::{Delay, DelaySettings, DelayState};
pub use envelope::{EnvelopeCoeffs, EnvelopeFollower};
pub use eq::{Eq, EqBand, EqSettings, EqState};
pub use fdn::{FdnReverb, FdnState};
pub use gate::{Gate, GateSettings, GateState, GateStatus};
pub use limiter::{LimiterSettings, LimiterState, TruePeakLimiter};
pub use oversampler::{Oversampler, OversamplerState};
pub use pitch::{PitchSettings, PitchShifter, PitchState};
pub use reverb::{ReverbAlgorithm, ReverbSettings, SchroederReverb, SchroederState};
pub use ring_buffer::RingBuffer;
pub use saturator::{SaturationType, Saturator, SaturatorSettings, SaturatorState};
pub use stereo_width::{StereoWidener, StereoWidthSettings, StereoWidthState};
pub use svf::{SvfCoeffs, SvfKind, SvfState};

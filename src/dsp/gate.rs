//! Noise Gate
//!
//! # Perceptual Contract
//! - **Target Source**: Vocal tracks with room tone or bleed between phrases.
//! - **Intended Effect**: Attenuate pauses by `range` without chopping word tails.
//! - **Failure Modes**:
//!   - Chattering when threshold sits on the noise floor (mitigated by hysteresis).
//!   - Clipped word endings if hold is shorter than the decay of the voice.
//! - **Will Not Do**:
//!   - Close before the hold timer has expired, however fast the signal drops.
//!
//! # State Machine
//! - `Closed -> Open` when the envelope exceeds the open threshold.
//! - `Open -> Closed` when the envelope is below the close threshold
//!   (`open / 10^(hysteresis/20)`) and has stayed there for `hold` samples.
//!   The hold counter resets whenever the envelope climbs back over the close threshold.

use crate::dsp::envelope::EnvelopeCoeffs;
use crate::dsp::utils::db_to_lin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Closed,
    Open,
}

/// Gate parameters in physical units.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub threshold_db: f32,
    pub range_db: f32,
    pub attack_ms: f32,
    pub hold_ms: f32,
    pub release_ms: f32,
    pub hysteresis_db: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            range_db: -20.0,
            attack_ms: 1.0,
            hold_ms: 150.0,
            release_ms: 300.0,
            hysteresis_db: 6.0,
        }
    }
}

/// Derived gate coefficients, shared by all channels.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    open_threshold: f32,
    close_threshold: f32,
    range_factor: f32,
    hold_samples: u32,
    env: EnvelopeCoeffs,
}

/// Per-channel gate state.
#[derive(Debug, Clone, Copy)]
pub struct GateState {
    envelope: f32,
    gain: f32,
    hold_counter: u32,
    status: GateStatus,
}

impl Default for GateState {
    fn default() -> Self {
        Self {
            envelope: 0.0,
            gain: 1.0,
            hold_counter: 0,
            status: GateStatus::Closed,
        }
    }
}

impl GateState {
    #[inline]
    pub fn status(&self) -> GateStatus {
        self.status
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    #[inline]
    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Gate {
    pub fn new(settings: &GateSettings, sample_rate: f32) -> Self {
        let open_threshold = db_to_lin(settings.threshold_db);
        Self {
            open_threshold,
            close_threshold: open_threshold / db_to_lin(settings.hysteresis_db.max(0.0)),
            range_factor: db_to_lin(settings.range_db.min(0.0)),
            hold_samples: (settings.hold_ms.max(0.0) * 0.001 * sample_rate).round() as u32,
            env: EnvelopeCoeffs::new(settings.attack_ms, settings.release_ms, sample_rate),
        }
    }

    #[inline]
    pub fn close_threshold(&self) -> f32 {
        self.close_threshold
    }

    #[inline]
    pub fn hold_samples(&self) -> u32 {
        self.hold_samples
    }

    #[inline]
    pub fn range_factor(&self) -> f32 {
        self.range_factor
    }

    #[inline]
    pub fn process(&self, state: &mut GateState, input: f32) -> f32 {
        state.envelope = self.env.follow(state.envelope, input.abs());

        match state.status {
            GateStatus::Closed => {
                if state.envelope > self.open_threshold {
                    state.status = GateStatus::Open;
                    state.hold_counter = 0;
                }
            }
            GateStatus::Open => {
                if state.envelope >= self.close_threshold {
                    state.hold_counter = 0;
                } else {
                    state.hold_counter = state.hold_counter.saturating_add(1);
                    if state.hold_counter >= self.hold_samples {
                        state.status = GateStatus::Closed;
                    }
                }
            }
        }

        let target = match state.status {
            GateStatus::Open => 1.0,
            GateStatus::Closed => self.range_factor,
        };
        // Opening uses the attack coefficient, closing the release one
        state.gain = if target > state.gain {
            self.env.attack * state.gain + (1.0 - self.env.attack) * target
        } else {
            self.env.release * state.gain + (1.0 - self.env.release) * target
        };

        input * state.gain
    }
}

//! Pitch Stabilizer
//!
//! Granular two-tap pitch shifter. Two read heads sweep a 200 ms ring buffer
//! half a window apart and are crossfaded with complementary triangle windows,
//! so each head is silent when it wraps.
//!
//! This is a fixed shifter driven by the `amount` control, not a pitch tracker.

use crate::dsp::ring_buffer::RingBuffer;

// Ring buffer length (ms).
const BUFFER_MS: f32 = 200.0;
// Window length at speed 50 (ms).
// Increasing: smoother, more latency; decreasing: tighter, grainier.
const BASE_WINDOW_MS: f32 = 50.0;
// Largest shift at either end of `amount` (semitones).
const MAX_SEMITONES: f32 = 12.0;

#[derive(Debug, Clone, Copy)]
pub struct PitchSettings {
    /// 0..100, 50 is no shift.
    pub amount: f32,
    /// 0..100
    pub speed: f32,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            amount: 50.0,
            speed: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PitchShifter {
    ratio: f32,
    window: f32,
}

#[derive(Debug, Clone)]
pub struct PitchState {
    buffer: RingBuffer,
    phase: f32,
}

impl PitchState {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            buffer: RingBuffer::new((BUFFER_MS * 0.001 * sample_rate) as usize + 4),
            phase: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.phase = 0.0;
    }
}

impl PitchShifter {
    pub fn new(settings: &PitchSettings, sample_rate: f32) -> Self {
        let semitones = (settings.amount - 50.0) / 50.0 * MAX_SEMITONES;
        let speed = settings.speed.clamp(0.0, 100.0);
        let window_ms = BASE_WINDOW_MS * 2f32.powf((50.0 - speed) / 50.0);
        // Leave room for the interpolator's look-ahead taps
        let max_window = BUFFER_MS * 0.001 * sample_rate - 4.0;
        Self {
            ratio: 2f32.powf(semitones / 12.0),
            window: (window_ms * 0.001 * sample_rate).clamp(4.0, max_window),
        }
    }

    #[inline]
    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    #[inline]
    pub fn process(&self, state: &mut PitchState, input: f32) -> f32 {
        state.buffer.write(input);

        let window = self.window;
        if state.phase >= window {
            state.phase %= window;
        }
        let phase1 = state.phase;
        let mut phase2 = phase1 + window * 0.5;
        if phase2 >= window {
            phase2 -= window;
        }

        let env1 = 1.0 - (2.0 * phase1 / window - 1.0).abs();
        let env2 = 1.0 - env1;

        let out = state.buffer.read_interpolated(phase1) * env1
            + state.buffer.read_interpolated(phase2) * env2;

        // Read heads move at `ratio` against a writer moving at 1
        state.phase += 1.0 - self.ratio;
        if state.phase < 0.0 {
            state.phase += window;
        } else if state.phase >= window {
            state.phase -= window;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    #[test]
    fn test_unity_ratio_at_center() {
        let p = PitchShifter::new(&PitchSettings::default(), SR);
        assert!((p.ratio() - 1.0).abs() < 1e-6);
        let up = PitchShifter::new(
            &PitchSettings {
                amount: 100.0,
                speed: 50.0,
            },
            SR,
        );
        assert!((up.ratio() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_crossfade_preserves_dc() {
        let p = PitchShifter::new(
            &PitchSettings {
                amount: 70.0,
                speed: 50.0,
            },
            SR,
        );
        let mut st = PitchState::new(SR);
        let mut y = 0.0;
        for _ in 0..SR as usize {
            y = p.process(&mut st, 0.5);
        }
        // Complementary windows sum to one on a constant input
        assert!((y - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_window_capped_to_buffer() {
        let slow = PitchShifter::new(
            &PitchSettings {
                amount: 50.0,
                speed: 0.0,
            },
            SR,
        );
        assert!(slow.window <= BUFFER_MS * 0.001 * SR);
        let mut st = PitchState::new(SR);
        for n in 0..SR as usize {
            assert!(slow.process(&mut st, (n as f32 * 0.01).sin()).is_finite());
        }
    }
}

use std::f32::consts::PI;

/// Floor used before taking logarithms of levels.
pub const DB_EPS: f32 = 1e-12;

#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    20.0 * lin.max(DB_EPS).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
/// `exp(-1 / (fs * t))`, with degenerate times collapsing to an instant response.
#[inline]
pub fn time_constant_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

/// One-pole lowpass pole for a cutoff in Hz: `exp(-2π f / fs)`.
#[inline]
pub fn one_pole_coeff(cutoff_hz: f32, sample_rate: f32) -> f32 {
    (-2.0 * PI * cutoff_hz.max(0.0) / sample_rate).exp()
}

/// Transparent below unity, bends smoothly toward ±2.0 above it.
///
/// Used on every feedback path so runaway recirculation saturates instead of diverging.
#[inline]
pub fn soft_clip(x: f32) -> f32 {
    let a = x.abs();
    if a <= 1.0 {
        x
    } else {
        (2.0 - 1.0 / a).copysign(x)
    }
}

/// Linear crossfade, `t` clamped to 0..1.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_round_trip() {
        for db in [-60.0f32, -12.0, 0.0, 6.0] {
            assert!((lin_to_db(db_to_lin(db)) - db).abs() < 1e-3);
        }
    }

    #[test]
    fn test_soft_clip_bounds() {
        assert_eq!(soft_clip(0.5), 0.5);
        assert_eq!(soft_clip(-1.0), -1.0);
        assert!(soft_clip(10.0) < 2.0);
        assert!(soft_clip(-1e9) > -2.0);
        assert!((soft_clip(1.0001) - 1.0001).abs() < 1e-4);
    }

    #[test]
    fn test_time_constant_degenerate() {
        assert_eq!(time_constant_coeff(0.0, 48000.0), 0.0);
        let c = time_constant_coeff(10.0, 48000.0);
        assert!(c > 0.99 && c < 1.0);
    }
}

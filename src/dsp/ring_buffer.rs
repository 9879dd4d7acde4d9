//! Fixed-capacity circular sample buffer.
//!
//! Shared by the delay, reverbs, pitch stabilizer, limiter lookahead and the
//! oversampler histories. Capacity is set once at construction and only changes
//! by building a new buffer during `reset`, never while streaming.
//!
//! # Indexing
//! `read_at(0)` is the most recently written sample, `read_at(n)` the one written
//! `n` writes earlier. Every index wraps modulo capacity.

#[derive(Debug, Clone)]
pub struct RingBuffer {
    buf: Vec<f32>,
    mask: usize,
    write_pos: usize,
}

impl RingBuffer {
    /// Create a buffer able to look back at least `min_len - 1` samples.
    /// Storage is rounded up to a power of two so wrapping is a mask.
    pub fn new(min_len: usize) -> Self {
        let len = min_len.max(2).next_power_of_two();
        Self {
            buf: vec![0.0; len],
            mask: len - 1,
            write_pos: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Push one sample, advancing the cursor.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.write_pos = (self.write_pos + 1) & self.mask;
        self.buf[self.write_pos] = sample;
    }

    /// Sample written `offset` writes ago.
    #[inline]
    pub fn read_at(&self, offset: usize) -> f32 {
        self.buf[self.write_pos.wrapping_sub(offset) & self.mask]
    }

    /// Fractional read using 4-point (3rd order) Lagrange interpolation.
    ///
    /// Interpolates between `read_at(i)` and `read_at(i + 1)` where `i = floor(offset)`,
    /// using the neighbours on both sides. Integer offsets return the stored sample exactly.
    /// Below an offset of 1.0 there is no newer neighbour yet, so the read falls back to
    /// linear interpolation between `read_at(0)` and `read_at(1)`.
    #[inline]
    pub fn read_interpolated(&self, offset: f32) -> f32 {
        let offset = offset.max(0.0);
        let i = offset as usize;
        let t = offset - i as f32;

        if i == 0 {
            let y0 = self.read_at(0);
            return y0 + t * (self.read_at(1) - y0);
        }

        let ym1 = self.read_at(i - 1);
        let y0 = self.read_at(i);
        let y1 = self.read_at(i + 1);
        let y2 = self.read_at(i + 2);

        let c_m1 = -t * (t - 1.0) * (t - 2.0) / 6.0;
        let c_0 = (t + 1.0) * (t - 1.0) * (t - 2.0) * 0.5;
        let c_1 = -(t + 1.0) * t * (t - 2.0) * 0.5;
        let c_2 = (t + 1.0) * t * (t - 1.0) / 6.0;

        ym1 * c_m1 + y0 * c_0 + y1 * c_1 + y2 * c_2
    }

    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    /// Set every slot to `value` and rewind the cursor.
    pub fn fill(&mut self, value: f32) {
        self.buf.iter_mut().for_each(|s| *s = value);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_rounds_up() {
        let rb = RingBuffer::new(100);
        assert_eq!(rb.capacity(), 128);
    }

    #[test]
    fn test_read_at_wraps() {
        let mut rb = RingBuffer::new(4);
        for i in 0..10 {
            rb.write(i as f32);
        }
        assert_eq!(rb.read_at(0), 9.0);
        assert_eq!(rb.read_at(1), 8.0);
        assert_eq!(rb.read_at(3), 6.0);
    }

    #[test]
    fn test_lagrange_exact_on_integers_and_cubic() {
        let mut rb = RingBuffer::new(16);
        // Cubic ramp: Lagrange 4-point reproduces cubics exactly
        let f = |n: f32| 0.01 * n * n * n - 0.2 * n * n + n;
        for n in 0..12 {
            rb.write(f(n as f32));
        }
        // offset k corresponds to n = 11 - k
        assert_eq!(rb.read_interpolated(3.0), rb.read_at(3));
        let v = rb.read_interpolated(4.25);
        let expected = f(11.0 - 4.25);
        assert!((v - expected).abs() < 1e-3, "{v} vs {expected}");
    }

    #[test]
    fn test_sub_sample_offset_is_linear() {
        let mut rb = RingBuffer::new(16);
        // Quadratic history: a Lagrange read with a made-up newer node would miss
        let f = |n: f32| n * n;
        for n in 0..12 {
            rb.write(f(n as f32));
        }
        assert_eq!(rb.read_interpolated(0.0), f(11.0));
        for &offset in &[0.25f32, 0.5, 0.9] {
            let expected = f(11.0) + offset * (f(10.0) - f(11.0));
            let v = rb.read_interpolated(offset);
            assert!((v - expected).abs() < 1e-4, "{offset}: {v} vs {expected}");
        }
        // Continuous across the switch to the 4-point kernel
        let below = rb.read_interpolated(1.0 - 1e-4);
        let at = rb.read_interpolated(1.0);
        assert!((below - at).abs() < 1e-2, "{below} vs {at}");
    }
}

//! Thread-safe metering for the audio thread.
//!
//! Values are stored as f32 bits in atomics so a host UI, the render tool or a
//! test can read them while the chain keeps processing. Nothing here locks.

use std::sync::atomic::{AtomicU32, Ordering};

/// Peaks, per-module gain reduction and the reported latency.
#[derive(Debug, Default)]
pub struct Meters {
    input_peak_l: AtomicU32,
    input_peak_r: AtomicU32,
    output_peak_l: AtomicU32,
    output_peak_r: AtomicU32,
    gate_gain_db: AtomicU32,
    de_esser_reduction_db: AtomicU32,
    comp_reduction_db: AtomicU32,
    limiter_reduction_db: AtomicU32,
    latency_samples: AtomicU32,
}

impl Meters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        for m in [
            &self.input_peak_l,
            &self.input_peak_r,
            &self.output_peak_l,
            &self.output_peak_r,
            &self.gate_gain_db,
            &self.de_esser_reduction_db,
            &self.comp_reduction_db,
            &self.limiter_reduction_db,
        ] {
            m.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn set_input_peak(&self, left: f32, right: f32) {
        self.input_peak_l.store(left.to_bits(), Ordering::Relaxed);
        self.input_peak_r.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn set_output_peak(&self, left: f32, right: f32) {
        self.output_peak_l.store(left.to_bits(), Ordering::Relaxed);
        self.output_peak_r.store(right.to_bits(), Ordering::Relaxed);
    }

    pub fn set_gate_gain_db(&self, val: f32) {
        self.gate_gain_db.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_de_esser_reduction_db(&self, val: f32) {
        self.de_esser_reduction_db
            .store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_comp_reduction_db(&self, val: f32) {
        self.comp_reduction_db.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_limiter_reduction_db(&self, val: f32) {
        self.limiter_reduction_db
            .store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn set_latency_samples(&self, val: u32) {
        self.latency_samples.store(val, Ordering::Relaxed);
    }

    pub fn get_input_peak_l(&self) -> f32 {
        f32::from_bits(self.input_peak_l.load(Ordering::Relaxed))
    }

    pub fn get_input_peak_r(&self) -> f32 {
        f32::from_bits(self.input_peak_r.load(Ordering::Relaxed))
    }

    pub fn get_output_peak_l(&self) -> f32 {
        f32::from_bits(self.output_peak_l.load(Ordering::Relaxed))
    }

    pub fn get_output_peak_r(&self) -> f32 {
        f32::from_bits(self.output_peak_r.load(Ordering::Relaxed))
    }

    pub fn get_gate_gain_db(&self) -> f32 {
        f32::from_bits(self.gate_gain_db.load(Ordering::Relaxed))
    }

    pub fn get_de_esser_reduction_db(&self) -> f32 {
        f32::from_bits(self.de_esser_reduction_db.load(Ordering::Relaxed))
    }

    pub fn get_comp_reduction_db(&self) -> f32 {
        f32::from_bits(self.comp_reduction_db.load(Ordering::Relaxed))
    }

    pub fn get_limiter_reduction_db(&self) -> f32 {
        f32::from_bits(self.limiter_reduction_db.load(Ordering::Relaxed))
    }

    pub fn get_latency_samples(&self) -> u32 {
        self.latency_samples.load(Ordering::Relaxed)
    }
}

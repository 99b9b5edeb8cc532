use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffer::{saturate, SampleBuffer};

/// Linear volume scaling with saturation to the i16 range.
///
/// The gain is expected in [0, 1]; range-limiting is the control's job.
pub fn scale(block: &SampleBuffer, gain: f32) -> SampleBuffer {
    let g = gain as f64;
    block.iter().map(|&s| saturate(s as f64 * g)).collect()
}

/// Map the 0..=100 volume knob onto a linear gain.
pub fn percent_to_gain(percent: u8) -> f32 {
    percent.min(100) as f32 / 100.0
}

/// Single-writer, multi-reader gain slot (f32 bits in an atomic word).
#[derive(Debug)]
pub struct GainCell(AtomicU32);

impl GainCell {
    pub fn new(gain: f32) -> Self {
        Self(AtomicU32::new(clamp_gain(gain).to_bits()))
    }
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }
    pub fn set(&self, gain: f32) {
        self.0.store(clamp_gain(gain).to_bits(), Ordering::Release);
    }
}

impl Default for GainCell {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_gain(g: f32) -> f32 {
    if g.is_nan() { 0.0 } else { g.clamp(0.0, 1.0) }
}

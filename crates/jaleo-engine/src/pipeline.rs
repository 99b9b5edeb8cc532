use parking_lot::Mutex;

use crate::backend::RenderDevice;
use crate::buffer::SampleBuffer;
use crate::dsp::{scale, EffectCell, EffectEngine, EffectKind, GainCell};
use crate::error::Result;

/// Shared state of one audio session.
///
/// The stream worker and sound-bank playback both reach the render device
/// through [`render`](Self::render), which is the only path to it.
pub struct PipelineContext {
    sample_rate: u32,
    block_size: usize,
    effects: EffectEngine,
    effect: EffectCell,
    gain: GainCell,
    render: Mutex<Box<dyn RenderDevice>>,
}

impl PipelineContext {
    pub fn new(sample_rate: u32, block_size: usize, render: Box<dyn RenderDevice>) -> Self {
        Self {
            sample_rate,
            block_size,
            effects: EffectEngine::new(sample_rate),
            effect: EffectCell::default(),
            gain: GainCell::default(),
            render: Mutex::new(render),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn effect(&self) -> EffectKind {
        self.effect.get()
    }
    pub fn select_effect(&self, kind: EffectKind) {
        self.effect.set(kind);
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }
    /// Clamped to [0, 1].
    pub fn set_gain(&self, gain: f32) {
        self.gain.set(gain);
    }

    /// One pipeline step on a captured block, using the effect and gain
    /// current at the time of the call.
    pub fn process(&self, block: &SampleBuffer) -> SampleBuffer {
        process_block(&self.effects, block, self.effect(), self.gain())
    }

    /// Blocking write under the render lock. Empty buffers are skipped.
    pub fn render(&self, block: &SampleBuffer) -> Result<()> {
        if block.is_empty() {
            return Ok(());
        }
        self.render.lock().write(block)
    }
}

/// Effect, then volume.
pub fn process_block(effects: &EffectEngine, block: &SampleBuffer, kind: EffectKind, gain: f32) -> SampleBuffer {
    scale(&effects.apply(block, kind), gain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryRender;

    #[test]
    fn process_uses_current_settings() {
        let (render, _log) = MemoryRender::new();
        let ctx = PipelineContext::new(44100, 1024, Box::new(render));
        ctx.select_effect(EffectKind::DeepVoice);
        ctx.set_gain(0.0);
        let out = ctx.process(&SampleBuffer::filled(100, 1000));
        assert_eq!(out.len(), 150);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn render_skips_empty_blocks() {
        let (render, log) = MemoryRender::new();
        let ctx = PipelineContext::new(44100, 1024, Box::new(render));
        ctx.render(&SampleBuffer::default()).unwrap();
        ctx.render(&SampleBuffer::filled(3, 1)).unwrap();
        assert_eq!(log.len(), 1);
    }
}

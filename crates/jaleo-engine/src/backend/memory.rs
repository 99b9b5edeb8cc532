use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{CaptureDevice, RenderDevice};
use crate::buffer::SampleBuffer;
use crate::error::{Error, Result};

/// Capture source fed from memory. Reports end of stream as a device error,
/// which stops the loop the same way an unplugged microphone would.
#[derive(Debug, Default)]
pub struct MemoryCapture {
    pending: VecDeque<i16>,
}

impl MemoryCapture {
    pub fn new(samples: impl IntoIterator<Item = i16>) -> Self {
        Self { pending: samples.into_iter().collect() }
    }
}

impl CaptureDevice for MemoryCapture {
    /// A short final read is padded with silence.
    fn read(&mut self, frames: usize) -> Result<SampleBuffer> {
        if self.pending.is_empty() {
            return Err(Error::Device("capture stream ended".into()));
        }
        let take = frames.min(self.pending.len());
        let mut block: Vec<i16> = self.pending.drain(..take).collect();
        block.resize(frames, 0);
        Ok(block.into())
    }
}

/// Shared view of everything a [`MemoryRender`] received.
#[derive(Debug, Clone, Default)]
pub struct RenderLog(Arc<Mutex<Vec<SampleBuffer>>>);

impl RenderLog {
    pub fn blocks(&self) -> Vec<SampleBuffer> {
        self.0.lock().clone()
    }
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
    /// All received samples, concatenated in write order.
    pub fn samples(&self) -> Vec<i16> {
        self.0.lock().iter().flat_map(|b| b.iter().copied()).collect()
    }
}

/// Render sink that records writes instead of playing them.
#[derive(Debug, Default)]
pub struct MemoryRender {
    log: RenderLog,
    fail_after: Option<usize>,
}

impl MemoryRender {
    pub fn new() -> (Self, RenderLog) {
        let log = RenderLog::default();
        (Self { log: log.clone(), fail_after: None }, log)
    }

    /// Accept `writes` buffers, then fail every write like a lost device.
    pub fn failing_after(writes: usize) -> (Self, RenderLog) {
        let (mut dev, log) = Self::new();
        dev.fail_after = Some(writes);
        (dev, log)
    }
}

impl RenderDevice for MemoryRender {
    fn write(&mut self, block: &SampleBuffer) -> Result<()> {
        let mut log = self.log.0.lock();
        if matches!(self.fail_after, Some(n) if log.len() >= n) {
            return Err(Error::Device("render device gone".into()));
        }
        log.push(block.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_pads_then_ends() {
        let mut cap = MemoryCapture::new([1, 2, 3]);
        assert_eq!(&cap.read(2).unwrap()[..], &[1, 2]);
        assert_eq!(&cap.read(2).unwrap()[..], &[3, 0]);
        assert!(cap.read(2).unwrap_err().is_device());
    }

    #[test]
    fn render_records_and_fails_on_demand() {
        let (mut dev, log) = MemoryRender::failing_after(1);
        dev.write(&SampleBuffer::filled(4, 7)).unwrap();
        assert!(dev.write(&SampleBuffer::filled(4, 7)).is_err());
        assert_eq!(log.len(), 1);
        assert_eq!(log.samples(), vec![7; 4]);
    }
}

//! Blocking device contract the pipeline is written against.
//!
//! Capture is read only by the stream worker. Render is shared between the
//! worker and sound-bank playback and always sits behind the pipeline's
//! render lock.

pub mod host;
pub mod memory;

use crate::buffer::SampleBuffer;
use crate::error::Result;

pub use self::host::{open_duplex, CpalCapture, CpalDuplex, CpalRender};
pub use self::memory::{MemoryCapture, MemoryRender, RenderLog};

pub trait CaptureDevice: Send {
    /// Block until exactly `frames` mono samples are available.
    fn read(&mut self, frames: usize) -> Result<SampleBuffer>;
}

pub trait RenderDevice: Send {
    /// Block until the whole buffer has been handed to the device.
    fn write(&mut self, block: &SampleBuffer) -> Result<()>;
}

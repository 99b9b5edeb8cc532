//! cpal-backed duplex device.
//!
//! cpal drives callbacks; the pipeline wants blocking `read`/`write`. The two
//! are bridged by one lock-free ring per direction: the input callback fills
//! the capture ring, the output callback drains the render ring and plays
//! silence when it runs dry.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;
use tracing::info;

use super::{CaptureDevice, RenderDevice};
use crate::buffer::SampleBuffer;
use crate::devices::pick_device;
use crate::error::{Error, Result};
use crate::EngineConfig;

const POLL: Duration = Duration::from_millis(1);

/// Owns the live cpal streams; dropping it releases the device handles.
///
/// `cpal::Stream` is not `Send` on every host, so this stays on the control
/// thread while the ring endpoints travel to the stream worker.
pub struct CpalDuplex {
    _input: cpal::Stream,
    _output: cpal::Stream,
}

/// Blocking reader over the capture ring.
pub struct CpalCapture {
    ring: Arc<SpscRing<i16>>,
    fault: Fault,
    timeout: Duration,
}

/// Blocking writer into the render ring.
pub struct CpalRender {
    ring: Arc<SpscRing<i16>>,
    fault: Fault,
    timeout: Duration,
}

impl CaptureDevice for CpalCapture {
    fn read(&mut self, frames: usize) -> Result<SampleBuffer> {
        let mut block = vec![0i16; frames];
        let deadline = Instant::now() + self.timeout;
        loop {
            self.fault.check()?;
            if self.ring.pop_exact(&mut block) {
                return Ok(block.into());
            }
            if Instant::now() >= deadline {
                return Err(Error::Device(format!("no input for {:?}", self.timeout)));
            }
            thread::sleep(POLL);
        }
    }
}

impl RenderDevice for CpalRender {
    /// The timeout restarts whenever the device drains some of the ring, so
    /// long clips are fine; only a stalled output fails.
    fn write(&mut self, block: &SampleBuffer) -> Result<()> {
        let mut rest = block.samples();
        let mut deadline = Instant::now() + self.timeout;
        while !rest.is_empty() {
            self.fault.check()?;
            let n = self.ring.push_partial(rest);
            if n > 0 {
                rest = &rest[n..];
                deadline = Instant::now() + self.timeout;
                continue;
            }
            if Instant::now() >= deadline {
                return Err(Error::Device(format!("output stalled for {:?}", self.timeout)));
            }
            thread::sleep(POLL);
        }
        Ok(())
    }
}

/// Open input and output at the configured rate and start both streams.
pub fn open_duplex(cfg: &EngineConfig) -> Result<(CpalDuplex, CpalCapture, CpalRender)> {
    let host = cpal::default_host();

    let in_dev  = pick_device(&host, true,  cfg.input_name.as_deref(), cfg.input_index)?
        .ok_or_else(|| Error::Device("no input device matched (and no default available)".into()))?;
    let out_dev = pick_device(&host, false, cfg.output_name.as_deref(), cfg.output_index)?
        .ok_or_else(|| Error::Device("no output device matched (and no default available)".into()))?;

    let in_cfg_any  = in_dev.default_input_config()?;
    let out_cfg_any = out_dev.default_output_config()?;

    let mut in_cfg  = in_cfg_any.config();
    let mut out_cfg = out_cfg_any.config();

    // The pipeline runs at one fixed rate; the device has to accept it.
    in_cfg.sample_rate  = cpal::SampleRate(cfg.sample_rate);
    out_cfg.sample_rate = cpal::SampleRate(cfg.sample_rate);
    if let Some(frames) = cfg.device_buffer {
        in_cfg.buffer_size  = cpal::BufferSize::Fixed(frames);
        out_cfg.buffer_size = cpal::BufferSize::Fixed(frames);
    }

    let cap = (cfg.block_size * 4).next_power_of_two().max(1024);
    let capture_ring = Arc::new(SpscRing::with_capacity(cap));
    let render_ring  = Arc::new(SpscRing::with_capacity(cap));
    let fault = Fault::default();

    let input = match in_cfg_any.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&in_dev, &in_cfg, capture_ring.clone(), fault.clone())?,
        cpal::SampleFormat::I16 => build_input::<i16>(&in_dev, &in_cfg, capture_ring.clone(), fault.clone())?,
        cpal::SampleFormat::U16 => build_input::<u16>(&in_dev, &in_cfg, capture_ring.clone(), fault.clone())?,
        other => return Err(Error::Device(format!("unsupported input format: {other:?}"))),
    };
    let output = match out_cfg_any.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&out_dev, &out_cfg, render_ring.clone(), fault.clone())?,
        cpal::SampleFormat::I16 => build_output::<i16>(&out_dev, &out_cfg, render_ring.clone(), fault.clone())?,
        cpal::SampleFormat::U16 => build_output::<u16>(&out_dev, &out_cfg, render_ring.clone(), fault.clone())?,
        other => return Err(Error::Device(format!("unsupported output format: {other:?}"))),
    };

    input.play()?;
    output.play()?;

    info!(
        input = %in_dev.name().unwrap_or_default(),
        output = %out_dev.name().unwrap_or_default(),
        sample_rate = cfg.sample_rate,
        in_channels = in_cfg.channels,
        out_channels = out_cfg.channels,
        "audio devices opened"
    );

    let duplex  = CpalDuplex { _input: input, _output: output };
    let capture = CpalCapture { ring: capture_ring, fault: fault.clone(), timeout: cfg.device_timeout };
    let render  = CpalRender { ring: render_ring, fault, timeout: cfg.device_timeout };
    Ok((duplex, capture, render))
}

/// Capture keeps channel 0 of every interleaved frame.
fn build_input<S>(
    dev: &cpal::Device,
    cfg: &cpal::StreamConfig,
    ring: Arc<SpscRing<i16>>,
    fault: Fault,
) -> Result<cpal::Stream>
where
    S: SizedSample,
    i16: FromSample<S>,
{
    let channels = cfg.channels.max(1) as usize;
    // Scratch buffer reused in the input callback (avoid allocs)
    let mut scratch = Vec::<i16>::with_capacity(ring.capacity());
    let stream = dev.build_input_stream::<S, _, _>(
        cfg,
        move |data: &[S], _| {
            scratch.clear();
            scratch.extend(data.iter().step_by(channels).map(|&s| i16::from_sample(s)));
            // overrun: whatever does not fit is dropped
            let _ = ring.push_partial(&scratch);
        },
        move |err| fault.raise(format!("input stream error: {err}")),
        None,
    )?;
    Ok(stream)
}

/// Render copies the mono signal onto every output channel.
fn build_output<S>(
    dev: &cpal::Device,
    cfg: &cpal::StreamConfig,
    ring: Arc<SpscRing<i16>>,
    fault: Fault,
) -> Result<cpal::Stream>
where
    S: SizedSample + FromSample<i16>,
{
    let channels = cfg.channels.max(1) as usize;
    let mut mono = Vec::<i16>::with_capacity(ring.capacity());
    let stream = dev.build_output_stream::<S, _, _>(
        cfg,
        move |out: &mut [S], _| {
            mono.resize(out.len() / channels, 0);
            let got = ring.pop_partial(&mut mono);
            mono[got..].fill(0);
            for (frame, &v) in out.chunks_mut(channels).zip(mono.iter()) {
                frame.fill(S::from_sample(v));
            }
        },
        move |err| fault.raise(format!("output stream error: {err}")),
        None,
    )?;
    Ok(stream)
}

/* ---------- latched stream errors ---------- */

/// First stream error seen by a cpal callback; every later blocking call
/// reports it.
#[derive(Clone, Default)]
struct Fault(Arc<Mutex<Option<String>>>);

impl Fault {
    fn raise(&self, msg: String) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(msg);
        }
    }

    fn check(&self) -> Result<()> {
        match self.0.lock().as_ref() {
            Some(msg) => Err(Error::Device(msg.clone())),
            None => Ok(()),
        }
    }
}

/* ---------- lock-free SPSC ring (power-of-two capacity) ---------- */

struct SpscRing<T> {
    // Interior mutability: single producer writes, single consumer reads.
    buf: UnsafeCell<Box<[T]>>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// Safety: one producer and one consumer per ring. The producer only writes
// slots outside [read..write) and then advances `write`; the consumer only
// reads slots inside it and then advances `read`.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T: Copy + Default> SpscRing<T> {
    fn with_capacity(cap: usize) -> Self {
        let cap_pow2 = cap.max(2).next_power_of_two();
        Self {
            buf: UnsafeCell::new(vec![T::default(); cap_pow2].into_boxed_slice()),
            mask: cap_pow2 - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    /// Usable slots (one is kept free to tell full from empty).
    fn capacity(&self) -> usize {
        self.mask
    }

    #[inline]
    fn len(&self, w: usize, r: usize) -> usize {
        w.wrapping_sub(r) & self.mask
    }

    /// Producer: push as much of `data` as fits; returns how many were taken.
    fn push_partial(&self, data: &[T]) -> usize {
        let r = self.read.load(Ordering::Acquire);
        let w = self.write.load(Ordering::Relaxed);
        let free = self.mask - self.len(w, r);
        let n = free.min(data.len());

        // Safe because: single producer, and the first `n` slots past `w` are free.
        let buf = unsafe { &mut *self.buf.get() };
        let mut wi = w;
        for &v in &data[..n] {
            buf[wi & self.mask] = v;
            wi = wi.wrapping_add(1);
        }
        self.write.store(wi, Ordering::Release);
        n
    }

    /// Consumer: fill all of `out`, or take nothing and return false.
    fn pop_exact(&self, out: &mut [T]) -> bool {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Relaxed);
        if self.len(w, r) < out.len() {
            return false;
        }
        self.pop_partial(out) == out.len()
    }

    /// Consumer: fill the front of `out` with what is available.
    fn pop_partial(&self, out: &mut [T]) -> usize {
        let w = self.write.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Relaxed);
        let n = self.len(w, r).min(out.len());

        // Safe because: single consumer, and the producer only writes beyond `w`.
        let buf = unsafe { &*self.buf.get() };
        let mut ri = r;
        for o in out[..n].iter_mut() {
            *o = buf[ri & self.mask];
            ri = ri.wrapping_add(1);
        }
        self.read.store(ri, Ordering::Release);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_and_keeps_order() {
        let ring = SpscRing::<i16>::with_capacity(8);
        assert_eq!(ring.capacity(), 7);
        let mut out = [0i16; 5];
        for round in 0..10i16 {
            let data: Vec<i16> = (0..5).map(|i| round * 10 + i).collect();
            assert_eq!(ring.push_partial(&data), 5);
            assert!(ring.pop_exact(&mut out));
            assert_eq!(&out[..], &data[..]);
        }
    }

    #[test]
    fn ring_push_stops_when_full() {
        let ring = SpscRing::<i16>::with_capacity(4);
        assert_eq!(ring.push_partial(&[1, 2, 3, 4, 5]), 3);
        let mut out = [0i16; 4];
        assert!(!ring.pop_exact(&mut out));
        assert_eq!(ring.pop_partial(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn capture_times_out_without_input() {
        let mut cap = CpalCapture {
            ring: Arc::new(SpscRing::with_capacity(16)),
            fault: Fault::default(),
            timeout: Duration::from_millis(5),
        };
        assert!(cap.read(4).unwrap_err().is_device());
        cap.ring.push_partial(&[9, 9, 9, 9]);
        assert_eq!(&cap.read(4).unwrap()[..], &[9; 4]);
    }

    #[test]
    fn latched_fault_fails_render() {
        let fault = Fault::default();
        let mut render = CpalRender {
            ring: Arc::new(SpscRing::with_capacity(16)),
            fault: fault.clone(),
            timeout: Duration::from_millis(5),
        };
        render.write(&SampleBuffer::filled(4, 1)).unwrap();
        fault.raise("unplugged".into());
        fault.raise("ignored".into());
        let err = render.write(&SampleBuffer::filled(4, 1)).unwrap_err();
        assert_eq!(err.to_string(), "Audio device error: unplugged");
    }
}

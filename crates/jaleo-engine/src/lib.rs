pub mod backend;
pub mod bank;
pub mod buffer;
pub mod devices;
pub mod dsp;
pub mod error;
pub mod ingest;
pub mod offline;
pub mod pipeline;
pub mod stream;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use backend::{CaptureDevice, CpalDuplex, RenderDevice};
use bank::SoundBank;
use pipeline::PipelineContext;
use stream::StreamLoop;

pub use bank::SLOT_COUNT;
pub use buffer::SampleBuffer;
pub use dsp::EffectKind;
pub use error::{Error, Result};
pub use stream::StreamState;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub input_name: Option<String>,       // match by substring (case-insensitive)
    pub output_name: Option<String>,
    pub input_index: Option<usize>,       // explicit index from device list
    pub output_index: Option<usize>,
    pub sample_rate: u32,                 // native pipeline rate
    pub block_size: usize,                // frames per loop iteration
    pub device_buffer: Option<u32>,       // hardware buffer frames (if backend supports)
    pub device_timeout: Duration,         // longest a blocking device call may stall
    pub bank_path: PathBuf,
    pub initial_effect: EffectKind,
    pub initial_gain: u8,                 // 0..=100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_name: None,
            output_name: None,
            input_index: None,
            output_index: None,
            sample_rate: 44_100,
            block_size: 1024,
            device_buffer: None,
            device_timeout: Duration::from_secs(2),
            bank_path: PathBuf::from("custom_sounds.bank"),
            initial_effect: EffectKind::Robot,
            initial_gain: 80,
        }
    }
}

impl EngineConfig {
    /// Reject settings the stream loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig("sample rate must be above 0 Hz".into()));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block size must be at least 1 frame".into()));
        }
        Ok(())
    }
}

/// Snapshot for the control surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub state: StreamState,
    pub effect: EffectKind,
    pub gain: f32,
    pub loaded_slots: Vec<usize>,
}

/// The control-surface contract: one voice-changer session with its sound
/// bank, bound to a capture and a render device.
pub struct Engine {
    ctx: Arc<PipelineContext>,
    stream: StreamLoop,
    bank: SoundBank,
    duplex: Option<CpalDuplex>,
    cfg: EngineConfig,
    // set while an unreadable bank file is still in place
    keep_bank_file: bool,
}

impl Engine {
    /// Open the system audio devices through cpal.
    pub fn open(cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let (duplex, capture, render) = backend::open_duplex(&cfg)?;
        let mut engine = Self::with_devices(cfg, Box::new(capture), Box::new(render))?;
        engine.duplex = Some(duplex);
        Ok(engine)
    }

    /// Build on caller-supplied devices. The sound bank is restored from
    /// `cfg.bank_path`. A bank file that exists but cannot be read is renamed
    /// to `<name>.bad` and the bank starts empty; if even that fails, the file
    /// is left alone and `shutdown` will not save over it.
    pub fn with_devices(
        cfg: EngineConfig,
        capture: Box<dyn CaptureDevice>,
        render: Box<dyn RenderDevice>,
    ) -> Result<Self> {
        cfg.validate()?;
        let ctx = Arc::new(PipelineContext::new(cfg.sample_rate, cfg.block_size, render));
        ctx.select_effect(cfg.initial_effect);
        ctx.set_gain(dsp::percent_to_gain(cfg.initial_gain));

        let mut bank = SoundBank::new(cfg.sample_rate, cfg.bank_path.clone());
        let mut keep_bank_file = false;
        if let Err(e) = bank.load_all() {
            match bank.set_aside() {
                Ok(bad) => warn!(
                    path = %cfg.bank_path.display(),
                    moved_to = %bad.display(),
                    error = %e,
                    "could not restore sound bank, starting empty"
                ),
                Err(move_err) => {
                    keep_bank_file = true;
                    error!(
                        path = %cfg.bank_path.display(),
                        error = %e,
                        move_error = %move_err,
                        "could not restore sound bank; it will not be saved on shutdown"
                    );
                }
            }
        }

        let stream = StreamLoop::new(ctx.clone(), capture);
        Ok(Self { ctx, stream, bank, duplex: None, cfg, keep_bank_file })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn bank(&self) -> &SoundBank {
        &self.bank
    }

    pub fn select_effect(&self, kind: EffectKind) {
        self.ctx.select_effect(kind);
        info!(effect = %kind, "effect selected");
    }

    /// Volume knob, 0..=100.
    pub fn set_gain(&self, percent: u8) {
        self.ctx.set_gain(dsp::percent_to_gain(percent));
    }

    pub fn start(&mut self) -> Result<()> {
        self.stream.start()
    }

    pub fn stop(&mut self) -> Result<()> {
        self.stream.stop()
    }

    pub fn state(&self) -> StreamState {
        self.stream.state()
    }

    /// Device error from a session that ended on its own, if any.
    pub fn poll(&mut self) -> Option<Error> {
        self.stream.poll()
    }

    pub fn trigger_slot(&self, slot: usize) -> Result<()> {
        self.bank.play(slot, &self.ctx)
    }

    pub fn configure_slot(&mut self, slot: usize, file: &Path) -> Result<()> {
        self.bank.load(slot, file)?;
        self.keep_bank_file = false;
        Ok(())
    }

    pub fn clear_slot(&mut self, slot: usize) -> Result<()> {
        self.bank.clear(slot)?;
        self.keep_bank_file = false;
        Ok(())
    }

    pub fn save_bank(&mut self) -> Result<()> {
        self.bank.save_all()?;
        self.keep_bank_file = false;
        Ok(())
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.stream.state(),
            effect: self.ctx.effect(),
            gain: self.ctx.gain(),
            loaded_slots: self.bank.loaded_slots(),
        }
    }

    /// Save the bank, stop the stream, then release the devices. Every step
    /// runs; the first failure is returned. The save is skipped while an
    /// unreadable bank file is still in place and nothing has been edited.
    pub fn shutdown(mut self) -> Result<()> {
        let saved = if self.keep_bank_file {
            warn!(path = %self.cfg.bank_path.display(), "leaving unreadable sound bank untouched");
            Ok(())
        } else {
            self.bank.save_all()
        };
        let stopped = self.stream.stop();
        drop(self.duplex.take());
        info!("engine shut down");
        saved.and(stopped)
    }
}

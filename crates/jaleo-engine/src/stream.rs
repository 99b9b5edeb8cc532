use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::backend::CaptureDevice;
use crate::error::{Error, Result};
use crate::pipeline::PipelineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Inactive,
    Active,
}

/// What a worker hands back when it exits: the capture device, so the loop
/// can be started again, and the reason it stopped.
type Exit = (Box<dyn CaptureDevice>, Result<()>);

/// Real-time capture -> effect -> volume -> render driver.
///
/// One worker thread per active session. The active flag is checked between
/// blocks only; a block in flight always completes. A device failure ends the
/// session on the spot and is returned by the next [`stop`](Self::stop) or
/// [`poll`](Self::poll).
pub struct StreamLoop {
    ctx: Arc<PipelineContext>,
    active: Arc<AtomicBool>,
    capture: Option<Box<dyn CaptureDevice>>,
    worker: Option<JoinHandle<Exit>>,
    spawned: usize,
}

impl StreamLoop {
    pub fn new(ctx: Arc<PipelineContext>, capture: Box<dyn CaptureDevice>) -> Self {
        Self {
            ctx,
            active: Arc::new(AtomicBool::new(false)),
            capture: Some(capture),
            worker: None,
            spawned: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        if self.active.load(Ordering::Acquire) {
            StreamState::Active
        } else {
            StreamState::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == StreamState::Active
    }

    /// Number of workers spawned over the loop's lifetime.
    pub fn workers_spawned(&self) -> usize {
        self.spawned
    }

    /// No-op while active.
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }
        // A worker that died on a device error has not been joined yet.
        if let Some(handle) = self.worker.take() {
            if let Err(e) = self.join(handle) {
                warn!(error = %e, "previous stream session had failed");
            }
        }

        let capture = self
            .capture
            .take()
            .ok_or_else(|| Error::Device("capture device unavailable".into()))?;

        self.active.store(true, Ordering::Release);
        let ctx = self.ctx.clone();
        let active = self.active.clone();
        let spawned = thread::Builder::new()
            .name("jaleo-stream".into())
            .spawn(move || run(ctx, active, capture));

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                self.spawned += 1;
                info!(
                    sample_rate = self.ctx.sample_rate(),
                    block_size = self.ctx.block_size(),
                    "stream started"
                );
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::Release);
                Err(Error::Io(e))
            }
        }
    }

    /// Clear the active flag and join the worker. No-op while inactive.
    /// Returns the device error that ended the session, if any.
    pub fn stop(&mut self) -> Result<()> {
        self.active.store(false, Ordering::Release);
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        let res = self.join(handle);
        if res.is_ok() {
            info!("stream stopped");
        }
        res
    }

    /// Reap a worker that has already exited on its own.
    pub fn poll(&mut self) -> Option<Error> {
        if !self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            return None;
        }
        let handle = self.worker.take()?;
        self.join(handle).err()
    }

    fn join(&mut self, handle: JoinHandle<Exit>) -> Result<()> {
        match handle.join() {
            Ok((capture, res)) => {
                self.capture = Some(capture);
                res
            }
            Err(_) => Err(Error::Device("stream worker panicked; capture device lost".into())),
        }
    }
}

impl Drop for StreamLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!(error = %e, "stream error at drop");
        }
    }
}

fn run(ctx: Arc<PipelineContext>, active: Arc<AtomicBool>, mut capture: Box<dyn CaptureDevice>) -> Exit {
    let frames = ctx.block_size();
    let mut step = || -> Result<()> {
        let block = capture.read(frames)?;
        let out = ctx.process(&block);
        ctx.render(&out)
    };

    let mut res = Ok(());
    while active.load(Ordering::Acquire) {
        if let Err(e) = step() {
            active.store(false, Ordering::Release);
            error!(error = %e, "stream stopped on device error");
            res = Err(e);
            break;
        }
    }
    (capture, res)
}

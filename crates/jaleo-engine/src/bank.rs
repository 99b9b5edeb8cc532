//! Ten-slot custom sound bank.
//!
//! Slots hold clips already normalised to the pipeline rate. Playback writes
//! a clip straight to the render device, skipping effect and volume.
//!
//! Bank file layout (little-endian):
//!
//! ```text
//! "JLBK"  u16 version  u32 sample_rate
//! 10 x ( u8 tag  [u32 len  len x i16] )   tag 0 = empty, 1 = loaded
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, info, warn};

use crate::buffer::SampleBuffer;
use crate::error::{Error, Result};
use crate::ingest;
use crate::pipeline::PipelineContext;

pub const SLOT_COUNT: usize = 10;

const MAGIC: &[u8; 4] = b"JLBK";
const VERSION: u16 = 1;
const TAG_EMPTY: u8 = 0;
const TAG_LOADED: u8 = 1;
/// Refuse absurd lengths from a corrupt file before allocating.
const MAX_SLOT_SAMPLES: u32 = 1 << 28;

pub type Slots = [Option<SampleBuffer>; SLOT_COUNT];

pub struct SoundBank {
    slots: Slots,
    sample_rate: u32,
    path: PathBuf,
}

impl SoundBank {
    /// Empty bank persisted at `path`.
    pub fn new(sample_rate: u32, path: impl Into<PathBuf>) -> Self {
        Self { slots: Default::default(), sample_rate, path: path.into() }
    }

    /// Bank restored from `path`, or empty if the file does not exist.
    pub fn open(sample_rate: u32, path: impl Into<PathBuf>) -> Result<Self> {
        let mut bank = Self::new(sample_rate, path);
        bank.load_all()?;
        Ok(bank)
    }

    pub fn get(&self, slot: usize) -> Result<Option<&SampleBuffer>> {
        check_slot(slot)?;
        Ok(self.slots[slot].as_ref())
    }

    pub fn is_loaded(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    pub fn loaded_slots(&self) -> Vec<usize> {
        (0..SLOT_COUNT).filter(|&i| self.is_loaded(i)).collect()
    }

    /// Decode `file` into `slot` at the pipeline rate. The slot keeps its old
    /// clip if anything fails.
    pub fn load(&mut self, slot: usize, file: &Path) -> Result<()> {
        check_slot(slot)?;
        let clip = ingest::load_normalized(file, self.sample_rate)?;
        info!(slot, path = %file.display(), samples = clip.len(), "sound slot loaded");
        self.slots[slot] = Some(clip);
        Ok(())
    }

    /// Put an already-normalised clip into `slot`.
    pub fn insert(&mut self, slot: usize, clip: SampleBuffer) -> Result<()> {
        check_slot(slot)?;
        self.slots[slot] = Some(clip);
        Ok(())
    }

    pub fn clear(&mut self, slot: usize) -> Result<()> {
        check_slot(slot)?;
        self.slots[slot] = None;
        Ok(())
    }

    /// Raw playback through the render lock. No-op on an empty slot.
    pub fn play(&self, slot: usize, ctx: &PipelineContext) -> Result<()> {
        check_slot(slot)?;
        match &self.slots[slot] {
            Some(clip) => {
                debug!(slot, samples = clip.len(), "playing sound slot");
                ctx.render(clip)
            }
            None => Ok(()),
        }
    }

    /// Write all ten slots. Goes through a temporary file so a failed save
    /// leaves the previous bank intact.
    pub fn save_all(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = sibling(&self.path, "tmp");
        {
            let mut w = BufWriter::new(File::create(&tmp)?);
            write_bank(&mut w, self.sample_rate, &self.slots)?;
            w.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), loaded = self.loaded_slots().len(), "sound bank saved");
        Ok(())
    }

    /// Replace every slot from the bank file. A missing file empties the bank.
    pub fn load_all(&mut self) -> Result<()> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no sound bank on disk");
                self.slots = Default::default();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let (stored_rate, mut slots) = read_bank(&mut BufReader::new(file))?;
        if stored_rate != self.sample_rate {
            warn!(stored_rate, sample_rate = self.sample_rate, "resampling stored sound bank");
            for slot in slots.iter_mut() {
                if let Some(clip) = slot.take() {
                    *slot = Some(ingest::normalize_rate(clip, stored_rate, self.sample_rate));
                }
            }
        }
        self.slots = slots;
        info!(path = %self.path.display(), loaded = self.loaded_slots().len(), "sound bank loaded");
        Ok(())
    }

    /// Rename the bank file to `<name>.bad` so a later save cannot replace a
    /// file that failed to load. Returns the new path.
    pub fn set_aside(&self) -> Result<PathBuf> {
        let bad = sibling(&self.path, "bad");
        fs::rename(&self.path, &bad)?;
        Ok(bad)
    }
}

fn check_slot(slot: usize) -> Result<()> {
    if slot < SLOT_COUNT { Ok(()) } else { Err(Error::InvalidSlot(slot)) }
}

/// `dir/name.bank` -> `dir/name.bank.<ext>`
fn sibling(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}

/* ---------- encoding ---------- */

pub fn write_bank<W: Write>(w: &mut W, sample_rate: u32, slots: &Slots) -> io::Result<()> {
    w.write_all(MAGIC)?;
    w.write_u16::<LittleEndian>(VERSION)?;
    w.write_u32::<LittleEndian>(sample_rate)?;
    for slot in slots {
        match slot {
            None => w.write_u8(TAG_EMPTY)?,
            Some(clip) => {
                let len = u32::try_from(clip.len())
                    .map_err(|_| io::Error::new(ErrorKind::InvalidInput, "clip too long for bank file"))?;
                w.write_u8(TAG_LOADED)?;
                w.write_u32::<LittleEndian>(len)?;
                for &s in clip.iter() {
                    w.write_i16::<LittleEndian>(s)?;
                }
            }
        }
    }
    Ok(())
}

pub fn read_bank<R: Read>(r: &mut R) -> io::Result<(u32, Slots)> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid("not a sound bank file"));
    }
    let version = r.read_u16::<LittleEndian>()?;
    if version != VERSION {
        return Err(invalid(format!("unsupported sound bank version {version}")));
    }
    let sample_rate = r.read_u32::<LittleEndian>()?;
    if sample_rate == 0 {
        return Err(invalid("sound bank has no sample rate"));
    }

    let mut slots: Slots = Default::default();
    for (i, slot) in slots.iter_mut().enumerate() {
        match r.read_u8()? {
            TAG_EMPTY => {}
            TAG_LOADED => {
                let len = r.read_u32::<LittleEndian>()?;
                if len > MAX_SLOT_SAMPLES {
                    return Err(invalid(format!("slot {i} claims {len} samples")));
                }
                let mut samples = vec![0i16; len as usize];
                r.read_i16_into::<LittleEndian>(&mut samples)?;
                *slot = Some(samples.into());
            }
            tag => return Err(invalid(format!("slot {i} has unknown tag {tag}"))),
        }
    }
    Ok((sample_rate, slots))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

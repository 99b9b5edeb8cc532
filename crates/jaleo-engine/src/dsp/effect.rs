use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;
use tracing::warn;

use super::resample::{interpolate_steps, resample_by};
use crate::buffer::{saturate, SampleBuffer};
use crate::error::Result;

/// A block transform.
/// - `process()` returns a new buffer; its length may differ from the input.
/// - Input is never empty; [`EffectEngine::apply`] filters that case out.
pub trait Effect: Send + Sync {
    fn process(&self, block: &SampleBuffer) -> Result<SampleBuffer>;
}

/// Which transform the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EffectKind {
    #[default]
    Robot = 0,
    DeepVoice = 1,
    Chipmunk = 2,
}

impl EffectKind {
    pub const ALL: [EffectKind; 3] = [EffectKind::Robot, EffectKind::DeepVoice, EffectKind::Chipmunk];

    fn from_u8(v: u8) -> Self {
        match v {
            1 => EffectKind::DeepVoice,
            2 => EffectKind::Chipmunk,
            _ => EffectKind::Robot,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EffectKind::Robot => "robot",
            EffectKind::DeepVoice => "deep-voice",
            EffectKind::Chipmunk => "chipmunk",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown effect '{0}' (expected robot, deep or chipmunk)")]
pub struct UnknownEffect(pub String);

impl FromStr for EffectKind {
    type Err = UnknownEffect;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match norm.as_str() {
            "robot" => Ok(EffectKind::Robot),
            "deep" | "deepvoice" => Ok(EffectKind::DeepVoice),
            "chipmunk" => Ok(EffectKind::Chipmunk),
            _ => Err(UnknownEffect(s.to_string())),
        }
    }
}

/// Single-writer, multi-reader slot holding the active [`EffectKind`].
#[derive(Debug, Default)]
pub struct EffectCell(AtomicU8);

impl EffectCell {
    pub fn new(kind: EffectKind) -> Self {
        Self(AtomicU8::new(kind as u8))
    }
    pub fn get(&self) -> EffectKind {
        EffectKind::from_u8(self.0.load(Ordering::Acquire))
    }
    pub fn set(&self, kind: EffectKind) {
        self.0.store(kind as u8, Ordering::Release);
    }
}

/* ---------- transforms ---------- */

/// Plain rate-ratio resample: the block is re-read as if recorded at
/// `ratio` times the native rate.
#[derive(Debug, Clone, Copy)]
pub struct PitchShift {
    pub ratio: f64,
}

impl Effect for PitchShift {
    fn process(&self, block: &SampleBuffer) -> Result<SampleBuffer> {
        resample_by(block, self.ratio)
    }
}

/// Two-stage resample followed by median-threshold binarisation.
#[derive(Debug, Clone, Copy)]
pub struct Robot {
    pub ratio: f64,
    pub step: f64,
}

impl Default for Robot {
    fn default() -> Self {
        Self { ratio: 0.5, step: 0.3 }
    }
}

impl Effect for Robot {
    fn process(&self, block: &SampleBuffer) -> Result<SampleBuffer> {
        let coarse = resample_by(block, self.ratio)?;
        let fine   = interpolate_steps(&coarse, self.step)?;

        let t    = saturate(median(&fine));
        let high = t;
        let low  = t.saturating_neg();
        let cut  = 0.5 * t as f64;
        Ok(fine.iter().map(|&v| if v >= cut { high } else { low }).collect())
    }
}

/// Median of a non-empty slice; mean of the middle pair for even lengths.
fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/* ---------- dispatch ---------- */

/// Applies the selected transform to one block.
///
/// The only state is the native sample rate, fixed for the process lifetime.
/// The ratios are relative to it: DeepVoice reads the block at 1.5x the rate
/// (which raises pitch despite the name), Chipmunk at 0.7x.
#[derive(Debug, Clone)]
pub struct EffectEngine {
    sample_rate: u32,
    robot: Robot,
    deep_voice: PitchShift,
    chipmunk: PitchShift,
}

impl EffectEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            robot: Robot::default(),
            deep_voice: PitchShift { ratio: 1.5 },
            chipmunk: PitchShift { ratio: 0.7 },
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn effect(&self, kind: EffectKind) -> &dyn Effect {
        match kind {
            EffectKind::Robot => &self.robot,
            EffectKind::DeepVoice => &self.deep_voice,
            EffectKind::Chipmunk => &self.chipmunk,
        }
    }

    /// Never fails: an empty block comes back empty, and a degenerate
    /// resample hands the input back unchanged.
    pub fn apply(&self, block: &SampleBuffer, kind: EffectKind) -> SampleBuffer {
        if block.is_empty() {
            return SampleBuffer::default();
        }
        match self.effect(kind).process(block) {
            Ok(out) => out,
            Err(e) => {
                warn!(effect = %kind, error = %e, "effect skipped, passing block through");
                block.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> SampleBuffer {
        (0..len).map(|i| ((i as i32 * 37) % 2000 - 1000) as i16).collect()
    }

    #[test]
    fn pitch_lengths_follow_ratio() {
        let fx = EffectEngine::new(44100);
        for len in [1usize, 7, 100, 1024, 4096] {
            let buf = ramp(len);
            assert_eq!(fx.apply(&buf, EffectKind::DeepVoice).len(), (len as f64 * 1.5).round() as usize);
            assert_eq!(fx.apply(&buf, EffectKind::Chipmunk).len(), (len as f64 * 0.7).round() as usize);
        }
        assert_eq!(fx.apply(&ramp(1024), EffectKind::Chipmunk).len(), 717);
    }

    #[test]
    fn robot_on_silence_is_silent() {
        let fx  = EffectEngine::new(44100);
        let out = fx.apply(&SampleBuffer::silence(1024), EffectKind::Robot);
        assert!(!out.is_empty());
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn robot_is_binary() {
        let fx  = EffectEngine::new(44100);
        let buf: SampleBuffer = (0..1024)
            .map(|n| (9000.0 * (n as f64 * 0.05).sin() + 1500.0) as i16)
            .collect();
        let out = fx.apply(&buf, EffectKind::Robot);
        let t = out.iter().map(|s| s.unsigned_abs()).max().unwrap() as i16;
        assert!(t > 0);
        assert!(out.iter().all(|&s| s == t || s == -t));
        // 1024 -> 512 -> ceil(512 / 0.3)
        assert_eq!(out.len(), 1707);
    }

    #[test]
    fn robot_threshold_splits_at_half_median() {
        let robot = Robot::default();
        // constant 100 -> median 100, every value >= 50
        let out = robot.process(&SampleBuffer::filled(10, 100)).unwrap();
        assert!(out.iter().all(|&s| s == 100));
    }

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn empty_block_is_a_no_op() {
        let fx = EffectEngine::new(44100);
        for kind in EffectKind::ALL {
            assert!(fx.apply(&SampleBuffer::default(), kind).is_empty());
        }
    }

    #[test]
    fn single_sample_blocks_survive_every_effect() {
        let fx  = EffectEngine::new(44100);
        let one = SampleBuffer::new(vec![42]);
        assert!(PitchShift { ratio: 0.1 }.process(&one).is_err());
        assert_eq!(fx.apply(&one, EffectKind::Chipmunk), one);
        assert_eq!(fx.apply(&one, EffectKind::DeepVoice).len(), 2);
        assert!(fx.apply(&one, EffectKind::Robot).iter().all(|&s| s == 42));
    }

    #[test]
    fn parse_names() {
        assert_eq!("Robot".parse::<EffectKind>().unwrap(), EffectKind::Robot);
        assert_eq!("deep".parse::<EffectKind>().unwrap(), EffectKind::DeepVoice);
        assert_eq!("Deep Voice".parse::<EffectKind>().unwrap(), EffectKind::DeepVoice);
        assert_eq!("deep-voice".parse::<EffectKind>().unwrap(), EffectKind::DeepVoice);
        assert_eq!("CHIPMUNK".parse::<EffectKind>().unwrap(), EffectKind::Chipmunk);
        let err = "echo".parse::<EffectKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown effect 'echo' (expected robot, deep or chipmunk)");
    }

    #[test]
    fn cell_swaps() {
        let cell = EffectCell::new(EffectKind::Robot);
        cell.set(EffectKind::Chipmunk);
        assert_eq!(cell.get(), EffectKind::Chipmunk);
    }
}

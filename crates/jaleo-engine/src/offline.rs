//! Run a sound file through the effect pipeline without an audio device.

use std::path::Path;

use tracing::info;

use crate::buffer::SampleBuffer;
use crate::dsp::{percent_to_gain, EffectEngine, EffectKind};
use crate::error::{Error, Result};
use crate::ingest;
use crate::pipeline::process_block;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    pub blocks: usize,
    pub samples_in: usize,
    pub samples_out: usize,
}

/// Cut `input` into `block_size` blocks at `sample_rate`, apply the effect
/// and volume per block exactly as the live loop would, and write a mono
/// 16-bit WAV.
pub fn process_file(
    input: &Path,
    output: &Path,
    kind: EffectKind,
    gain_percent: u8,
    sample_rate: u32,
    block_size: usize,
) -> Result<ProcessReport> {
    if block_size == 0 || sample_rate == 0 {
        return Err(Error::InvalidConfig(format!(
            "cannot render {block_size}-frame blocks at {sample_rate} Hz"
        )));
    }
    let clip    = ingest::load_normalized(input, sample_rate)?;
    let effects = EffectEngine::new(sample_rate);
    let gain    = percent_to_gain(gain_percent);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)?;

    let mut report = ProcessReport { blocks: 0, samples_in: clip.len(), samples_out: 0 };
    for chunk in clip.chunks(block_size) {
        let out = process_block(&effects, &SampleBuffer::new(chunk.to_vec()), kind, gain);
        for &s in out.iter() {
            writer.write_sample(s)?;
        }
        report.blocks += 1;
        report.samples_out += out.len();
    }
    writer.finalize()?;

    info!(
        input = %input.display(),
        output = %output.display(),
        effect = %kind,
        blocks = report.blocks,
        "offline render finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chipmunk_render_shrinks_each_block() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(&input, spec).unwrap();
        for _ in 0..2048 {
            w.write_sample(1000i16).unwrap();
        }
        w.finalize().unwrap();

        let report = process_file(&input, &output, EffectKind::Chipmunk, 50, 44100, 1024).unwrap();
        assert_eq!(report, ProcessReport { blocks: 2, samples_in: 2048, samples_out: 2 * 717 });

        let mut r = hound::WavReader::open(&output).unwrap();
        assert_eq!(r.spec().channels, 1);
        let samples: Vec<i16> = r.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![500; 2 * 717]);
    }

    #[test]
    fn zero_block_size_is_rejected_before_touching_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let err = process_file(&dir.path().join("in.wav"), &output, EffectKind::Robot, 100, 44100, 0).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(!output.exists());
    }
}

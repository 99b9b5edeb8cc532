//! Sound-file decoding for the sound bank.
//!
//! WAV goes through `hound`, MP3 through `symphonia`. Everything comes out as
//! mono i16 at the file's own rate; [`load_normalized`] then brings it to the
//! pipeline rate.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use symphonia::core::audio::SampleBuffer as PcmBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::buffer::{saturate, SampleBuffer};
use crate::dsp::resample;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// RIFF/WAVE PCM or IEEE float.
    Wav,
    /// MPEG layer III.
    Mp3,
}

/// Decoded file contents before rate normalisation.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Extension first; files without one are sniffed by header.
pub fn detect_format(path: &Path) -> Result<AudioFormat> {
    if let Some(ext) = path.extension() {
        let ext = ext.to_string_lossy().to_lowercase();
        return match ext.as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            other => Err(Error::UnsupportedFormat(format!("'.{other}' files are not supported"))),
        };
    }

    let mut head = [0u8; 4];
    let n = File::open(path)?.read(&mut head)?;
    sniff(&head[..n]).ok_or_else(|| {
        Error::UnsupportedFormat(format!("unrecognised header in {}", path.display()))
    })
}

fn sniff(head: &[u8]) -> Option<AudioFormat> {
    match head {
        [b'R', b'I', b'F', b'F', ..] => Some(AudioFormat::Wav),
        [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
        // MPEG frame sync
        [0xFF, b, ..] if b & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
        _ => None,
    }
}

pub fn decode(path: &Path) -> Result<Decoded> {
    let decoded = match detect_format(path)? {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
    };
    if decoded.samples.is_empty() {
        return Err(Error::UnsupportedFormat(format!("no audio in {}", path.display())));
    }
    if decoded.sample_rate == 0 {
        return Err(Error::UnsupportedFormat(format!("unknown sample rate in {}", path.display())));
    }
    debug!(
        path = %path.display(),
        samples = decoded.samples.len(),
        sample_rate = decoded.sample_rate,
        "decoded sound file"
    );
    Ok(decoded)
}

/// Decode and resample to `sample_rate`.
pub fn load_normalized(path: &Path, sample_rate: u32) -> Result<SampleBuffer> {
    let Decoded { samples, sample_rate: file_rate } = decode(path)?;
    let buf = SampleBuffer::new(samples);
    if file_rate == sample_rate {
        return Ok(buf);
    }
    Ok(normalize_rate(buf, file_rate, sample_rate))
}

/// Resample, keeping the original when the ratio is degenerate.
pub(crate) fn normalize_rate(buf: SampleBuffer, from_hz: u32, to_hz: u32) -> SampleBuffer {
    match resample(&buf, from_hz, to_hz) {
        Ok(out) => out,
        Err(e) => {
            warn!(error = %e, from_hz, to_hz, "keeping clip at its original rate");
            buf
        }
    }
}

/* ---------- WAV ---------- */

fn decode_wav(path: &Path) -> Result<Decoded> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits @ 1..=16) => {
            let up = (1i32 << (16 - bits)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 * up))
                .collect::<std::result::Result<_, _>>()?
        }
        (hound::SampleFormat::Int, bits @ 17..=32) => {
            let down = (1i64 << (bits - 16)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / down))
                .collect::<std::result::Result<_, _>>()?
        }
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v as f64 * i16::MAX as f64))
            .collect::<std::result::Result<_, _>>()?,
        (format, bits) => {
            return Err(Error::UnsupportedFormat(format!(
                "{bits}-bit {format:?} WAV in {}",
                path.display()
            )))
        }
    };

    Ok(Decoded {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

/* ---------- MP3 ---------- */

fn decode_mp3(path: &Path) -> Result<Decoded> {
    let src = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(codec_error)?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::UnsupportedFormat(format!("no audio track in {}", path.display())))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(codec_error)?;

    let mut interleaved = Vec::<f64>::new();
    let mut channels = 1usize;
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(e) => {
                end_of_stream(e)?;
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // a corrupt frame is skipped, not fatal
            Err(SymphoniaError::DecodeError(msg)) => {
                debug!(msg, "skipping undecodable mp3 frame");
                continue;
            }
            Err(e) => return Err(codec_error(e)),
        };
        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        channels = spec.channels.count().max(1);

        let mut pcm = PcmBuffer::<i16>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);
        interleaved.extend(pcm.samples().iter().map(|&s| s as f64));
    }

    Ok(Decoded { samples: downmix(&interleaved, channels), sample_rate })
}

/// `next_packet()` reports a clean end of input as an unexpected EOF. Anything
/// else is a real read failure and must not pass for a shorter clip.
fn end_of_stream(e: SymphoniaError) -> Result<()> {
    match e {
        SymphoniaError::IoError(io) if io.kind() == ErrorKind::UnexpectedEof => Ok(()),
        other => Err(codec_error(other)),
    }
}

fn codec_error(e: SymphoniaError) -> Error {
    match e {
        SymphoniaError::IoError(io) => Error::Io(io),
        other => Error::UnsupportedFormat(other.to_string()),
    }
}

/// Average interleaved channels into one.
fn downmix(interleaved: &[f64], channels: usize) -> Vec<i16> {
    let channels = channels.max(1);
    interleaved
        .chunks(channels)
        .map(|frame| saturate(frame.iter().sum::<f64>() / frame.len() as f64))
        .collect()
}

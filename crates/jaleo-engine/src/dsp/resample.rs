//! Linear-interpolation resampling.
//!
//! Deterministic: the same input and ratio always give the same output.

use crate::buffer::{saturate, SampleBuffer};
use crate::error::{Error, Result};

/// Resample `buf` recorded at `from_hz` so it plays back at `to_hz`.
pub fn resample(buf: &SampleBuffer, from_hz: u32, to_hz: u32) -> Result<SampleBuffer> {
    if from_hz == 0 {
        return Err(Error::InvalidResample { ratio: f64::INFINITY, len: buf.len() });
    }
    resample_by(buf, to_hz as f64 / from_hz as f64)
}

/// Resample by `ratio` = output rate / input rate.
///
/// Output length is `round(len * ratio)`; output sample `i` reads input
/// position `i / ratio`. Positions past the last input sample clamp to it.
pub fn resample_by(buf: &SampleBuffer, ratio: f64) -> Result<SampleBuffer> {
    let len = buf.len();
    let invalid = || Error::InvalidResample { ratio, len };

    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(invalid());
    }
    let out_len = (len as f64 * ratio).round();
    if !(out_len >= 1.0) || out_len > usize::MAX as f64 {
        return Err(invalid());
    }
    let out_len = out_len as usize;

    let src  = buf.samples();
    let step = 1.0 / ratio;
    let out = (0..out_len)
        .map(|i| saturate(sample_at(src, i as f64 * step)))
        .collect();
    Ok(out)
}

/// Read `src` every `step` positions, starting at 0, while the position is
/// below `src.len()`. Yields `ceil(len / step)` unrounded values.
pub fn interpolate_steps(src: &[i16], step: f64) -> Result<Vec<f64>> {
    if !step.is_finite() || step <= 0.0 {
        return Err(Error::InvalidResample { ratio: 1.0 / step, len: src.len() });
    }
    if src.is_empty() {
        return Ok(Vec::new());
    }
    let count = (src.len() as f64 / step).ceil() as usize;
    Ok((0..count).map(|k| sample_at(src, k as f64 * step)).collect())
}

/// Linear interpolation at a fractional position. `src` must be non-empty.
#[inline]
fn sample_at(src: &[i16], pos: f64) -> f64 {
    let last = src.len() - 1;
    let i = pos.floor() as usize;
    if i >= last {
        return src[last] as f64;
    }
    let frac = pos - i as f64;
    let a = src[i] as f64;
    let b = src[i + 1] as f64;
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f64, rate: f64, amp: f64) -> SampleBuffer {
        (0..len)
            .map(|n| (amp * (2.0 * std::f64::consts::PI * freq * n as f64 / rate).sin()).round() as i16)
            .collect()
    }

    #[test]
    fn unit_ratio_is_identity() {
        let buf = sine(1000, 440.0, 44100.0, 12000.0);
        assert_eq!(resample(&buf, 44100, 44100).unwrap(), buf);
        assert_eq!(resample_by(&buf, 1.0).unwrap(), buf);
    }

    #[test]
    fn doubling_doubles_length() {
        let buf = sine(513, 300.0, 44100.0, 8000.0);
        let out = resample_by(&buf, 2.0).unwrap();
        assert!((out.len() as i64 - 2 * 513).abs() <= 1);
        // even outputs land on input samples
        for (i, s) in buf.iter().enumerate() {
            assert_eq!(out[2 * i], *s);
        }
    }

    #[test]
    fn round_trip_stays_close_on_a_sine() {
        let buf  = sine(4410, 440.0, 44100.0, 10000.0);
        let up   = resample(&buf, 44100, 48000).unwrap();
        let back = resample(&up, 48000, 44100).unwrap();
        assert_eq!(up.len(), 4800);
        assert_eq!(back.len(), buf.len());
        let worst = buf
            .iter()
            .zip(back.iter())
            .map(|(a, b)| (*a as i32 - *b as i32).abs())
            .max()
            .unwrap();
        assert!(worst <= 50, "max deviation {worst}");
    }

    #[test]
    fn trailing_edge_clamps_to_last_sample() {
        let buf = SampleBuffer::new(vec![0, 100]);
        let out = resample_by(&buf, 3.0).unwrap();
        assert_eq!(out.len(), 6);
        assert_eq!(&out[..], &[0, 33, 67, 100, 100, 100]);
    }

    #[test]
    fn degenerate_ratios_fail() {
        let buf = SampleBuffer::new(vec![1, 2, 3]);
        assert!(matches!(resample_by(&buf, 0.1), Err(Error::InvalidResample { .. })));
        assert!(matches!(resample_by(&buf, 0.0), Err(Error::InvalidResample { .. })));
        assert!(matches!(resample_by(&buf, f64::NAN), Err(Error::InvalidResample { .. })));
        assert!(matches!(resample(&buf, 0, 44100), Err(Error::InvalidResample { .. })));
        assert!(matches!(resample_by(&SampleBuffer::default(), 1.0), Err(Error::InvalidResample { .. })));
    }

    #[test]
    fn deterministic() {
        let buf = sine(777, 123.0, 44100.0, 20000.0);
        assert_eq!(resample_by(&buf, 0.7).unwrap(), resample_by(&buf, 0.7).unwrap());
    }

    #[test]
    fn fractional_steps_match_arange_count() {
        let src = [0i16, 10, 20, 30];
        let out = interpolate_steps(&src, 0.3).unwrap();
        // 0.0, 0.3, ... 3.9 -> ceil(4 / 0.3) = 14 positions
        assert_eq!(out.len(), 14);
        approx::assert_abs_diff_eq!(out[1], 3.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(out[13], 30.0, epsilon = 1e-9);
    }
}

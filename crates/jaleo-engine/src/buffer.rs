use std::ops::Deref;

/// One block of signed 16-bit mono PCM.
///
/// The sample rate is not stored; every buffer inside a pipeline is at the
/// pipeline's native rate unless a stage says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleBuffer {
    samples: Vec<i16>,
}

impl SampleBuffer {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn silence(len: usize) -> Self {
        Self { samples: vec![0; len] }
    }

    pub fn filled(len: usize, value: i16) -> Self {
        Self { samples: vec![value; len] }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

impl Deref for SampleBuffer {
    type Target = [i16];

    fn deref(&self) -> &[i16] {
        &self.samples
    }
}

impl From<Vec<i16>> for SampleBuffer {
    fn from(samples: Vec<i16>) -> Self {
        Self { samples }
    }
}

impl FromIterator<i16> for SampleBuffer {
    fn from_iter<I: IntoIterator<Item = i16>>(iter: I) -> Self {
        Self { samples: iter.into_iter().collect() }
    }
}

/// Round to nearest and saturate into the i16 range.
#[inline]
pub fn saturate(x: f64) -> i16 {
    let r = x.round();
    if r >= i16::MAX as f64 {
        i16::MAX
    } else if r <= i16::MIN as f64 {
        i16::MIN
    } else {
        r as i16
    }
}
